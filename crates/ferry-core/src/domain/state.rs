//! State - worker のライフサイクル状態

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a worker.
///
/// State transitions:
/// - Starting -> Running -> Terminated
/// - Starting -> Terminated (startup failure, or terminate() before start)
///
/// `Terminated` is terminal: queued and future sends are dropped silently and
/// no further events fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Spawned; the execution context is not yet accepting messages.
    Starting,

    /// Entry point is running.
    Running,

    /// Terminated explicitly, by failure, or by natural exit.
    Terminated,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Terminated)
    }

    /// Is `next` a legal successor of `self`?
    pub fn can_advance_to(self, next: WorkerState) -> bool {
        matches!(
            (self, next),
            (WorkerState::Starting, WorkerState::Running)
                | (WorkerState::Starting, WorkerState::Terminated)
                | (WorkerState::Running, WorkerState::Terminated)
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::start(WorkerState::Starting, WorkerState::Running, true)]
    #[case::fail_on_start(WorkerState::Starting, WorkerState::Terminated, true)]
    #[case::terminate(WorkerState::Running, WorkerState::Terminated, true)]
    #[case::no_restart(WorkerState::Terminated, WorkerState::Running, false)]
    #[case::no_rewind(WorkerState::Running, WorkerState::Starting, false)]
    #[case::no_self_loop(WorkerState::Terminated, WorkerState::Terminated, false)]
    fn transitions(#[case] from: WorkerState, #[case] to: WorkerState, #[case] legal: bool) {
        assert_eq!(from.can_advance_to(to), legal);
    }

    #[test]
    fn only_terminated_is_terminal() {
        assert!(!WorkerState::Starting.is_terminal());
        assert!(!WorkerState::Running.is_terminal());
        assert!(WorkerState::Terminated.is_terminal());
    }
}
