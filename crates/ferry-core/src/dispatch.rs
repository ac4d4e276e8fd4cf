//! Dispatcher - owner 側の logical thread
//!
//! event listener と timer callback はここに積まれ、1 つのタスクが投入順に
//! 1 つずつ最後まで実行する。同じ Dispatcher を共有する worker / timer の
//! callback は並行に走らない。

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send>;

/// Serial executor for owner-side callbacks. Clones feed the same queue.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl Dispatcher {
    /// Start the draining task. It ends once every clone is dropped.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // listener の panic で owner の配送全体を止めない
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    tracing::error!(panic = %panic_message(payload.as_ref()), "callback panicked");
                }
            }
        });
        Self { tx }
    }

    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(job)).is_err() {
            tracing::trace!("dispatcher stopped, callback dropped");
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn jobs_run_in_submission_order() {
        let dispatcher = Dispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let log = Arc::clone(&log);
            dispatcher.submit(move || log.lock().unwrap().push(i));
        }
        let (tx, rx) = oneshot::channel();
        dispatcher.submit(move || {
            let _ = tx.send(());
        });

        tokio::time::timeout(Duration::from_secs(2), rx).await.unwrap().unwrap();
        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn a_panicking_callback_does_not_stop_the_queue() {
        let dispatcher = Dispatcher::new();
        dispatcher.submit(|| panic!("listener blew up"));
        let (tx, rx) = oneshot::channel();
        dispatcher.submit(move || {
            let _ = tx.send("still running");
        });

        let got = tokio::time::timeout(Duration::from_secs(2), rx).await.unwrap().unwrap();
        assert_eq!(got, "still running");
    }

    #[test]
    fn panic_messages_are_extracted() {
        assert_eq!(panic_message(&"boom"), "panicked: boom");
        assert_eq!(panic_message(&"boom".to_string()), "panicked: boom");
        assert_eq!(panic_message(&42u8), "panicked");
    }
}
