//! Timers - setTimeout / setInterval 相当
//!
//! 各タイマーは tokio タスクとして期限を待ち、callback は `Dispatcher` 上で実行する。
//! registry（id → AbortHandle）からの remove で発火と取り消しを決着させる:
//! 先に remove できた側が勝つので、取り消し済みのタイムアウトは発火しない。
//! 判定は dispatcher 上で callback の直前に行う。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::dispatch::Dispatcher;
use crate::domain::TimerId;

type Registry = Arc<Mutex<HashMap<TimerId, AbortHandle>>>;

/// tokio の interval は 0 を受け付けない
const MIN_PERIOD: Duration = Duration::from_millis(1);

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<TimerId, AbortHandle>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A set of pending timers. Dropping it cancels everything still pending.
pub struct Timers {
    registry: Registry,
    dispatcher: Dispatcher,
}

impl Timers {
    /// Timers with a dispatcher of their own.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new() -> Self {
        Self::with_dispatcher(Dispatcher::new())
    }

    /// Run callbacks on `dispatcher`, serialized with whatever else uses it.
    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self {
            registry: Registry::default(),
            dispatcher,
        }
    }

    /// Run `f` once, no earlier than `delay` from now.
    pub fn set_timeout<F>(&self, delay: Duration, f: F) -> TimerId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = TimerId::generate();
        let registry = Arc::clone(&self.registry);
        let dispatcher = self.dispatcher.clone();

        // タスクが先に走っても remove は insert の後になる
        let mut pending = lock(&self.registry);
        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            dispatcher.submit(move || {
                if lock(&registry).remove(&id).is_some() {
                    tracing::trace!(timer = %id, "timeout fired");
                    f();
                }
            });
        });
        pending.insert(id, task.abort_handle());
        id
    }

    /// Run `f` every `period` until cleared. The first run is one period from now.
    pub fn set_interval<F>(&self, period: Duration, f: F) -> TimerId
    where
        F: FnMut() + Send + 'static,
    {
        let id = TimerId::generate();
        let registry = Arc::clone(&self.registry);
        let dispatcher = self.dispatcher.clone();
        let period = period.max(MIN_PERIOD);
        let f = Arc::new(Mutex::new(f));

        let mut pending = lock(&self.registry);
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !lock(&registry).contains_key(&id) {
                    break;
                }
                let registry = Arc::clone(&registry);
                let f = Arc::clone(&f);
                dispatcher.submit(move || {
                    if lock(&registry).contains_key(&id) {
                        let mut f = f.lock().unwrap_or_else(PoisonError::into_inner);
                        (*f)();
                    }
                });
            }
        });
        pending.insert(id, task.abort_handle());
        id
    }

    /// Cancel a timer. Returns `false` if it already fired or was cleared.
    pub fn clear(&self, id: TimerId) -> bool {
        let Some(task) = lock(&self.registry).remove(&id) else {
            return false;
        };
        task.abort();
        tracing::trace!(timer = %id, "cleared");
        true
    }

    /// Number of timers still pending.
    pub fn active(&self) -> usize {
        lock(&self.registry).len()
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        for (_, task) in lock(&self.registry).drain() {
            task.abort();
        }
    }
}
