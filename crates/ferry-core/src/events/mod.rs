//! EventTarget - publish/subscribe のプリミティブ
//!
//! # dispatch の意味論
//! - dispatch 開始時点の登録リストを snapshot する
//! - 各登録は `removed` フラグを持ち、呼び出し直前に確認する
//!   - まだ到達していない listener が途中で remove されたら呼ばない
//!   - すでに呼んだ listener は影響を受けない
//!   - dispatch 中に add された listener はその dispatch では呼ばない
//! - once の登録は callback を呼ぶ「前」に外す
//! - callback 実行中はロックを持たない（callback 内から add/remove できる）

mod listener;

pub use listener::{Listener, ListenerOptions};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::Event;

struct Registration {
    event_type: String,
    listener: Listener,
    once: bool,
    removed: AtomicBool,
}

impl Registration {
    fn matches(&self, event_type: &str, listener: &Listener) -> bool {
        self.event_type == event_type && self.listener.same(listener)
    }

    /// Returns true for exactly one caller.
    fn retire(&self) -> bool {
        self.removed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }
}

#[derive(Default)]
pub struct EventTarget {
    registrations: Mutex<Vec<Arc<Registration>>>,
}

impl EventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Registration>>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_event_listener(&self, event_type: &str, listener: Listener) -> bool {
        self.add_event_listener_with(event_type, listener, ListenerOptions::default())
    }

    /// Register `listener` for `event_type`.
    ///
    /// Adding a `(type, listener)` pair that is already registered is a no-op
    /// and returns `false`.
    pub fn add_event_listener_with(
        &self,
        event_type: &str,
        listener: Listener,
        options: ListenerOptions,
    ) -> bool {
        let mut regs = self.lock();
        if regs.iter().any(|r| r.matches(event_type, &listener)) {
            return false;
        }
        regs.push(Arc::new(Registration {
            event_type: event_type.to_string(),
            listener,
            once: options.once,
            removed: AtomicBool::new(false),
        }));
        true
    }

    pub fn remove_event_listener(&self, event_type: &str, listener: &Listener) -> bool {
        let mut regs = self.lock();
        let Some(pos) = regs.iter().position(|r| r.matches(event_type, listener)) else {
            return false;
        };
        let reg = regs.remove(pos);
        reg.retire();
        true
    }

    /// Invoke the listeners registered for the event's type, in registration
    /// order. Returns how many were invoked.
    pub fn dispatch(&self, event: &Event) -> usize {
        let snapshot: Vec<Arc<Registration>> = self
            .lock()
            .iter()
            .filter(|r| r.event_type == event.event_type())
            .cloned()
            .collect();

        let mut invoked = 0;
        for reg in snapshot {
            if reg.once {
                if !reg.retire() {
                    continue;
                }
                self.lock().retain(|r| !Arc::ptr_eq(r, &reg));
            } else if reg.is_removed() {
                continue;
            }
            reg.listener.call(event);
            invoked += 1;
        }
        invoked
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.lock()
            .iter()
            .filter(|r| r.event_type == event_type)
            .count()
    }

    /// Remove every registration. Dispatches already in progress skip the
    /// listeners they have not reached yet.
    pub fn clear(&self) {
        let drained: Vec<_> = self.lock().drain(..).collect();
        for reg in drained {
            reg.retire();
        }
    }
}
