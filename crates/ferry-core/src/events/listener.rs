use std::fmt;
use std::sync::Arc;

use crate::domain::Event;

type Callback = dyn Fn(&Event) + Send + Sync;

/// An event callback. Clones share identity, which is what
/// `remove_event_listener` and duplicate detection compare.
#[derive(Clone)]
pub struct Listener(Arc<Callback>);

impl Listener {
    pub fn new(f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn same(&self, other: &Listener) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn call(&self, event: &Event) {
        (self.0)(event)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Remove the registration before its first invocation.
    pub once: bool,
}

impl ListenerOptions {
    pub fn once() -> Self {
        Self { once: true }
    }
}
