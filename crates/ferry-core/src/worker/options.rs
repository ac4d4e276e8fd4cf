use crate::dispatch::Dispatcher;
use crate::domain::Value;

/// Spawn-time configuration of a worker.
///
/// `init_data` is the only way to hand initial data to a worker: it is
/// serialized at spawn and rebuilt inside the worker context, exactly like a
/// message.
///
/// Workers (and [`Timers`](crate::Timers)) given the same `dispatcher` run
/// their callbacks one at a time on it. Without one, the worker gets its own.
#[derive(Debug, Clone, Default)]
pub struct WorkerOptions {
    pub name: Option<String>,
    pub init_data: Option<Value>,
    pub dispatcher: Option<Dispatcher>,
}

impl WorkerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_init_data(mut self, data: Value) -> Self {
        self.init_data = Some(data);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }
}
