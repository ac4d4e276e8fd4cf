//! Worker handle - owner 側のコントローラ
//!
//! spawn すると 2 つのタスクが立ち上がる:
//! - context: entry point をロードして実行する（worker の logical thread）
//! - pump: worker→owner の envelope を順に受け取り、event の配送を `Dispatcher` に積む
//!   （listener は owner の logical thread で 1 つずつ最後まで実行される）
//!
//! 状態は `watch` で共有し、`terminate()` は呼び出した時点で同期的に Terminated にする。
//! 積まれた配送は実行直前に状態を見るので、terminate 後の listener は呼ばれない。

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

use super::{WorkerOptions, WorkerScope};
use crate::channel::MessageChannel;
use crate::codec;
use crate::dispatch::{Dispatcher, panic_message};
use crate::domain::event::MESSAGE_ERROR;
use crate::domain::{Direction, Event, Handle, Value, WorkerId, WorkerState};
use crate::error::{SerializationError, WorkerError};
use crate::events::{EventTarget, Listener, ListenerOptions};
use crate::observability::ChannelCounts;
use crate::ports::{EntryPoint, Locator, ModuleLoader};

type StateCell = Arc<watch::Sender<WorkerState>>;

enum Source {
    Loader(Arc<dyn ModuleLoader>),
    Inline(Arc<dyn EntryPoint>),
}

struct Shared {
    id: WorkerId,
    name: Option<String>,
    locator: Locator,
    channel: Arc<MessageChannel>,
    events: EventTarget,
    state: StateCell,
    context: Mutex<Option<AbortHandle>>,
    dispatcher: Dispatcher,
}

impl Shared {
    fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Returns whether this call performed the transition.
    fn mark_terminated(&self) -> bool {
        self.state.send_if_modified(|s| {
            if s.can_advance_to(WorkerState::Terminated) {
                *s = WorkerState::Terminated;
                true
            } else {
                false
            }
        })
    }

    /// Last step on the dispatcher: report the failure if still relevant,
    /// then settle in `Terminated`.
    fn finish(&self, failure: Option<WorkerError>) {
        if let Some(err) = failure
            && !self.state().is_terminal()
        {
            tracing::warn!(worker = %self.id, error = %err, "worker failed");
            self.events.dispatch(&Event::error(err.kind(), err.to_string()));
        }
        if self.mark_terminated() {
            tracing::debug!(worker = %self.id, "exited");
        }
        self.teardown();
    }

    /// Drop queued traffic, stop the context, forget listeners.
    fn teardown(&self) -> usize {
        let discarded = self.channel.close();
        let context = self
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(context) = context {
            context.abort();
        }
        self.events.clear();
        discarded
    }
}

/// Owner-side handle of a worker.
///
/// Cheap to clone; every clone controls the same worker. Dropping all
/// handles does not stop the worker, call [`Worker::terminate`].
#[derive(Clone)]
pub struct Worker {
    shared: Arc<Shared>,
}

impl Worker {
    /// Spawn a worker running the entry point `loader` resolves for `locator`.
    ///
    /// Returns immediately in `Starting`. Only the serialization of
    /// `options.init_data` can fail here; load and runtime failures arrive
    /// later as `error` events.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn(
        loader: Arc<dyn ModuleLoader>,
        locator: impl Into<Locator>,
        options: WorkerOptions,
    ) -> Result<Self, WorkerError> {
        Self::start(Source::Loader(loader), locator.into(), options)
    }

    /// Spawn a worker from an already resolved entry point.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn from_entry(entry: Arc<dyn EntryPoint>, options: WorkerOptions) -> Result<Self, WorkerError> {
        Self::start(Source::Inline(entry), Locator::new("inline"), options)
    }

    fn start(source: Source, locator: Locator, options: WorkerOptions) -> Result<Self, WorkerError> {
        let init = options
            .init_data
            .as_ref()
            .map(codec::serialize)
            .transpose()?;

        let dispatcher = options.dispatcher.unwrap_or_default();
        let id = WorkerId::generate();
        let channel = Arc::new(MessageChannel::new());
        let state: StateCell = Arc::new(watch::channel(WorkerState::Starting).0);

        let scope = WorkerScope::new(id, options.name.clone(), Arc::clone(&channel), init);
        let context = tokio::spawn(run_context(
            source,
            locator.clone(),
            scope,
            Arc::clone(&channel),
            Arc::clone(&state),
        ));

        let shared = Arc::new(Shared {
            id,
            name: options.name,
            locator,
            channel,
            events: EventTarget::new(),
            state,
            context: Mutex::new(Some(context.abort_handle())),
            dispatcher,
        });
        tokio::spawn(pump(Arc::clone(&shared), context));

        tracing::debug!(worker = %id, locator = %shared.locator, "spawned");
        Ok(Self { shared })
    }

    pub fn id(&self) -> WorkerId {
        self.shared.id
    }

    pub fn name(&self) -> Option<&str> {
        self.shared.name.as_deref()
    }

    pub fn locator(&self) -> &Locator {
        &self.shared.locator
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    pub fn counts(&self) -> ChannelCounts {
        self.shared.channel.counts()
    }

    /// Send `value` to the worker.
    ///
    /// Buffered while `Starting`; silently dropped once `Terminated`.
    /// Fails only when `value` cannot be serialized, in which case nothing is
    /// enqueued.
    pub fn post_message(&self, value: &Value) -> Result<(), SerializationError> {
        match self.shared.channel.send(Direction::OwnerToWorker, value)? {
            Some(seq) => tracing::trace!(worker = %self.shared.id, seq, "posted to worker"),
            None => tracing::trace!(worker = %self.shared.id, "worker terminated, post dropped"),
        }
        Ok(())
    }

    pub fn add_event_listener(&self, event_type: &str, listener: Listener) -> bool {
        self.add_event_listener_with(event_type, listener, ListenerOptions::default())
    }

    /// Register a listener. Ignored (returns `false`) once terminated, since
    /// no further events can fire.
    pub fn add_event_listener_with(
        &self,
        event_type: &str,
        listener: Listener,
        options: ListenerOptions,
    ) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        self.shared
            .events
            .add_event_listener_with(event_type, listener, options)
    }

    pub fn remove_event_listener(&self, event_type: &str, listener: &Listener) -> bool {
        self.shared.events.remove_event_listener(event_type, listener)
    }

    /// Force the worker into `Terminated`.
    ///
    /// Idempotent; returns whether this call performed the transition. Queued
    /// messages in both directions are dropped and the listeners are released.
    pub fn terminate(&self) -> bool {
        if !self.shared.mark_terminated() {
            return false;
        }
        let discarded = self.shared.teardown();
        tracing::debug!(worker = %self.shared.id, discarded, "terminated");
        true
    }

    /// Resolves once the worker is `Terminated`, for whatever reason.
    pub async fn closed(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|s| s.is_terminal()).await;
    }

    /// This handle as a live [`Value`]. Like any live handle it cannot be
    /// posted to another context.
    pub fn to_value(&self) -> Value {
        Value::Handle(Handle::new("worker", self.clone()))
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("locator", &self.shared.locator)
            .field("state", &self.state())
            .finish()
    }
}

/// Closes the worker's side of the channel however the context ends
/// (return, error, panic or abort).
struct ExitGuard {
    channel: Arc<MessageChannel>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.channel.shutdown_lane(Direction::OwnerToWorker);
        self.channel.close_lane(Direction::WorkerToOwner);
    }
}

async fn run_context(
    source: Source,
    locator: Locator,
    scope: WorkerScope,
    channel: Arc<MessageChannel>,
    state: StateCell,
) -> Result<(), WorkerError> {
    let _exit = ExitGuard { channel };
    let id = scope.id();

    let entry = match source {
        Source::Inline(entry) => entry,
        Source::Loader(loader) => loader.load(&locator).await.map_err(|err| match err {
            WorkerError::Startup { .. } => err,
            other => WorkerError::Startup {
                locator: locator.to_string(),
                reason: other.to_string(),
            },
        })?,
    };

    let started = state.send_if_modified(|s| {
        if s.can_advance_to(WorkerState::Running) {
            *s = WorkerState::Running;
            true
        } else {
            false
        }
    });
    if !started {
        // terminate() が先に来た
        return Ok(());
    }
    tracing::debug!(worker = %id, "running");

    entry.run(scope).await
}

async fn pump(shared: Arc<Shared>, context: JoinHandle<Result<(), WorkerError>>) {
    let id = shared.id;

    while let Some(envelope) = shared.channel.recv(Direction::WorkerToOwner).await {
        if shared.state().is_terminal() {
            break;
        }
        let seq = envelope.seq();
        let event = match codec::deserialize(envelope.payload()) {
            Ok(data) => Event::message(data),
            Err(err) => {
                tracing::warn!(worker = %id, seq, error = %err, "undecodable message");
                Event::new(MESSAGE_ERROR, Value::String(err.to_string()))
            }
        };
        let target = Arc::clone(&shared);
        shared.dispatcher.submit(move || {
            // 先に積まれた listener が terminate() していたら配送しない
            if target.state().is_terminal() {
                return;
            }
            let invoked = target.events.dispatch(&event);
            tracing::trace!(worker = %target.id, seq, invoked, "delivered");
        });
    }

    let failure = match context.await {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err),
        Err(join) if join.is_panic() => {
            Some(WorkerError::Uncaught(panic_message(join.into_panic().as_ref())))
        }
        // aborted by terminate()
        Err(_) => None,
    };

    let target = Arc::clone(&shared);
    shared.dispatcher.submit(move || target.finish(failure));
}
