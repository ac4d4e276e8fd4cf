//! WorkerScope - worker 側から見た実行環境
//!
//! worker context が持つのは channel への参照だけ（owner の handle は持たない）。

use std::sync::Arc;

use crate::channel::MessageChannel;
use crate::codec::{self, Snapshot};
use crate::domain::{Direction, Value, WorkerId};
use crate::error::{SerializationError, WorkerError};

pub struct WorkerScope {
    id: WorkerId,
    name: Option<String>,
    channel: Arc<MessageChannel>,
    init: Option<Snapshot>,
    last_seq: u64,
}

impl WorkerScope {
    pub(crate) fn new(
        id: WorkerId,
        name: Option<String>,
        channel: Arc<MessageChannel>,
        init: Option<Snapshot>,
    ) -> Self {
        Self {
            id,
            name,
            channel,
            init,
            last_seq: 0,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Fresh copy of the spawn-time payload (each call deserializes again).
    pub fn init_data(&self) -> Result<Option<Value>, SerializationError> {
        self.init.as_ref().map(codec::deserialize).transpose()
    }

    /// Send `value` to the owner. Silently dropped once the worker is terminated.
    pub fn post_message(&self, value: &Value) -> Result<(), SerializationError> {
        match self.channel.send(Direction::WorkerToOwner, value)? {
            Some(seq) => tracing::trace!(worker = %self.id, seq, "posted to owner"),
            None => tracing::trace!(worker = %self.id, "owner side closed, post dropped"),
        }
        Ok(())
    }

    /// Next owner→worker message, in send order.
    ///
    /// `Ok(None)` once the worker is terminated or closed.
    pub async fn recv(&mut self) -> Result<Option<Value>, WorkerError> {
        let Some(envelope) = self.channel.recv(Direction::OwnerToWorker).await else {
            return Ok(None);
        };
        debug_assert_eq!(envelope.seq(), self.last_seq + 1, "inbound sequence gap");
        self.last_seq = envelope.seq();
        Ok(Some(codec::deserialize(envelope.payload())?))
    }

    /// Stop accepting new messages from the owner. Messages already queued
    /// are discarded; `recv` returns `Ok(None)` afterwards.
    pub fn close(&self) {
        let discarded = self.channel.shutdown_lane(Direction::OwnerToWorker);
        tracing::debug!(worker = %self.id, discarded, "worker closed itself");
    }
}
