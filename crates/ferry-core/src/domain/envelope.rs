//! Envelope - チャネル上を流れる 1 単位のメッセージ

use std::fmt;

use crate::codec::Snapshot;

/// Which way an envelope travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    OwnerToWorker,
    WorkerToOwner,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::OwnerToWorker => f.write_str("owner->worker"),
            Direction::WorkerToOwner => f.write_str("worker->owner"),
        }
    }
}

/// Serialized payload + origin + per-direction sequence number.
///
/// Sequence numbers are assigned at send time, start at 1, and are
/// gap-free within one direction while the channel is open.
#[derive(Debug, Clone)]
pub struct Envelope {
    seq: u64,
    direction: Direction,
    payload: Snapshot,
}

impl Envelope {
    pub(crate) fn new(seq: u64, direction: Direction, payload: Snapshot) -> Self {
        Self {
            seq,
            direction,
            payload,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn payload(&self) -> &Snapshot {
        &self.payload
    }
}
