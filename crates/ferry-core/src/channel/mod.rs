//! MessageChannel - owner と worker の間の順序付き配送路
//!
//! # 設計
//! - 方向（Direction）ごとに独立した lane を持つ
//! - 各 lane は「単一 writer（その方向の送信側）+ 単一 reader（受信側）」
//! - sequence 採番と enqueue は lane のロック内で一体に行う
//! - 閉じた lane への send は黙って捨てる（エラーにしない）

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::codec::{self, Snapshot};
use crate::domain::{Direction, Envelope, Value};
use crate::error::SerializationError;
use crate::observability::{ChannelCounts, LaneCounts};

struct LaneState {
    next_seq: u64,
    queue: VecDeque<Envelope>,
    open: bool,
    sent: u64,
    delivered: u64,
    dropped: u64,
}

impl LaneState {
    fn new() -> Self {
        Self {
            next_seq: 1,
            queue: VecDeque::new(),
            open: true,
            sent: 0,
            delivered: 0,
            dropped: 0,
        }
    }

    fn pop(&mut self) -> Option<Envelope> {
        let envelope = self.queue.pop_front()?;
        self.delivered += 1;
        Some(envelope)
    }

    fn counts(&self) -> LaneCounts {
        LaneCounts {
            sent: self.sent,
            delivered: self.delivered,
            dropped: self.dropped,
            pending: self.queue.len(),
        }
    }
}

struct Lane {
    state: Mutex<LaneState>,
    notify: Notify,
}

impl Lane {
    fn new() -> Self {
        Self {
            state: Mutex::new(LaneState::new()),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LaneState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Two sequenced FIFO lanes between an owner and one worker.
pub struct MessageChannel {
    to_worker: Lane,
    to_owner: Lane,
}

impl MessageChannel {
    pub fn new() -> Self {
        Self {
            to_worker: Lane::new(),
            to_owner: Lane::new(),
        }
    }

    fn lane(&self, direction: Direction) -> &Lane {
        match direction {
            Direction::OwnerToWorker => &self.to_worker,
            Direction::WorkerToOwner => &self.to_owner,
        }
    }

    /// Serialize `value` and enqueue it.
    ///
    /// Returns the assigned sequence number, or `None` when the lane is closed
    /// (the message is dropped silently). A serialization failure leaves the
    /// lane untouched.
    pub fn send(&self, direction: Direction, value: &Value) -> Result<Option<u64>, SerializationError> {
        let payload = codec::serialize(value)?;
        Ok(self.send_snapshot(direction, payload))
    }

    /// Enqueue an already serialized payload.
    pub fn send_snapshot(&self, direction: Direction, payload: Snapshot) -> Option<u64> {
        let lane = self.lane(direction);
        let seq = {
            let mut state = lane.lock();
            if !state.open {
                state.dropped += 1;
                tracing::trace!(%direction, "lane closed, message dropped");
                return None;
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.sent += 1;
            state.queue.push_back(Envelope::new(seq, direction, payload));
            seq
        };
        tracing::trace!(%direction, seq, "enqueued");
        lane.notify.notify_one();
        Some(seq)
    }

    /// Pop the next envelope without waiting.
    pub fn try_recv(&self, direction: Direction) -> Option<Envelope> {
        self.lane(direction).lock().pop()
    }

    /// Wait for the next envelope.
    ///
    /// Returns `None` once the lane is closed and nothing is left to deliver.
    pub async fn recv(&self, direction: Direction) -> Option<Envelope> {
        let lane = self.lane(direction);
        loop {
            {
                let mut state = lane.lock();
                if let Some(envelope) = state.pop() {
                    return Some(envelope);
                }
                if !state.open {
                    return None;
                }
            }
            // notify_one は待ち手がいなければ permit を残すので、ロック解放後の
            // send を取りこぼさない（reader は lane ごとに 1 つ）
            lane.notify.notified().await;
        }
    }

    /// Take every envelope currently queued, in sequence order.
    pub fn drain(&self, direction: Direction) -> Vec<Envelope> {
        let mut state = self.lane(direction).lock();
        let drained: Vec<Envelope> = state.queue.drain(..).collect();
        state.delivered += drained.len() as u64;
        drained
    }

    pub fn is_open(&self, direction: Direction) -> bool {
        self.lane(direction).lock().open
    }

    /// Stop accepting sends in one direction. Queued envelopes stay deliverable.
    pub fn close_lane(&self, direction: Direction) {
        let lane = self.lane(direction);
        lane.lock().open = false;
        lane.notify.notify_one();
    }

    /// Close one direction and discard what is queued in it.
    ///
    /// Returns how many envelopes were discarded.
    pub fn shutdown_lane(&self, direction: Direction) -> usize {
        let lane = self.lane(direction);
        let discarded = {
            let mut state = lane.lock();
            state.open = false;
            let n = state.queue.len();
            state.queue.clear();
            state.dropped += n as u64;
            n
        };
        lane.notify.notify_one();
        discarded
    }

    /// Close both directions and discard whatever is still queued.
    ///
    /// Idempotent. Returns how many queued envelopes were discarded.
    pub fn close(&self) -> usize {
        self.shutdown_lane(Direction::OwnerToWorker) + self.shutdown_lane(Direction::WorkerToOwner)
    }

    pub fn counts(&self) -> ChannelCounts {
        ChannelCounts {
            to_worker: self.to_worker.lock().counts(),
            to_owner: self.to_owner.lock().counts(),
        }
    }
}

impl Default for MessageChannel {
    fn default() -> Self {
        Self::new()
    }
}
