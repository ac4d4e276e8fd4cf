use serde::{Deserialize, Serialize};

/// Per-direction traffic counters of a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneCounts {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub pending: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCounts {
    pub to_worker: LaneCounts,
    pub to_owner: LaneCounts,
}
