//! Queue statistics exposed over `get_stats` frames and `GET /stats`

use serde::{Deserialize, Serialize};

/// Broker-wide statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Total messages ever appended to the log
    pub total_messages: u64,

    /// Offset of the oldest retained message (always 0; the log never
    /// compacts)
    pub oldest_offset: u64,

    /// Offset of the most recent message, 0 while the log is empty
    pub latest_offset: u64,

    /// Number of registered subscribers
    pub subscriber_count: usize,

    /// Per-subscriber cursor positions
    pub subscribers: Vec<SubscriberInfo>,
}

/// One subscriber's position relative to the log tail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberInfo {
    /// Subscriber id
    pub id: String,

    /// Next offset to deliver
    pub current_offset: u64,

    /// How far behind the latest message, clamped at zero
    pub lag: u64,
}
