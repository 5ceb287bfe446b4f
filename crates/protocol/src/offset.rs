//! Log offsets and subscription cursor sentinels

use serde::{Deserialize, Serialize};

/// A position in the broker's message log.
///
/// Non-negative values address a concrete log entry. Two negative sentinels
/// steer where a subscription starts:
///
/// - [`Offset::EARLIEST`] (-2) replays from the beginning of the log
/// - [`Offset::LATEST`] (-1) delivers only messages appended afterwards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Offset(pub i64);

impl Offset {
    /// Replay from the beginning of the log
    pub const EARLIEST: Offset = Offset(-2);

    /// Deliver only messages appended after subscription
    pub const LATEST: Offset = Offset(-1);

    /// A concrete log position
    pub fn specific(offset: u64) -> Self {
        Offset(offset as i64)
    }

    /// Whether this is the earliest sentinel
    pub fn is_earliest(self) -> bool {
        self == Self::EARLIEST
    }

    /// Whether this is the latest sentinel
    pub fn is_latest(self) -> bool {
        self == Self::LATEST
    }

    /// The concrete position, if this is not a sentinel
    pub fn position(self) -> Option<u64> {
        (self.0 >= 0).then_some(self.0 as u64)
    }
}

impl From<u64> for Offset {
    fn from(offset: u64) -> Self {
        Offset::specific(offset)
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Offset::EARLIEST => f.write_str("earliest"),
            Offset::LATEST => f.write_str("latest"),
            Offset(n) => write!(f, "{n}"),
        }
    }
}
