//! Append-only message log

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use uuid::Uuid;

use gpufleet_protocol::{Message, Offset};

use crate::error::{BrokerError, Result};

/// Default initial capacity when no hint is configured
const DEFAULT_CAPACITY: usize = 10_000;

/// Append-only, monotonically-numbered store of opaque payloads.
///
/// Offsets are dense: the message at offset `k` is the `k`-th append, and
/// `offset = len` is assigned inside the write lock, so concurrent appends
/// linearize in offset order. Entries are immutable once placed; readers
/// get shared handles and can never observe a partially constructed entry.
#[derive(Debug)]
pub struct MessageLog {
    entries: RwLock<Vec<Arc<Message>>>,
    total_appended: AtomicU64,
    shutdown: AtomicBool,
}

impl MessageLog {
    /// Create a log with the default capacity hint
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a log pre-sized to `capacity` entries (it still grows)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
        Self {
            entries: RwLock::new(Vec::with_capacity(capacity)),
            total_appended: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Append one payload, assigning the next offset.
    ///
    /// Returns the generated message id and the assigned offset. Fails only
    /// after [`MessageLog::shut_down`].
    pub fn append(&self, payload: Bytes) -> Result<(Uuid, u64)> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(BrokerError::Shutdown);
        }

        let mut message = Message::new(payload);
        let mut entries = self.entries.write();
        message.offset = entries.len() as u64;
        let assigned = (message.id, message.offset);
        entries.push(Arc::new(message));
        drop(entries);

        self.total_appended.fetch_add(1, Ordering::Relaxed);
        Ok(assigned)
    }

    /// Append several payloads under one critical section.
    ///
    /// The resulting offsets are contiguous: `first_offset..first_offset +
    /// count`. Returns the first assigned offset and the count.
    pub fn append_batch(&self, payloads: Vec<Bytes>) -> Result<(u64, usize)> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(BrokerError::Shutdown);
        }

        let count = payloads.len();
        let mut entries = self.entries.write();
        let first_offset = entries.len() as u64;
        for payload in payloads {
            let mut message = Message::new(payload);
            message.offset = entries.len() as u64;
            entries.push(Arc::new(message));
        }
        drop(entries);

        self.total_appended.fetch_add(count as u64, Ordering::Relaxed);
        Ok((first_offset, count))
    }

    /// The message at `offset`, or `None` when not (yet) available.
    ///
    /// Out-of-range reads are not an error: a subscriber at the tail polls
    /// until the next append lands.
    pub fn at(&self, offset: u64) -> Option<Arc<Message>> {
        self.entries.read().get(offset as usize).cloned()
    }

    /// Current number of messages in the log
    pub fn len(&self) -> u64 {
        self.entries.read().len() as u64
    }

    /// Whether the log holds no messages
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Total messages ever appended (equals `len`, kept separately so the
    /// stats path does not take the entries lock)
    pub fn total_appended(&self) -> u64 {
        self.total_appended.load(Ordering::Relaxed)
    }

    /// Map a cursor to a concrete starting offset against the current log:
    /// `EARLIEST -> 0`, `LATEST -> len`, `k -> clamp(k, 0, len)`.
    pub fn resolve(&self, cursor: Offset) -> u64 {
        let len = self.len();
        match cursor {
            Offset::EARLIEST => 0,
            Offset::LATEST => len,
            Offset(k) if k < 0 => 0,
            Offset(k) => (k as u64).min(len),
        }
    }

    /// Offset of the most recent message, `None` on an empty log
    pub fn latest_offset(&self) -> Option<u64> {
        let len = self.len();
        (len > 0).then(|| len - 1)
    }

    /// Refuse further appends. Reads keep working.
    pub fn shut_down(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Whether the log has been shut down
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "log_test.rs"]
mod tests;
