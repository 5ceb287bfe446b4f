//! Subscriber registry
//!
//! Tracks one [`SubscriberState`] per subscriber id: a cursor into the log,
//! a single-slot wake-up signal, and the delivery handler. Fan-out is
//! cursor-per-subscriber; the registry itself never touches the log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use gpufleet_protocol::MessageHandler;

use crate::error::{BrokerError, Result};
use crate::stats::SubscriberInfo;

/// Per-subscriber delivery state.
///
/// The cursor is the next offset to deliver; at any moment the subscriber
/// has received exactly `[start_cursor, cursor)`, in order. The notify
/// signal is a one-element mailbox: redundant notifications coalesce, which
/// is safe because the delivery task drains everything available on wake.
pub struct SubscriberState {
    id: String,
    cursor: AtomicU64,
    notify: Notify,
    handler: Arc<dyn MessageHandler>,
    closed: CancellationToken,
}

impl SubscriberState {
    pub(crate) fn new(
        id: impl Into<String>,
        start_cursor: u64,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            id: id.into(),
            cursor: AtomicU64::new(start_cursor),
            notify: Notify::new(),
            handler,
            closed: CancellationToken::new(),
        }
    }

    /// Subscriber id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next offset to deliver
    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Move the cursor (used by seek; the delivery task advances via
    /// [`SubscriberState::advance_from`])
    pub(crate) fn set_cursor(&self, cursor: u64) {
        self.cursor.store(cursor, Ordering::Release);
    }

    /// Advance `current -> current + 1` unless a concurrent seek moved the
    /// cursor first. Either way the next drain iteration re-reads it.
    pub(crate) fn advance_from(&self, current: u64) {
        let _ = self.cursor.compare_exchange(
            current,
            current + 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Fill the wake-up slot if it is empty; drop the notification otherwise
    pub fn arm(&self) {
        self.notify.notify_one();
    }

    /// Wait until the wake-up slot is filled, consuming it
    pub(crate) async fn wait(&self) {
        self.notify.notified().await;
    }

    /// The delivery handler supplied at subscribe time
    pub(crate) fn handler(&self) -> &Arc<dyn MessageHandler> {
        &self.handler
    }

    /// Token cancelled on unsubscribe or broker shutdown
    pub(crate) fn closed(&self) -> &CancellationToken {
        &self.closed
    }
}

impl std::fmt::Debug for SubscriberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberState")
            .field("id", &self.id)
            .field("cursor", &self.cursor())
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

/// Mapping `subscriber id -> state`; ids are unique across the registry
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<String, Arc<SubscriberState>>>,
}

impl SubscriberRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Fails with [`BrokerError::SubscriberExists`]
    /// when the id is taken, leaving the existing entry untouched.
    pub fn insert(&self, state: Arc<SubscriberState>) -> Result<()> {
        let mut subscribers = self.subscribers.write();
        if subscribers.contains_key(state.id()) {
            return Err(BrokerError::SubscriberExists);
        }
        subscribers.insert(state.id().to_owned(), state);
        Ok(())
    }

    /// Remove a subscriber, cancelling its delivery task
    pub fn remove(&self, id: &str) -> Result<Arc<SubscriberState>> {
        let state = self
            .subscribers
            .write()
            .remove(id)
            .ok_or(BrokerError::SubscriberNotFound)?;
        state.closed().cancel();
        Ok(state)
    }

    /// Look up a subscriber by id
    pub fn get(&self, id: &str) -> Option<Arc<SubscriberState>> {
        self.subscribers.read().get(id).cloned()
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Arm every subscriber's wake-up signal. Signals already armed absorb
    /// the notification, so a burst of appends costs one wake-up.
    pub fn notify_all(&self) {
        for state in self.subscribers.read().values() {
            state.arm();
        }
    }

    /// Cancel all delivery tasks and clear the registry (broker shutdown)
    pub fn close_all(&self) {
        let mut subscribers = self.subscribers.write();
        for state in subscribers.values() {
            state.closed().cancel();
        }
        subscribers.clear();
    }

    /// Per-subscriber stats rows; `lag = max(0, latest - cursor)`
    pub fn snapshot(&self, latest_offset: u64) -> Vec<SubscriberInfo> {
        self.subscribers
            .read()
            .values()
            .map(|state| SubscriberInfo {
                id: state.id().to_owned(),
                current_offset: state.cursor(),
                lag: latest_offset.saturating_sub(state.cursor()),
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
