//! Broker facade: log + registry + per-subscriber delivery tasks

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};
use uuid::Uuid;

use gpufleet_protocol::{MessageHandler, Offset};

use crate::error::{BrokerError, Result};
use crate::log::MessageLog;
use crate::registry::{SubscriberRegistry, SubscriberState};
use crate::stats::QueueStats;

/// The broker core.
///
/// Owns the append-only log and the subscriber registry, and runs one
/// delivery task per subscriber. Producers call [`Broker::publish`];
/// every registered subscriber independently receives every message in
/// offset order.
pub struct Broker {
    log: Arc<MessageLog>,
    registry: Arc<SubscriberRegistry>,
    shutdown: CancellationToken,
    deliveries: TaskTracker,
}

impl Broker {
    /// Create a broker with the default log capacity hint
    pub fn new() -> Self {
        Self::with_log_capacity(0)
    }

    /// Create a broker whose log is pre-sized to `capacity` entries
    pub fn with_log_capacity(capacity: usize) -> Self {
        Self {
            log: Arc::new(MessageLog::with_capacity(capacity)),
            registry: Arc::new(SubscriberRegistry::new()),
            shutdown: CancellationToken::new(),
            deliveries: TaskTracker::new(),
        }
    }

    /// The underlying log (read-only access for stats and tests)
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Append one payload and wake all subscribers.
    ///
    /// The returned offset is the message's position in the log and the
    /// global delivery order observed by every subscriber.
    pub fn publish(&self, payload: Bytes) -> Result<(Uuid, u64)> {
        let assigned = self.log.append(payload)?;
        self.registry.notify_all();
        Ok(assigned)
    }

    /// Append several payloads contiguously, then wake all subscribers once
    pub fn publish_batch(&self, payloads: Vec<Bytes>) -> Result<(u64, usize)> {
        let assigned = self.log.append_batch(payloads)?;
        self.registry.notify_all();
        Ok(assigned)
    }

    /// Register a subscriber and start its delivery task.
    ///
    /// `start` resolves against the current log (`EARLIEST`, `LATEST`, or a
    /// clamped specific offset). The wake-up signal is armed immediately so
    /// any backlog drains without waiting for the next publish. Fails with
    /// [`BrokerError::SubscriberExists`] if `id` is registered; the existing
    /// subscriber's cursor is not perturbed.
    pub fn subscribe(
        &self,
        id: impl Into<String>,
        start: Offset,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(BrokerError::Shutdown);
        }

        let start_cursor = self.log.resolve(start);
        let state = Arc::new(SubscriberState::new(id, start_cursor, handler));
        self.registry.insert(Arc::clone(&state))?;

        debug!(
            subscriber_id = state.id(),
            start_cursor, "subscriber registered"
        );

        state.arm();
        let log = Arc::clone(&self.log);
        self.deliveries.spawn(delivery_loop(log, state));
        Ok(())
    }

    /// Remove a subscriber; its delivery task exits after the current
    /// message, if any.
    pub fn unsubscribe(&self, id: &str) -> Result<()> {
        let state = self.registry.remove(id)?;
        debug!(
            subscriber_id = id,
            cursor = state.cursor(),
            "subscriber removed"
        );
        Ok(())
    }

    /// Current cursor of a subscriber
    pub fn cursor(&self, id: &str) -> Result<u64> {
        self.registry
            .get(id)
            .map(|state| state.cursor())
            .ok_or(BrokerError::SubscriberNotFound)
    }

    /// Seek a subscriber's cursor, clamped to `[0, len]`, and wake it so
    /// delivery resumes from the new position. Returns the clamped cursor.
    pub fn set_cursor(&self, id: &str, offset: u64) -> Result<u64> {
        let state = self
            .registry
            .get(id)
            .ok_or(BrokerError::SubscriberNotFound)?;

        let clamped = offset.min(self.log.len());
        state.set_cursor(clamped);
        state.arm();
        Ok(clamped)
    }

    /// Statistics snapshot for the stats frame and HTTP endpoint
    pub fn stats(&self) -> QueueStats {
        let latest_offset = self.log.latest_offset().unwrap_or(0);
        QueueStats {
            total_messages: self.log.total_appended(),
            oldest_offset: 0,
            latest_offset,
            subscriber_count: self.registry.len(),
            subscribers: self.registry.snapshot(latest_offset),
        }
    }

    /// Token cancelled when the broker shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop accepting appends, close all subscribers, and wait for delivery
    /// tasks to exit. Tasks that outlast `deadline` are abandoned.
    pub async fn shutdown(&self, deadline: Duration) {
        self.log.shut_down();
        self.shutdown.cancel();
        self.registry.close_all();

        self.deliveries.close();
        if tokio::time::timeout(deadline, self.deliveries.wait())
            .await
            .is_err()
        {
            warn!("delivery tasks outlived the shutdown deadline");
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivery task for one subscriber: wait for the wake-up signal, then
/// drain every available message in offset order.
async fn delivery_loop(log: Arc<MessageLog>, state: Arc<SubscriberState>) {
    loop {
        tokio::select! {
            _ = state.closed().cancelled() => break,
            _ = state.wait() => drain(&log, &state).await,
        }
    }
    debug!(subscriber_id = state.id(), "delivery task exited");
}

/// Deliver messages until the cursor reaches the log tail.
///
/// The cursor advances whether or not the handler succeeds: a failing sink
/// must not wedge the log behind one subscriber, and retrying is the
/// consumer's concern.
async fn drain(log: &MessageLog, state: &SubscriberState) {
    loop {
        if state.closed().is_cancelled() {
            return;
        }

        let cursor = state.cursor();
        let Some(message) = log.at(cursor) else {
            return;
        };

        if let Err(error) = state.handler().handle(message).await {
            warn!(
                subscriber_id = state.id(),
                offset = cursor,
                %error,
                "handler failed; advancing cursor"
            );
        }
        state.advance_from(cursor);
    }
}

#[cfg(test)]
#[path = "broker_test.rs"]
mod tests;
