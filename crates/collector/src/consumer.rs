//! Subscription handler and housekeeping loops

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use gpufleet_client::{BrokerClient, Message, MessageHandler, Offset};
use gpufleet_config::CollectorConfig;
use gpufleet_model::MetricBatch;
use gpufleet_protocol::HandlerError;
use gpufleet_storage::Storage;

/// Parse the start-offset setting: `latest`, `earliest`, or a number
pub fn parse_start_offset(raw: &str) -> anyhow::Result<Offset> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "latest" => Ok(Offset::LATEST),
        "earliest" => Ok(Offset::EARLIEST),
        other => other
            .parse::<u64>()
            .map(Offset::specific)
            .map_err(|_| anyhow::anyhow!("expected latest, earliest, or an offset, got {raw:?}")),
    }
}

/// Decodes delivered batch envelopes and writes them to storage.
///
/// Each message payload is one JSON [`MetricBatch`]; its records go to the
/// store in batch order as a borrowed slice, without copying them out of
/// the envelope. Write failures are surfaced to the client (which nacks)
/// but delivery still progresses; replaying lost batches is a resume-time
/// concern, not a delivery-loop one.
pub struct BatchWriter {
    storage: Arc<dyn Storage>,
    batches_processed: AtomicU64,
    metrics_stored: AtomicU64,
}

impl BatchWriter {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            batches_processed: AtomicU64::new(0),
            metrics_stored: AtomicU64::new(0),
        }
    }

    /// Batches and metrics written so far
    pub fn totals(&self) -> (u64, u64) {
        (
            self.batches_processed.load(Ordering::Relaxed),
            self.metrics_stored.load(Ordering::Relaxed),
        )
    }
}

#[async_trait]
impl MessageHandler for BatchWriter {
    async fn handle(&self, message: Arc<Message>) -> Result<(), HandlerError> {
        let batch: MetricBatch = serde_json::from_slice(&message.payload).map_err(|e| {
            warn!(offset = message.offset, error = %e, "undecodable batch payload");
            HandlerError::new(format!("decode batch: {e}"))
        })?;

        self.storage
            .store_batch(&batch.metrics)
            .await
            .map_err(|e| {
                error!(
                    batch_id = %batch.batch_id,
                    count = batch.len(),
                    error = %e,
                    "failed to store batch"
                );
                HandlerError::new(format!("store batch: {e}"))
            })?;

        let batches = self.batches_processed.fetch_add(1, Ordering::Relaxed) + 1;
        let metrics = self
            .metrics_stored
            .fetch_add(batch.len() as u64, Ordering::Relaxed)
            + batch.len() as u64;

        debug!(
            batch_id = %batch.batch_id,
            source = %batch.source,
            count = batch.len(),
            total_batches = batches,
            total_metrics = metrics,
            "batch stored"
        );
        Ok(())
    }
}

/// The consumer: subscription plus retention and stats loops
pub struct Consumer {
    client: BrokerClient,
    storage: Arc<dyn Storage>,
    config: CollectorConfig,
    writer: Arc<BatchWriter>,
}

impl Consumer {
    pub fn new(
        client: BrokerClient,
        storage: Arc<dyn Storage>,
        config: CollectorConfig,
        writer: Arc<BatchWriter>,
    ) -> Self {
        Self {
            client,
            storage,
            config,
            writer,
        }
    }

    /// Subscribe and run until cancelled
    pub async fn run(&self, start_offset: Offset, cancel: CancellationToken) -> anyhow::Result<()> {
        self.client
            .subscribe(
                self.config.instance_id.clone(),
                start_offset,
                Arc::clone(&self.writer) as Arc<dyn MessageHandler>,
            )
            .await?;
        info!(subscriber_id = %self.config.instance_id, "subscribed");

        let cleanup = tokio::spawn(cleanup_loop(
            Arc::clone(&self.storage),
            self.config.clone(),
            cancel.clone(),
        ));
        let stats = tokio::spawn(stats_loop(
            Arc::clone(&self.storage),
            Arc::clone(&self.writer),
            self.config.clone(),
            cancel.clone(),
        ));

        cancel.cancelled().await;

        if let Err(e) = self.client.unsubscribe(&self.config.instance_id).await {
            debug!(error = %e, "unsubscribe on shutdown failed");
        }

        let _ = cleanup.await;
        let _ = stats.await;
        Ok(())
    }
}

/// Periodically delete stored telemetry older than the retention window
async fn cleanup_loop(storage: Arc<dyn Storage>, config: CollectorConfig, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(config.cleanup_interval);
    // The immediate first tick would sweep at startup for no reason.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        match storage.cleanup(config.retention_period).await {
            Ok(0) => debug!("retention sweep complete"),
            Ok(removed) => info!(removed, "retention sweep removed old metrics"),
            Err(e) => warn!(error = %e, "retention sweep failed"),
        }
    }
}

/// Periodically log processing counters and storage totals
async fn stats_loop(
    storage: Arc<dyn Storage>,
    writer: Arc<BatchWriter>,
    config: CollectorConfig,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.stats_interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let (batches, metrics) = writer.totals();
        let stats = storage.stats();
        info!(
            batches,
            metrics,
            stored_total = stats.total_metrics,
            gpus = stats.total_gpus,
            "collector stats"
        );
    }
}

#[cfg(test)]
#[path = "consumer_test.rs"]
mod tests;
