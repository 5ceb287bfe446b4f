//! Collect and publish loops

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use gpufleet_client::BrokerClient;
use gpufleet_config::StreamerConfig;
use gpufleet_model::{GpuMetric, MetricBatch};
use gpufleet_parser::CsvSource;

/// Publish attempts per batch before it is dropped
const MAX_PUBLISH_ATTEMPTS: u32 = 3;

/// The streamer pipeline: a collect task filling a shared buffer and a
/// publish task flushing it as batches.
pub struct Streamer {
    client: BrokerClient,
    config: StreamerConfig,
    buffer: Mutex<Vec<GpuMetric>>,
    batches_sent: AtomicU64,
    metrics_sent: AtomicU64,
}

impl Streamer {
    /// Create the pipeline around a connected client
    pub fn new(client: BrokerClient, config: StreamerConfig) -> Arc<Self> {
        Arc::new(Self {
            client,
            config,
            buffer: Mutex::new(Vec::new()),
            batches_sent: AtomicU64::new(0),
            metrics_sent: AtomicU64::new(0),
        })
    }

    /// Run both loops until cancellation or source exhaustion.
    ///
    /// The publisher always outlives the collector so the last partial
    /// buffer is flushed before returning.
    pub async fn run(self: &Arc<Self>, cancel: CancellationToken) -> anyhow::Result<()> {
        let collector_done = CancellationToken::new();

        let collect = tokio::spawn(collect_loop(
            Arc::clone(self),
            cancel.clone(),
            collector_done.clone(),
        ));
        let publish = tokio::spawn(publish_loop(Arc::clone(self), cancel, collector_done));

        collect.await?;
        publish.await?;
        Ok(())
    }

    /// Batches and metrics published so far
    pub fn totals(&self) -> (u64, u64) {
        (
            self.batches_sent.load(Ordering::Relaxed),
            self.metrics_sent.load(Ordering::Relaxed),
        )
    }

    /// Swap the buffer for an empty one and wrap the contents in a batch
    /// envelope. Returns `None` when there is nothing to publish.
    fn drain(&self) -> Option<MetricBatch> {
        let metrics = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                return None;
            }
            std::mem::take(&mut *buffer)
        };
        Some(MetricBatch::new(self.config.instance_id.clone(), metrics))
    }

    /// Publish the current buffer as one batch, retrying on transport
    /// failure. An exhausted retry budget drops the batch.
    async fn flush(&self) {
        let Some(batch) = self.drain() else {
            return;
        };
        let count = batch.len() as u64;

        let payload = match serde_json::to_vec(&batch) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                error!(batch_id = %batch.batch_id, error = %e, "failed to encode batch");
                return;
            }
        };

        for attempt in 1..=MAX_PUBLISH_ATTEMPTS {
            match self.client.publish(payload.clone()).await {
                Ok(()) => {
                    let batches = self.batches_sent.fetch_add(1, Ordering::Relaxed) + 1;
                    let metrics = self.metrics_sent.fetch_add(count, Ordering::Relaxed) + count;
                    info!(
                        batch_id = %batch.batch_id,
                        count,
                        total_batches = batches,
                        total_metrics = metrics,
                        "batch published"
                    );
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "publish attempt failed");
                    if attempt < MAX_PUBLISH_ATTEMPTS {
                        tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                    }
                }
            }
        }

        error!(batch_id = %batch.batch_id, count, "dropping batch after retries");
    }
}

/// Pull one record per tick from the CSV source into the buffer
async fn collect_loop(streamer: Arc<Streamer>, cancel: CancellationToken, done: CancellationToken) {
    // Signals the publisher to final-flush when this task exits.
    let _done_guard = done.drop_guard();

    let mut source = match CsvSource::open(&streamer.config.csv_path) {
        Ok(source) => source,
        Err(e) => {
            error!(path = %streamer.config.csv_path, error = %e, "failed to open source");
            return;
        }
    };

    let mut ticker = tokio::time::interval(streamer.config.collect_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        match source.read_next() {
            Ok(Some(mut metric)) => {
                // The pipeline's clock, not the source file's.
                metric.timestamp = Utc::now();

                let buffered = {
                    let mut buffer = streamer.buffer.lock();
                    buffer.push(metric);
                    buffer.len()
                };
                if buffered % 100 == 0 {
                    debug!(buffered, "buffer filling");
                }
            }
            Ok(None) => {
                if streamer.config.looped {
                    info!("source exhausted; restarting from the top");
                    if let Err(e) = source.reset() {
                        error!(error = %e, "failed to restart source");
                        return;
                    }
                } else {
                    info!("source exhausted; collector finishing");
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "skipping unreadable record");
            }
        }
    }
}

/// Flush the buffer every publish tick; on shutdown or collector exit,
/// flush one final time.
async fn publish_loop(
    streamer: Arc<Streamer>,
    cancel: CancellationToken,
    collector_done: CancellationToken,
) {
    let mut ticker = tokio::time::interval(streamer.config.publish_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                streamer.flush().await;
                return;
            }
            _ = collector_done.cancelled() => {
                streamer.flush().await;
                return;
            }
            _ = ticker.tick() => {
                streamer.flush().await;
            }
        }
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
