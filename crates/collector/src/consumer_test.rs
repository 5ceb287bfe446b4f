use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use gpufleet_model::{GpuInfo, GpuMetric, TelemetryQuery, METRIC_GPU_UTIL};
use gpufleet_storage::{StorageError, StorageStats};

use super::*;

/// In-memory storage double that records batches and can be told to fail
#[derive(Default)]
struct FakeStorage {
    batches: Mutex<Vec<Vec<GpuMetric>>>,
    fail_writes: bool,
}

#[async_trait]
impl Storage for FakeStorage {
    async fn store(&self, metric: &GpuMetric) -> gpufleet_storage::Result<()> {
        self.store_batch(std::slice::from_ref(metric)).await
    }

    async fn store_batch(&self, metrics: &[GpuMetric]) -> gpufleet_storage::Result<()> {
        if self.fail_writes {
            return Err(StorageError::WriteRejected {
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.batches.lock().push(metrics.to_vec());
        Ok(())
    }

    async fn gpus(&self) -> gpufleet_storage::Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn gpu_by_uuid(&self, _uuid: &str) -> gpufleet_storage::Result<Option<GpuInfo>> {
        Ok(None)
    }

    async fn query(&self, _query: &TelemetryQuery) -> gpufleet_storage::Result<Vec<GpuMetric>> {
        Err(StorageError::Unsupported("query"))
    }

    async fn cleanup(&self, _retention: Duration) -> gpufleet_storage::Result<u64> {
        Ok(0)
    }

    fn stats(&self) -> StorageStats {
        StorageStats::default()
    }
}

fn delivered(batch: &MetricBatch) -> Arc<Message> {
    let payload = Bytes::from(serde_json::to_vec(batch).unwrap());
    Arc::new(Message::new(payload))
}

#[test]
fn start_offset_parses_names_and_numbers() {
    assert_eq!(parse_start_offset("latest").unwrap(), Offset::LATEST);
    assert_eq!(parse_start_offset("").unwrap(), Offset::LATEST);
    assert_eq!(parse_start_offset("EARLIEST").unwrap(), Offset::EARLIEST);
    assert_eq!(parse_start_offset("42").unwrap(), Offset::specific(42));
    assert!(parse_start_offset("yesterday").is_err());
}

#[tokio::test]
async fn batch_is_stored_in_record_order() {
    let storage = Arc::new(FakeStorage::default());
    let writer = BatchWriter::new(storage.clone());

    let metrics: Vec<_> = (0..4)
        .map(|n| GpuMetric::new(METRIC_GPU_UTIL, format!("GPU-{n}"), n as f64))
        .collect();
    let batch = MetricBatch::new("streamer-1", metrics);

    writer.handle(delivered(&batch)).await.unwrap();

    let stored = storage.batches.lock();
    assert_eq!(stored.len(), 1);
    let uuids: Vec<_> = stored[0].iter().map(|m| m.uuid.as_str()).collect();
    assert_eq!(uuids, ["GPU-0", "GPU-1", "GPU-2", "GPU-3"]);
    drop(stored);

    assert_eq!(writer.totals(), (1, 4));
}

#[tokio::test]
async fn undecodable_payload_is_an_error_and_counts_nothing() {
    let storage = Arc::new(FakeStorage::default());
    let writer = BatchWriter::new(storage.clone());

    let message = Arc::new(Message::new(Bytes::from_static(b"{\"not\":\"a batch\"}")));
    assert!(writer.handle(message).await.is_err());

    assert!(storage.batches.lock().is_empty());
    assert_eq!(writer.totals(), (0, 0));
}

#[tokio::test]
async fn storage_failure_is_surfaced_without_counting() {
    let storage = Arc::new(FakeStorage {
        fail_writes: true,
        ..Default::default()
    });
    let writer = BatchWriter::new(storage);

    let batch = MetricBatch::new(
        "streamer-1",
        vec![GpuMetric::new(METRIC_GPU_UTIL, "GPU-0", 1.0)],
    );
    let err = writer.handle(delivered(&batch)).await.unwrap_err();
    assert!(err.to_string().contains("store batch"));
    assert_eq!(writer.totals(), (0, 0));
}
