//! Batch envelope published by streamers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::GpuMetric;

/// A collection of metrics shipped through the broker as one payload.
///
/// Record order inside a batch is preserved end-to-end: the collector hands
/// the metrics to storage in exactly the order the streamer buffered them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBatch {
    /// Unique identifier for this batch
    pub batch_id: Uuid,

    /// Streamer instance that created this batch
    pub source: String,

    /// When the batch was assembled
    pub collected_at: DateTime<Utc>,

    /// Ordered metrics in this batch
    pub metrics: Vec<GpuMetric>,
}

impl MetricBatch {
    /// Wrap a set of metrics in a fresh envelope
    pub fn new(source: impl Into<String>, metrics: Vec<GpuMetric>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            source: source.into(),
            collected_at: Utc::now(),
            metrics,
        }
    }

    /// Number of metrics in the batch
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Whether the batch carries no metrics
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
