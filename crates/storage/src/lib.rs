//! Time-series storage backends
//!
//! The collector persists telemetry through the [`Storage`] trait; the
//! production backend is [`InfluxStorage`], which speaks InfluxDB v2's
//! HTTP API directly: line protocol for writes, the delete API for
//! retention sweeps.

mod influx;
mod line;

pub use influx::{InfluxConfig, InfluxStorage};
pub use line::encode_metric;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gpufleet_model::{GpuInfo, GpuMetric, TelemetryQuery};

/// Telemetry storage used by the collector.
///
/// `store_batch` must persist records in the order given; batches arrive
/// from the broker in offset order and that order is the pipeline's
/// delivery contract.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist a single metric
    async fn store(&self, metric: &GpuMetric) -> Result<()>;

    /// Persist a batch of metrics, preserving order
    async fn store_batch(&self, metrics: &[GpuMetric]) -> Result<()>;

    /// UUIDs of all GPUs observed by this storage instance
    async fn gpus(&self) -> Result<Vec<String>>;

    /// Summary info for one GPU, if it has been observed
    async fn gpu_by_uuid(&self, uuid: &str) -> Result<Option<GpuInfo>>;

    /// Fetch telemetry matching `query`. Write-oriented backends may not
    /// support reads and return [`StorageError::Unsupported`].
    async fn query(&self, query: &TelemetryQuery) -> Result<Vec<GpuMetric>>;

    /// Delete data older than `retention`, returning the number of removed
    /// records when the backend can count them (0 otherwise)
    async fn cleanup(&self, retention: Duration) -> Result<u64>;

    /// Storage statistics snapshot
    fn stats(&self) -> StorageStats;
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Total metrics written through this instance
    pub total_metrics: u64,

    /// Distinct GPUs observed
    pub total_gpus: usize,

    /// Timestamp of the oldest metric written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_metric: Option<DateTime<Utc>>,

    /// Timestamp of the newest metric written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_metric: Option<DateTime<Utc>>,
}

/// Errors from storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend health check failed at startup
    #[error("storage health check failed: {status}")]
    Unhealthy { status: String },

    /// HTTP request failed before a response arrived
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend rejected a write
    #[error("write rejected ({status}): {body}")]
    WriteRejected { status: u16, body: String },

    /// Backend rejected a delete
    #[error("delete rejected ({status}): {body}")]
    DeleteRejected { status: u16, body: String },

    /// Operation not supported by this backend
    #[error("{0} not supported by this backend")]
    Unsupported(&'static str),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
