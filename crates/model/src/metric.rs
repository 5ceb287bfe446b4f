//! Single-observation metric type and DCGM metric names

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ModelError;

/// One DCGM telemetry data point collected from a GPU.
///
/// This is the primary record flowing through the pipeline. `metric_name`
/// and `uuid` are required on ingest; every other field may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuMetric {
    /// Pipeline processing time, not the source's own timestamp
    pub timestamp: DateTime<Utc>,

    /// DCGM metric identifier (e.g. `DCGM_FI_DEV_GPU_UTIL`)
    pub metric_name: String,

    /// Local GPU index on the host (0-7 on DGX systems)
    #[serde(default)]
    pub gpu_id: u32,

    /// Device name (e.g. `nvidia0`)
    #[serde(default)]
    pub device: String,

    /// Cluster-unique hardware identifier
    pub uuid: String,

    /// GPU model (e.g. `NVIDIA H100 80GB HBM3`)
    #[serde(default)]
    pub model_name: String,

    /// Host the GPU lives on
    #[serde(default)]
    pub hostname: String,

    /// Kubernetes container name, when scheduled
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container: String,

    /// Kubernetes pod name, when scheduled
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pod: String,

    /// Kubernetes namespace, when scheduled
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Metric value (utilization %, clock MHz, watts, ...)
    #[serde(default)]
    pub value: f64,

    /// Additional key/value labels carried from the source
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl GpuMetric {
    /// Create a metric with the required identity fields set
    pub fn new(metric_name: impl Into<String>, uuid: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            metric_name: metric_name.into(),
            gpu_id: 0,
            device: String::new(),
            uuid: uuid.into(),
            model_name: String::new(),
            hostname: String::new(),
            container: String::new(),
            pod: String::new(),
            namespace: String::new(),
            value,
            labels: HashMap::new(),
        }
    }

    /// Check the ingest invariant: `metric_name` and `uuid` are non-empty
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.metric_name.is_empty() {
            return Err(ModelError::MissingField("metric_name"));
        }
        if self.uuid.is_empty() {
            return Err(ModelError::MissingField("uuid"));
        }
        Ok(())
    }
}

/// Summary information about a GPU, derived from observed metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuInfo {
    pub uuid: String,
    pub gpu_id: u32,
    pub device: String,
    pub model_name: String,
    pub hostname: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl GpuInfo {
    /// Build the initial info entry from the first metric seen for a GPU
    pub fn from_metric(metric: &GpuMetric) -> Self {
        Self {
            uuid: metric.uuid.clone(),
            gpu_id: metric.gpu_id,
            device: metric.device.clone(),
            model_name: metric.model_name.clone(),
            hostname: metric.hostname.clone(),
            first_seen: metric.timestamp,
            last_seen: metric.timestamp,
        }
    }

    /// Widen the first/last seen window with another observation
    pub fn observe(&mut self, timestamp: DateTime<Utc>) {
        if timestamp < self.first_seen {
            self.first_seen = timestamp;
        }
        if timestamp > self.last_seen {
            self.last_seen = timestamp;
        }
    }
}

/// Common DCGM metric names
pub const METRIC_GPU_UTIL: &str = "DCGM_FI_DEV_GPU_UTIL";
pub const METRIC_MEM_COPY_UTIL: &str = "DCGM_FI_DEV_MEM_COPY_UTIL";
pub const METRIC_SM_CLOCK: &str = "DCGM_FI_DEV_SM_CLOCK";
pub const METRIC_MEM_CLOCK: &str = "DCGM_FI_DEV_MEM_CLOCK";
pub const METRIC_POWER_USAGE: &str = "DCGM_FI_DEV_POWER_USAGE";
pub const METRIC_GPU_TEMP: &str = "DCGM_FI_DEV_GPU_TEMP";
pub const METRIC_MEM_USED: &str = "DCGM_FI_DEV_FB_USED";
pub const METRIC_MEM_FREE: &str = "DCGM_FI_DEV_FB_FREE";

/// Unit of measure for a known DCGM metric name, empty when unknown
pub fn metric_unit(metric_name: &str) -> &'static str {
    match metric_name {
        METRIC_GPU_UTIL | METRIC_MEM_COPY_UTIL => "%",
        METRIC_SM_CLOCK | METRIC_MEM_CLOCK => "MHz",
        METRIC_POWER_USAGE => "W",
        METRIC_GPU_TEMP => "°C",
        METRIC_MEM_USED | METRIC_MEM_FREE => "MiB",
        _ => "",
    }
}

#[cfg(test)]
#[path = "metric_test.rs"]
mod tests;
