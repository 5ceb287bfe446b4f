//! Core data model for GPU fleet telemetry
//!
//! Defines the types that travel through the pipeline:
//!
//! - [`GpuMetric`] - a single DCGM-style observation from one GPU
//! - [`MetricBatch`] - the envelope a streamer publishes to the broker
//! - [`TelemetryQuery`] - the query shape the read path consumes
//!
//! All types serialize to JSON with lowercase snake-case field names; the
//! batch envelope is the payload of a `publish` frame and must round-trip
//! byte-compatibly between streamer and collector.

mod batch;
mod metric;
mod query;

pub use batch::MetricBatch;
pub use metric::{
    metric_unit, GpuInfo, GpuMetric, METRIC_GPU_TEMP, METRIC_GPU_UTIL, METRIC_MEM_CLOCK,
    METRIC_MEM_COPY_UTIL, METRIC_MEM_FREE, METRIC_MEM_USED, METRIC_POWER_USAGE, METRIC_SM_CLOCK,
};
pub use query::TelemetryQuery;

use thiserror::Error;

/// Validation errors for ingested records
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// A required field was empty
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
