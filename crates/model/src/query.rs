//! Query parameters for fetching stored telemetry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filter set the read path accepts when fetching telemetry.
///
/// All filters are optional; `None` means "match all". Time bounds are
/// inclusive on both ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryQuery {
    /// Filter by GPU UUID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Filter by hostname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Filter by local GPU index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_id: Option<u32>,

    /// Filter by metric name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_name: Option<String>,

    /// Inclusive start of the time window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// Inclusive end of the time window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Maximum number of results to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Pagination offset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl TelemetryQuery {
    /// Query for a single GPU by UUID
    pub fn for_uuid(uuid: impl Into<String>) -> Self {
        Self {
            uuid: Some(uuid.into()),
            ..Self::default()
        }
    }
}
