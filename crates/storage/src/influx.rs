//! InfluxDB v2 storage backend

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use gpufleet_model::{GpuInfo, GpuMetric, TelemetryQuery};

use crate::line::encode_metric;
use crate::{Storage, StorageError, StorageStats};

/// InfluxDB connection settings
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    /// Base URL, e.g. `http://localhost:8086`
    pub url: String,

    /// API token
    pub token: String,

    /// Organization name
    pub org: String,

    /// Bucket name
    pub bucket: String,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".into(),
            token: String::new(),
            org: "gpufleet".into(),
            bucket: "gpu_telemetry".into(),
        }
    }
}

/// Write-oriented InfluxDB v2 backend.
///
/// Writes go through `/api/v2/write` as line protocol; the retention sweep
/// goes through `/api/v2/delete`. Reads are served by the query gateway,
/// not this backend. A local cache tracks per-GPU first/last-seen times to
/// answer `gpus()` without a round trip.
pub struct InfluxStorage {
    http: reqwest::Client,
    config: InfluxConfig,
    gpu_cache: RwLock<HashMap<String, GpuInfo>>,
    total_writes: AtomicU64,
    seen_window: RwLock<Option<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl InfluxStorage {
    /// Connect and gate on the server's health endpoint.
    ///
    /// Fails when the server is unreachable or unhealthy so a collector
    /// with a dead sink exits at startup instead of dropping batches.
    pub async fn connect(config: InfluxConfig) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let health_url = format!("{}/health", config.url.trim_end_matches('/'));
        let response = http.get(&health_url).send().await?;
        if !response.status().is_success() {
            return Err(StorageError::Unhealthy {
                status: response.status().to_string(),
            });
        }

        info!(url = %config.url, org = %config.org, bucket = %config.bucket, "connected to InfluxDB");

        Ok(Self {
            http,
            config,
            gpu_cache: RwLock::new(HashMap::new()),
            total_writes: AtomicU64::new(0),
            seen_window: RwLock::new(None),
        })
    }

    fn write_url(&self) -> String {
        format!(
            "{}/api/v2/write?org={}&bucket={}&precision=ns",
            self.config.url.trim_end_matches('/'),
            self.config.org,
            self.config.bucket
        )
    }

    fn delete_url(&self) -> String {
        format!(
            "{}/api/v2/delete?org={}&bucket={}",
            self.config.url.trim_end_matches('/'),
            self.config.org,
            self.config.bucket
        )
    }

    async fn write_lines(&self, body: String) -> crate::Result<()> {
        let response = self
            .http
            .post(self.write_url())
            .header("Authorization", format!("Token {}", self.config.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::WriteRejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Update the GPU cache and counters after a successful write
    fn record_written(&self, metrics: &[GpuMetric]) {
        let mut cache = self.gpu_cache.write();
        let mut window = self.seen_window.write();

        for metric in metrics {
            cache
                .entry(metric.uuid.clone())
                .and_modify(|info| info.observe(metric.timestamp))
                .or_insert_with(|| GpuInfo::from_metric(metric));

            *window = match *window {
                None => Some((metric.timestamp, metric.timestamp)),
                Some((oldest, newest)) => Some((
                    oldest.min(metric.timestamp),
                    newest.max(metric.timestamp),
                )),
            };
        }
        drop(window);
        drop(cache);

        self.total_writes
            .fetch_add(metrics.len() as u64, Ordering::Relaxed);
    }
}

#[async_trait]
impl Storage for InfluxStorage {
    async fn store(&self, metric: &GpuMetric) -> crate::Result<()> {
        self.store_batch(std::slice::from_ref(metric)).await
    }

    async fn store_batch(&self, metrics: &[GpuMetric]) -> crate::Result<()> {
        if metrics.is_empty() {
            return Ok(());
        }

        let mut body = String::with_capacity(metrics.len() * 128);
        for metric in metrics {
            encode_metric(metric, &mut body);
        }

        self.write_lines(body).await?;
        self.record_written(metrics);

        debug!(count = metrics.len(), "wrote metrics to InfluxDB");
        Ok(())
    }

    async fn gpus(&self) -> crate::Result<Vec<String>> {
        Ok(self.gpu_cache.read().keys().cloned().collect())
    }

    async fn gpu_by_uuid(&self, uuid: &str) -> crate::Result<Option<GpuInfo>> {
        Ok(self.gpu_cache.read().get(uuid).cloned())
    }

    async fn query(&self, _query: &TelemetryQuery) -> crate::Result<Vec<GpuMetric>> {
        // Reads go through the query gateway; this backend only writes.
        Err(StorageError::Unsupported("query"))
    }

    async fn cleanup(&self, retention: Duration) -> crate::Result<u64> {
        let stop = Utc::now() - chrono::Duration::from_std(retention).unwrap_or_default();
        let body = serde_json::json!({
            "start": "1970-01-01T00:00:00Z",
            "stop": stop.to_rfc3339_opts(SecondsFormat::Secs, true),
            "predicate": "",
        });

        let response = self
            .http
            .post(self.delete_url())
            .header("Authorization", format!("Token {}", self.config.token))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::DeleteRejected {
                status: status.as_u16(),
                body,
            });
        }

        // The delete API does not report how many points it removed.
        Ok(0)
    }

    fn stats(&self) -> StorageStats {
        let window = *self.seen_window.read();
        StorageStats {
            total_metrics: self.total_writes.load(Ordering::Relaxed),
            total_gpus: self.gpu_cache.read().len(),
            oldest_metric: window.map(|(oldest, _)| oldest),
            newest_metric: window.map(|(_, newest)| newest),
        }
    }
}
