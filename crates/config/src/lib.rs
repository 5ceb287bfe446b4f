//! Environment-driven configuration
//!
//! Every component reads its settings from process environment variables
//! with sensible defaults, so a bare `brokerd` / `streamer` / `collector`
//! starts against localhost. Binaries map these structs onto the component
//! crates' own config types.
//!
//! Durations accept humantime syntax: `100ms`, `1s`, `24h`.

mod env;

pub use env::{env_bool, env_duration, env_str, env_u16, env_usize};

use std::time::Duration;

use thiserror::Error;

/// Errors from configuration parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held an unparseable value
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

/// Result type for configuration loading
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Connection settings shared by every broker client
#[derive(Debug, Clone, PartialEq)]
pub struct MqConfig {
    /// Broker host to connect to
    pub host: String,

    /// Broker port to connect to
    pub port: u16,

    /// Connect / write timeout
    pub timeout: Duration,

    /// Redial automatically after a broken connection
    pub auto_reconnect: bool,

    /// Wait between redial attempts
    pub reconnect_delay: Duration,
}

impl MqConfig {
    /// Load from `MQ_HOST`, `MQ_PORT`, `MQ_TIMEOUT`, `MQ_AUTO_RECONNECT`,
    /// `MQ_RECONNECT_DELAY`
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env_str("MQ_HOST", "localhost"),
            port: env_u16("MQ_PORT", 9000)?,
            timeout: env_duration("MQ_TIMEOUT", Duration::from_secs(10))?,
            auto_reconnect: env_bool("MQ_AUTO_RECONNECT", true)?,
            reconnect_delay: env_duration("MQ_RECONNECT_DELAY", Duration::from_secs(5))?,
        })
    }
}

/// Broker daemon settings
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    /// TCP bind host for the frame protocol
    pub tcp_host: String,

    /// TCP bind port for the frame protocol
    pub tcp_port: u16,

    /// HTTP bind host for health/stats
    pub http_host: String,

    /// HTTP bind port for health/stats
    pub http_port: u16,

    /// Initial log capacity hint (the log still grows)
    pub log_capacity: usize,
}

impl BrokerConfig {
    /// Load from `TCP_HOST`, `TCP_PORT`, `HTTP_HOST`, `HTTP_PORT`,
    /// `MQ_BUFFER_SIZE`
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            tcp_host: env_str("TCP_HOST", "0.0.0.0"),
            tcp_port: env_u16("TCP_PORT", 9000)?,
            http_host: env_str("HTTP_HOST", "0.0.0.0"),
            http_port: env_u16("HTTP_PORT", 9001)?,
            log_capacity: env_usize("MQ_BUFFER_SIZE", 10_000)?,
        })
    }

    /// HTTP bind address
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

/// Streamer (producer) settings
#[derive(Debug, Clone, PartialEq)]
pub struct StreamerConfig {
    /// Unique id for this streamer instance; stamped into every batch
    pub instance_id: String,

    /// Path to the telemetry CSV file
    pub csv_path: String,

    /// How often to pull one record from the source into the buffer
    pub collect_interval: Duration,

    /// How often to flush the buffer as one published batch
    pub publish_interval: Duration,

    /// Restart the source from the top when it runs out
    pub looped: bool,

    /// Broker connection
    pub mq: MqConfig,
}

impl StreamerConfig {
    /// Load from `STREAMER_ID`, `CSV_PATH`, `COLLECT_INTERVAL`,
    /// `STREAM_INTERVAL`, `LOOP`, plus the `MQ_*` family
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            instance_id: env_str("STREAMER_ID", "streamer-1"),
            csv_path: env_str("CSV_PATH", "/data/telemetry.csv"),
            collect_interval: env_duration("COLLECT_INTERVAL", Duration::from_millis(100))?,
            publish_interval: env_duration("STREAM_INTERVAL", Duration::from_secs(1))?,
            looped: env_bool("LOOP", true)?,
            mq: MqConfig::from_env()?,
        })
    }
}

/// Collector (consumer) settings
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    /// Unique id for this collector; doubles as the subscriber id
    pub instance_id: String,

    /// Broker connection
    pub mq: MqConfig,

    /// How long stored telemetry is kept before the retention sweep
    pub retention_period: Duration,

    /// How often the retention sweep runs
    pub cleanup_interval: Duration,

    /// How often counters are logged
    pub stats_interval: Duration,
}

impl CollectorConfig {
    /// Load from `COLLECTOR_ID`, `RETENTION_PERIOD`, `CLEANUP_INTERVAL`,
    /// `STATS_INTERVAL`, plus the `MQ_*` family
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            instance_id: env_str("COLLECTOR_ID", "collector-1"),
            mq: MqConfig::from_env()?,
            retention_period: env_duration("RETENTION_PERIOD", Duration::from_secs(24 * 3600))?,
            cleanup_interval: env_duration("CLEANUP_INTERVAL", Duration::from_secs(3600))?,
            stats_interval: env_duration("STATS_INTERVAL", Duration::from_secs(30))?,
        })
    }
}

/// InfluxDB sink settings
#[derive(Debug, Clone, PartialEq)]
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

impl InfluxConfig {
    /// Load from `INFLUXDB_URL`, `INFLUXDB_TOKEN`, `INFLUXDB_ORG`,
    /// `INFLUXDB_BUCKET`
    pub fn from_env() -> Self {
        Self {
            url: env_str("INFLUXDB_URL", "http://localhost:8086"),
            token: env_str("INFLUXDB_TOKEN", ""),
            org: env_str("INFLUXDB_ORG", "gpufleet"),
            bucket: env_str("INFLUXDB_BUCKET", "gpu_telemetry"),
        }
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
