//! Telemetry collector
//!
//! Subscribes to the broker, decodes each delivered batch envelope, and
//! writes the records to InfluxDB in order. Two housekeeping tasks run
//! alongside the subscription: a retention sweep and a periodic stats
//! log. By default the subscription starts at `latest` (new messages
//! only); set `COLLECTOR_START_OFFSET=earliest` or a specific offset to
//! replay history.

mod consumer;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gpufleet_client::{BrokerClient, ClientConfig};
use gpufleet_config::{env_str, CollectorConfig, InfluxConfig};
use gpufleet_storage::{InfluxStorage, Storage};

use crate::consumer::{parse_start_offset, BatchWriter, Consumer};

/// gpufleet telemetry collector
#[derive(Parser, Debug)]
#[command(name = "collector")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = CollectorConfig::from_env().context("loading collector configuration")?;
    let start_offset = parse_start_offset(&env_str("COLLECTOR_START_OFFSET", "latest"))
        .context("parsing COLLECTOR_START_OFFSET")?;

    info!(
        instance_id = %config.instance_id,
        broker = %format!("{}:{}", config.mq.host, config.mq.port),
        retention = ?config.retention_period,
        start_offset = %start_offset,
        "starting collector"
    );

    let influx = InfluxConfig::from_env();
    info!(url = %influx.url, org = %influx.org, bucket = %influx.bucket, "connecting to InfluxDB");
    let storage: Arc<dyn Storage> = Arc::new(
        InfluxStorage::connect(gpufleet_storage::InfluxConfig {
            url: influx.url,
            token: influx.token,
            org: influx.org,
            bucket: influx.bucket,
        })
        .await
        .context("connecting to InfluxDB")?,
    );

    let client = BrokerClient::new(ClientConfig {
        host: config.mq.host.clone(),
        port: config.mq.port,
        timeout: config.mq.timeout,
        auto_reconnect: config.mq.auto_reconnect,
        reconnect_delay: config.mq.reconnect_delay,
    });
    client.connect().await.context("connecting to broker")?;
    info!("connected to broker");

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_cancel.cancel();
    });

    let writer = Arc::new(BatchWriter::new(Arc::clone(&storage)));
    let consumer = Consumer::new(client.clone(), storage, config, Arc::clone(&writer));
    consumer.run(start_offset, cancel).await?;

    client.close().await;
    let (batches, metrics) = writer.totals();
    info!(batches, metrics, "collector stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
