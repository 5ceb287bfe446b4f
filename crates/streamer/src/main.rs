//! Telemetry streamer
//!
//! Reads GPU telemetry from a CSV file, buffers it locally, and publishes
//! batches to the broker at a configurable cadence. Two cooperating tasks
//! do the work: a collector pulls one record per tick into a shared
//! buffer, and a publisher periodically swaps the buffer out and ships it
//! as a single batch. Shutdown flushes whatever is still buffered.

mod pipeline;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gpufleet_client::{BrokerClient, ClientConfig};
use gpufleet_config::StreamerConfig;
use gpufleet_parser::{count_records, validate_file};

use crate::pipeline::Streamer;

/// gpufleet telemetry streamer
#[derive(Parser, Debug)]
#[command(name = "streamer")]
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

    let config = StreamerConfig::from_env().context("loading streamer configuration")?;

    info!(
        instance_id = %config.instance_id,
        csv_path = %config.csv_path,
        collect_interval = ?config.collect_interval,
        publish_interval = ?config.publish_interval,
        looped = config.looped,
        broker = %format!("{}:{}", config.mq.host, config.mq.port),
        "starting streamer"
    );

    validate_file(&config.csv_path).context("invalid CSV file")?;
    match count_records(&config.csv_path) {
        Ok(count) => info!(records = count, "source file validated"),
        Err(e) => warn!(error = %e, "could not count records"),
    }

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

    let streamer = Streamer::new(client.clone(), config);
    streamer.run(cancel).await?;

    let (batches, metrics) = streamer.totals();
    client.close().await;
    info!(batches, metrics, "streamer stopped");
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
