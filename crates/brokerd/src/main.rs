//! Broker daemon
//!
//! Runs the in-memory log broker: the framed TCP protocol on one socket
//! (default :9000) and the health/stats HTTP endpoints on another
//! (default :9001). Configuration comes from the environment; see
//! `gpufleet-config`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gpufleet_broker::{serve_http, Broker, BrokerServer, BrokerServerConfig};
use gpufleet_config::BrokerConfig;

/// How long shutdown waits for in-flight work before abandoning it
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

/// gpufleet broker daemon
#[derive(Parser, Debug)]
#[command(name = "brokerd")]
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

    let config = BrokerConfig::from_env().context("loading broker configuration")?;

    info!(
        tcp_host = %config.tcp_host,
        tcp_port = config.tcp_port,
        http = %config.http_address(),
        log_capacity = config.log_capacity,
        "starting broker"
    );

    let broker = Arc::new(Broker::with_log_capacity(config.log_capacity));
    let cancel = CancellationToken::new();

    let server = BrokerServer::new(
        Arc::clone(&broker),
        BrokerServerConfig {
            address: config.tcp_host.clone(),
            port: config.tcp_port,
        },
    );
    let mut tcp_task = tokio::spawn(server.run(cancel.clone()));

    let http_address = config.http_address();
    let http_broker = Arc::clone(&broker);
    let http_cancel = cancel.clone();
    let mut http_task =
        tokio::spawn(async move { serve_http(&http_address, http_broker, http_cancel).await });

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
        result = &mut tcp_task => {
            result.context("broker server task panicked")??;
            anyhow::bail!("broker server exited unexpectedly");
        }
        result = &mut http_task => {
            result.context("http server task panicked")??;
            anyhow::bail!("http server exited unexpectedly");
        }
    }

    cancel.cancel();
    broker.shutdown(SHUTDOWN_DEADLINE).await;

    // Give the listeners a moment to wind down; they are already cancelled.
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = tcp_task.await;
        let _ = http_task.await;
    })
    .await;

    info!("broker stopped");
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
