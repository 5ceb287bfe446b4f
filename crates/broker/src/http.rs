//! Health and stats HTTP endpoints
//!
//! `GET /health` always reports healthy while the process is serving; the
//! stats endpoint is the real observability surface.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::broker::Broker;
use crate::error::ServerError;
use crate::stats::QueueStats;

/// Build the health/stats router
pub fn http_router(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .with_state(broker)
}

/// Bind and serve the HTTP endpoints until `cancel` fires
pub async fn serve_http(
    address: &str,
    broker: Arc<Broker>,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|e| ServerError::Bind {
            address: address.to_owned(),
            source: e,
        })?;

    info!(address, "http endpoints listening");

    axum::serve(listener, http_router(broker))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(ServerError::Io)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn stats(State(broker): State<Arc<Broker>>) -> Json<QueueStats> {
    Json(broker.stats())
}
