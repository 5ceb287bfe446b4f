//! Error types for the broker crate

use std::io;

use thiserror::Error;

use gpufleet_protocol::ProtocolError;

/// Errors from log and registry operations.
///
/// Display strings are part of the wire contract: they travel to clients
/// inside `response`/`error` frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// Append attempted after shutdown
    #[error("queue is shutting down")]
    Shutdown,

    /// Subscribe with an id that is already registered
    #[error("subscriber already exists")]
    SubscriberExists,

    /// Operation on an unknown subscriber id
    #[error("subscriber not found")]
    SubscriberNotFound,
}

/// Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors from the TCP/HTTP serving layer
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind a listen socket
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// I/O error on an accepted connection
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Framing or decoding error
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
