//! Error types for the broker client

use std::io;

use thiserror::Error;

use gpufleet_protocol::ProtocolError;

/// Errors from broker client operations
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to reach the broker
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Operation attempted without an established connection
    #[error("not connected")]
    NotConnected,

    /// Write did not finish within the configured timeout
    #[error("write timed out")]
    WriteTimeout,

    /// Framing or encoding error
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error on the connection
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
