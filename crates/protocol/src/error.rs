//! Error types for the protocol crate

use std::io;

use thiserror::Error;

/// Errors that can occur reading or writing frames
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// I/O error on the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Frame length prefix exceeds the protocol maximum.
    ///
    /// The stream is desynchronized past this point; the connection must
    /// be closed.
    #[error("frame size {size} exceeds limit {limit}")]
    FrameTooLarge { size: u32, limit: u32 },

    /// Frame body was not a valid protocol JSON object.
    ///
    /// The framing itself is intact, so the connection may keep reading.
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] serde_json::Error),

    /// Deadline expired while reading or writing a frame
    #[error("{op} deadline exceeded")]
    DeadlineExceeded { op: &'static str },

    /// Peer closed the connection
    #[error("connection closed")]
    ConnectionClosed,

    /// Frame payload was expected but absent
    #[error("frame has no payload")]
    MissingPayload,

    /// Payload bytes are not a UTF-8 JSON subtree
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl ProtocolError {
    /// Whether the connection can keep reading frames after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProtocolError::InvalidFrame(_))
    }
}

/// Error returned by a message handler.
///
/// Handler failures never stop delivery; the broker logs them and moves the
/// cursor forward, so this only needs to describe what went wrong.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
