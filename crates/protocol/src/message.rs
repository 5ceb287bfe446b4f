//! In-log message type and the delivery handler seam

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::HandlerError;

/// A message stored in the broker's log.
///
/// `id` and `offset` are assigned once at append time and never change.
/// The payload is carried verbatim; [`Bytes`] makes the stored copy
/// immutable, so handing out clones cannot let a caller mutate the log.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Unique message identifier
    pub id: Uuid,

    /// Position in the log, equal to the log length at insertion
    pub offset: u64,

    /// Opaque payload bytes (for this pipeline, a JSON batch envelope)
    pub payload: Bytes,

    /// Broker ingest time
    pub timestamp: DateTime<Utc>,

    /// Optional metadata attached at publish time
    pub metadata: HashMap<String, String>,
}

impl Message {
    /// Create a message pending offset assignment by the log
    pub fn new(payload: Bytes) -> Self {
        Self {
            id: Uuid::new_v4(),
            offset: 0,
            payload,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

/// Receives messages delivered to one subscriber.
///
/// The broker invokes the handler once per message, in offset order.
/// Delivery progresses regardless of the outcome: a failed handler is
/// logged and the cursor still advances (downstream retry belongs to the
/// sink integration, not the delivery loop).
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Arc<Message>) -> Result<(), HandlerError>;
}

/// Blanket impl so plain async closures wrapped in functions can subscribe
/// without a named type.
#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, message: Arc<Message>) -> Result<(), HandlerError> {
        self(message).await
    }
}
