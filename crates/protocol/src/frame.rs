//! JSON frame envelope exchanged between clients and the broker

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use uuid::Uuid;

use crate::error::{ProtocolError, Result};
use crate::message::Message;
use crate::offset::Offset;

/// Frame discriminator.
///
/// `publish` through `get_stats` flow client → broker; `message`,
/// `response`, and `error` flow broker → client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Publish,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    GetStats,
    Message,
    Response,
    Error,
}

/// One protocol frame.
///
/// Exactly one `type` per frame; the auxiliary fields each frame type uses
/// are listed in the constructor docs. `payload` is an opaque JSON subtree
/// carried verbatim; the broker never re-encodes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<Offset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<RawValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Frame {
    fn bare(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            subscriber_id: None,
            message_id: None,
            offset: None,
            payload: None,
            success: None,
            error: None,
        }
    }

    /// `publish`: client to broker. Fields: `payload`.
    pub fn publish(payload: Bytes) -> Result<Self> {
        Ok(Self {
            payload: Some(raw_from_bytes(payload)?),
            ..Self::bare(FrameType::Publish)
        })
    }

    /// `subscribe`: client to broker. Fields: `subscriber_id`, `offset`.
    pub fn subscribe(subscriber_id: impl Into<String>, offset: Offset) -> Self {
        Self {
            subscriber_id: Some(subscriber_id.into()),
            offset: Some(offset),
            ..Self::bare(FrameType::Subscribe)
        }
    }

    /// `unsubscribe`: client to broker. Fields: `subscriber_id`.
    pub fn unsubscribe(subscriber_id: impl Into<String>) -> Self {
        Self {
            subscriber_id: Some(subscriber_id.into()),
            ..Self::bare(FrameType::Unsubscribe)
        }
    }

    /// `ack`: client to broker, advisory. Fields: `message_id`.
    pub fn ack(message_id: Uuid) -> Self {
        Self {
            message_id: Some(message_id),
            ..Self::bare(FrameType::Ack)
        }
    }

    /// `nack`: client to broker, advisory. Fields: `message_id`.
    pub fn nack(message_id: Uuid) -> Self {
        Self {
            message_id: Some(message_id),
            ..Self::bare(FrameType::Nack)
        }
    }

    /// `get_stats`: client to broker. No auxiliary fields.
    pub fn get_stats() -> Self {
        Self::bare(FrameType::GetStats)
    }

    /// `message`: broker to client delivery. Fields: `message_id`,
    /// `offset`, `payload`.
    pub fn message(message: &Message) -> Result<Self> {
        Ok(Self {
            message_id: Some(message.id),
            offset: Some(Offset::specific(message.offset)),
            payload: Some(raw_from_bytes(message.payload.clone())?),
            ..Self::bare(FrameType::Message)
        })
    }

    /// `response`: broker to client. Fields: `success`, optional `error`.
    pub fn response(success: bool, error: Option<String>) -> Self {
        Self {
            success: Some(success),
            error,
            ..Self::bare(FrameType::Response)
        }
    }

    /// `response` carrying a JSON payload (stats replies)
    pub fn response_with_payload(payload: Bytes) -> Result<Self> {
        Ok(Self {
            success: Some(true),
            payload: Some(raw_from_bytes(payload)?),
            ..Self::bare(FrameType::Response)
        })
    }

    /// `error`: broker to client. Fields: `error`.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::bare(FrameType::Error)
        }
    }

    /// The payload as raw bytes, or [`ProtocolError::MissingPayload`]
    pub fn payload_bytes(&self) -> Result<Bytes> {
        let raw = self.payload.as_ref().ok_or(ProtocolError::MissingPayload)?;
        Ok(Bytes::copy_from_slice(raw.get().as_bytes()))
    }
}

/// Wrap payload bytes as a raw JSON subtree without re-encoding them
fn raw_from_bytes(payload: Bytes) -> Result<Box<RawValue>> {
    let text = String::from_utf8(payload.to_vec())
        .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
    RawValue::from_string(text).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
