//! Length-prefixed frame transport
//!
//! `[4-byte big-endian length][N bytes of UTF-8 JSON]`. Reads distinguish
//! a clean close, a recoverable bad frame, and an oversize prefix that
//! desynchronizes the stream. Deadlines are the caller's job: wrap calls in
//! `tokio::time::timeout` with [`READ_DEADLINE`] / [`WRITE_DEADLINE`].

use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, Result};
use crate::frame::Frame;

/// Maximum frame body size (10 MiB)
pub const MAX_FRAME_SIZE: u32 = 10 * 1024 * 1024;

/// Idle deadline for reading one frame
pub const READ_DEADLINE: Duration = Duration::from_secs(60);

/// Deadline for writing one frame
pub const WRITE_DEADLINE: Duration = Duration::from_secs(10);

/// Read one frame from the stream.
///
/// Returns [`ProtocolError::ConnectionClosed`] on EOF at a frame boundary,
/// [`ProtocolError::FrameTooLarge`] when the prefix exceeds
/// [`MAX_FRAME_SIZE`] (the connection must be dropped), and
/// [`ProtocolError::InvalidFrame`] when the body is not a protocol JSON
/// object (the stream is still aligned and may keep reading).
pub async fn read_frame<R>(stream: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    if let Err(e) = stream.read_exact(&mut header).await {
        return Err(match e.kind() {
            ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed,
            _ => ProtocolError::Io(e),
        });
    }

    let length = u32::from_be_bytes(header);
    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            limit: MAX_FRAME_SIZE,
        });
    }

    let mut body = vec![0u8; length as usize];
    if let Err(e) = stream.read_exact(&mut body).await {
        return Err(match e.kind() {
            ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed,
            _ => ProtocolError::Io(e),
        });
    }

    Ok(serde_json::from_slice(&body)?)
}

/// Write one length-prefixed frame and flush it
pub async fn write_frame<W>(stream: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(frame)?;
    if body.len() > MAX_FRAME_SIZE as usize {
        return Err(ProtocolError::FrameTooLarge {
            size: body.len() as u32,
            limit: MAX_FRAME_SIZE,
        });
    }

    stream.write_all(&(body.len() as u32).to_be_bytes()).await?;
    stream.write_all(&body).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "framing_test.rs"]
mod tests;
