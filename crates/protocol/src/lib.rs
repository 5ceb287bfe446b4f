//! Wire protocol for broker communication
//!
//! Everything a broker client and the broker share: the offset sentinels,
//! the in-log [`Message`] type, the JSON [`Frame`] envelope, and the
//! length-prefixed framing that carries frames over TCP.
//!
//! # Wire Format
//!
//! Each frame is length-prefixed:
//!
//! ```text
//! ┌──────────────┬─────────────────────────────────────┐
//! │ 4 bytes      │ N bytes                             │
//! │ length (BE)  │ UTF-8 JSON object                   │
//! └──────────────┴─────────────────────────────────────┘
//! ```
//!
//! N is capped at 10 MiB; an oversize length prefix desynchronizes the
//! stream and forces the connection closed.

mod error;
mod frame;
mod framing;
mod message;
mod offset;

pub use error::{HandlerError, ProtocolError, Result};
pub use frame::{Frame, FrameType};
pub use framing::{read_frame, write_frame, MAX_FRAME_SIZE, READ_DEADLINE, WRITE_DEADLINE};
pub use message::{Message, MessageHandler};
pub use offset::Offset;
