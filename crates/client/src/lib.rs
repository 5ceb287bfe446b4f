//! TCP client for the gpufleet broker
//!
//! [`BrokerClient`] speaks the length-prefixed JSON frame protocol:
//! streamers call [`BrokerClient::publish`], collectors call
//! [`BrokerClient::subscribe`] with a [`MessageHandler`] and receive every
//! delivered message in offset order.
//!
//! # Reconnection
//!
//! With auto-reconnect enabled, a broken connection is redialed after a
//! fixed delay. An active subscription is re-sent with the *original*
//! start offset of the session - the broker does not persist cursors
//! across connections, so a reconnect may replay messages that were
//! already delivered before the drop. Consumers must tolerate duplicates
//! across sessions.

mod client;
mod error;

pub use client::{BrokerClient, ClientConfig};
pub use error::{ClientError, Result};

pub use gpufleet_protocol::{Message, MessageHandler, Offset};
