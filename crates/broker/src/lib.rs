//! In-memory log broker with offset-addressable fan-out delivery
//!
//! The broker keeps an append-only [`MessageLog`] of opaque payloads and a
//! registry of subscribers, each with its own cursor into the log. Every
//! subscriber sees every message, in offset order, at its own pace; there
//! is no partitioning and no load balancing.
//!
//! # Pieces
//!
//! - [`MessageLog`] - append-only, monotonically-numbered message store
//! - [`SubscriberRegistry`] - per-subscriber cursor plus a single-slot
//!   wake-up signal
//! - [`Broker`] - ties log and registry together and runs one delivery
//!   task per subscriber
//! - [`BrokerServer`] - the framed TCP protocol on top of the broker
//! - [`http`] - health and stats endpoints
//!
//! The log is purely in-memory: nothing survives a broker restart, and
//! retention is the downstream store's responsibility.

mod broker;
mod error;
mod http;
mod log;
mod registry;
mod server;
mod stats;

pub use broker::Broker;
pub use error::{BrokerError, Result, ServerError};
pub use http::{http_router, serve_http};
pub use log::MessageLog;
pub use registry::SubscriberRegistry;
pub use server::{BrokerServer, BrokerServerConfig};
pub use stats::{QueueStats, SubscriberInfo};
