//! Framed TCP server for the broker
//!
//! Accepts client connections and speaks the length-prefixed JSON frame
//! protocol: `publish`, `subscribe`, `unsubscribe`, `ack`/`nack`, and
//! `get_stats` in; `message`, `response`, and `error` out.
//!
//! Each connection gets its own read task. A `subscribe` frame registers a
//! handler that serializes delivered messages onto this connection; frame
//! writes from the delivery task and from request handling serialize
//! through one write-half guard. Disconnecting unsubscribes automatically.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gpufleet_protocol::{
    read_frame, write_frame, Frame, FrameType, HandlerError, Message, MessageHandler, Offset,
    ProtocolError, READ_DEADLINE, WRITE_DEADLINE,
};

use crate::broker::Broker;
use crate::error::ServerError;

/// TCP server configuration
#[derive(Debug, Clone)]
pub struct BrokerServerConfig {
    /// Bind address (e.g. "0.0.0.0")
    pub address: String,

    /// Listen port
    pub port: u16,
}

impl Default for BrokerServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".into(),
            port: 9000,
        }
    }
}

impl BrokerServerConfig {
    /// The socket address to bind to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// The broker's TCP frontend
pub struct BrokerServer {
    broker: Arc<Broker>,
    config: BrokerServerConfig,
}

impl BrokerServer {
    /// Create a server over an existing broker
    pub fn new(broker: Arc<Broker>, config: BrokerServerConfig) -> Self {
        Self { broker, config }
    }

    /// Bind and serve until `cancel` fires.
    ///
    /// Each accepted connection runs in its own task; the accept loop stops
    /// on cancellation and in-flight connections wind down through the same
    /// token.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServerError> {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ServerError::Bind {
                address: bind_addr.clone(),
                source: e,
            })?;

        info!(address = %bind_addr, "broker listening");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        let broker = Arc::clone(&self.broker);
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(broker, stream, peer, cancel).await {
                                debug!(peer = %peer, error = %e, "connection ended");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept error");
                    }
                },
            }
        }

        info!(address = %bind_addr, "broker stopped accepting");
        Ok(())
    }
}

/// Serializes frame writes onto one connection.
///
/// Both the request/response path and the delivery handler write here; the
/// async mutex is the per-connection write lock, and every write carries
/// the protocol write deadline.
struct ConnectionWriter {
    inner: tokio::sync::Mutex<OwnedWriteHalf>,
}

impl ConnectionWriter {
    fn new(write_half: OwnedWriteHalf) -> Self {
        Self {
            inner: tokio::sync::Mutex::new(write_half),
        }
    }

    async fn send(&self, frame: &Frame) -> Result<(), ProtocolError> {
        let mut guard = self.inner.lock().await;
        match timeout(WRITE_DEADLINE, write_frame(&mut *guard, frame)).await {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::DeadlineExceeded { op: "write" }),
        }
    }
}

/// Delivery handler that forwards log messages as `message` frames
struct ConnectionHandler {
    writer: Arc<ConnectionWriter>,
}

#[async_trait]
impl MessageHandler for ConnectionHandler {
    async fn handle(&self, message: Arc<Message>) -> Result<(), HandlerError> {
        let frame = Frame::message(&message).map_err(|e| HandlerError::new(e.to_string()))?;
        self.writer
            .send(&frame)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))
    }
}

/// Read loop for one client connection
async fn handle_connection(
    broker: Arc<Broker>,
    stream: TcpStream,
    peer: SocketAddr,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    debug!(peer = %peer, "client connected");

    let (mut reader, write_half) = stream.into_split();
    let writer = Arc::new(ConnectionWriter::new(write_half));

    // Set once this connection subscribes, so disconnect can clean up.
    let mut subscriber_id: Option<String> = None;

    let result = loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            read = timeout(READ_DEADLINE, read_frame(&mut reader)) => match read {
                Err(_) => {
                    debug!(peer = %peer, "idle deadline expired");
                    break Ok(());
                }
                Ok(Err(ProtocolError::ConnectionClosed)) => break Ok(()),
                Ok(Err(e)) if e.is_recoverable() => {
                    // One bad frame; the stream is still aligned.
                    debug!(peer = %peer, error = %e, "dropping invalid frame");
                    continue;
                }
                Ok(Err(e)) => {
                    // Oversize prefix or I/O failure: the stream cannot be
                    // trusted past this point.
                    warn!(peer = %peer, error = %e, "closing connection");
                    break Err(e.into());
                }
                Ok(Ok(frame)) => frame,
            },
        };

        if let Err(e) = handle_frame(&broker, &writer, peer, &mut subscriber_id, frame).await {
            break Err(e);
        }
    };

    if let Some(id) = subscriber_id {
        let _ = broker.unsubscribe(&id);
        debug!(peer = %peer, subscriber_id = %id, "unsubscribed on disconnect");
    }

    debug!(peer = %peer, "client disconnected");
    result
}

/// Dispatch one client frame
async fn handle_frame(
    broker: &Arc<Broker>,
    writer: &Arc<ConnectionWriter>,
    peer: SocketAddr,
    subscriber_id: &mut Option<String>,
    frame: Frame,
) -> Result<(), ServerError> {
    match frame.frame_type {
        FrameType::Publish => {
            let reply = match frame.payload_bytes() {
                Ok(payload) => match broker.publish(payload) {
                    Ok((message_id, offset)) => {
                        debug!(peer = %peer, %message_id, offset, "published");
                        Frame::response(true, None)
                    }
                    Err(e) => Frame::response(false, Some(e.to_string())),
                },
                Err(e) => Frame::error(e.to_string()),
            };
            writer.send(&reply).await?;
        }

        FrameType::Subscribe => {
            let id = frame
                .subscriber_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| peer.to_string());

            // A zero (or absent) offset means the client wants new messages
            // only; anything else is used verbatim.
            let start = match frame.offset {
                None | Some(Offset(0)) => Offset::LATEST,
                Some(offset) => offset,
            };

            let handler = Arc::new(ConnectionHandler {
                writer: Arc::clone(writer),
            });

            let reply = match broker.subscribe(&id, start, handler) {
                Ok(()) => {
                    info!(peer = %peer, subscriber_id = %id, %start, "client subscribed");
                    *subscriber_id = Some(id);
                    Frame::response(true, None)
                }
                Err(e) => Frame::response(false, Some(e.to_string())),
            };
            writer.send(&reply).await?;
        }

        FrameType::Unsubscribe => {
            let id = subscriber_id
                .take()
                .or_else(|| frame.subscriber_id.clone());

            let reply = match id {
                Some(id) => match broker.unsubscribe(&id) {
                    Ok(()) => {
                        info!(peer = %peer, subscriber_id = %id, "client unsubscribed");
                        Frame::response(true, None)
                    }
                    Err(e) => Frame::response(false, Some(e.to_string())),
                },
                None => Frame::error("no subscriber id"),
            };
            writer.send(&reply).await?;
        }

        // Acks do not gate cursor advancement; they are accepted as an
        // extension point.
        FrameType::Ack | FrameType::Nack => {
            writer.send(&Frame::response(true, None)).await?;
        }

        FrameType::GetStats => {
            let reply = match serde_json::to_vec(&broker.stats()) {
                Ok(stats) => Frame::response_with_payload(stats.into())
                    .unwrap_or_else(|e| Frame::error(e.to_string())),
                Err(e) => Frame::error(e.to_string()),
            };
            writer.send(&reply).await?;
        }

        FrameType::Message | FrameType::Response | FrameType::Error => {
            writer.send(&Frame::error("unexpected frame type")).await?;
        }
    }

    Ok(())
}
