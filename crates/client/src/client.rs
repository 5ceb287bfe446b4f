//! Broker client implementation

use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use gpufleet_protocol::{
    read_frame, write_frame, Frame, FrameType, Message, MessageHandler, Offset,
};

use crate::error::{ClientError, Result};

/// Broker client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker host
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Connect and per-frame write timeout
    pub timeout: Duration,

    /// Redial automatically after a broken connection
    pub auto_reconnect: bool,

    /// Wait between redial attempts
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 9000,
            timeout: Duration::from_secs(10),
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// The broker address to dial
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Subscription state saved for re-subscribe after reconnect
#[derive(Clone)]
struct Subscription {
    subscriber_id: String,
    start_offset: Offset,
    handler: Arc<dyn MessageHandler>,
}

/// TCP client for the broker.
///
/// Cheap to clone; all clones share one connection and one receive loop.
#[derive(Clone)]
pub struct BrokerClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    subscription: Mutex<Option<Subscription>>,
    connected: AtomicBool,
    reconnects: AtomicU64,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl BrokerClient {
    /// Create a client; no connection is made until [`BrokerClient::connect`]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                writer: tokio::sync::Mutex::new(None),
                subscription: Mutex::new(None),
                connected: AtomicBool::new(false),
                reconnects: AtomicU64::new(0),
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Dial the broker and start the receive loop
    pub async fn connect(&self) -> Result<()> {
        if self.inner.connected.load(Ordering::Acquire) {
            return Ok(());
        }

        let reader = self.inner.dial().await?;
        let inner = Arc::clone(&self.inner);
        self.inner.tasks.spawn(receive_loop(inner, reader));
        Ok(())
    }

    /// Whether a connection is currently established
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Number of successful redials so far
    pub fn reconnect_count(&self) -> u64 {
        self.inner.reconnects.load(Ordering::Relaxed)
    }

    /// Publish one opaque payload (a JSON subtree) to the broker
    pub async fn publish(&self, payload: Bytes) -> Result<()> {
        self.inner.send(&Frame::publish(payload)?).await
    }

    /// Publish several payloads as individual messages
    pub async fn publish_batch(&self, payloads: Vec<Bytes>) -> Result<()> {
        for payload in payloads {
            self.publish(payload).await?;
        }
        Ok(())
    }

    /// Subscribe with a start cursor and a delivery handler.
    ///
    /// The handler runs inline on the receive loop, so messages are handled
    /// strictly in arrival order; each handled message is acked (or nacked
    /// on failure) back to the broker.
    pub async fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        start_offset: Offset,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        let subscriber_id = subscriber_id.into();
        *self.inner.subscription.lock() = Some(Subscription {
            subscriber_id: subscriber_id.clone(),
            start_offset,
            handler,
        });

        self.inner
            .send(&Frame::subscribe(subscriber_id, start_offset))
            .await
    }

    /// Drop the subscription and tell the broker
    pub async fn unsubscribe(&self, subscriber_id: &str) -> Result<()> {
        *self.inner.subscription.lock() = None;
        self.inner.send(&Frame::unsubscribe(subscriber_id)).await
    }

    /// Acknowledge a delivered message (advisory)
    pub async fn ack(&self, message_id: Uuid) -> Result<()> {
        self.inner.send(&Frame::ack(message_id)).await
    }

    /// Negatively acknowledge a delivered message (advisory)
    pub async fn nack(&self, message_id: Uuid) -> Result<()> {
        self.inner.send(&Frame::nack(message_id)).await
    }

    /// Close the connection and stop the receive loop
    pub async fn close(&self) {
        self.inner.cancel.cancel();
        self.inner.connected.store(false, Ordering::Release);
        self.inner.writer.lock().await.take();

        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }
}

impl ClientInner {
    /// Dial the broker; on success the write half is stored and the read
    /// half returned for the receive loop.
    async fn dial(&self) -> Result<OwnedReadHalf> {
        let address = self.config.address();

        let stream = match timeout(self.config.timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ClientError::Connect { address, source: e });
            }
            Err(_) => {
                return Err(ClientError::Connect {
                    address,
                    source: std::io::Error::new(ErrorKind::TimedOut, "connect timed out"),
                });
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        *self.writer.lock().await = Some(writer);
        self.connected.store(true, Ordering::Release);

        debug!(address = %self.config.address(), "connected to broker");
        Ok(reader)
    }

    /// Write one frame under the shared writer lock with the write timeout
    async fn send(&self, frame: &Frame) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ClientError::NotConnected)?;

        match timeout(self.config.timeout, write_frame(writer, frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                // The stream is broken; drop it so the receive loop redials.
                *guard = None;
                self.connected.store(false, Ordering::Release);
                Err(e.into())
            }
            Err(_) => {
                *guard = None;
                self.connected.store(false, Ordering::Release);
                Err(ClientError::WriteTimeout)
            }
        }
    }

    /// Tear down connection state after a read failure
    async fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        self.writer.lock().await.take();
    }

    /// Redial until connected or cancelled, then replay the subscription
    /// from its original start offset.
    async fn reconnect(&self) -> Option<OwnedReadHalf> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }

            let reader = match self.dial().await {
                Ok(reader) => reader,
                Err(e) => {
                    debug!(error = %e, "redial failed");
                    continue;
                }
            };

            self.reconnects.fetch_add(1, Ordering::Relaxed);

            let subscription = self.subscription.lock().clone();
            if let Some(sub) = subscription {
                let frame = Frame::subscribe(sub.subscriber_id.clone(), sub.start_offset);
                if let Err(e) = self.send(&frame).await {
                    warn!(
                        subscriber_id = %sub.subscriber_id,
                        error = %e,
                        "re-subscribe failed; redialing"
                    );
                    self.mark_disconnected().await;
                    continue;
                }
                debug!(
                    subscriber_id = %sub.subscriber_id,
                    start_offset = %sub.start_offset,
                    "re-subscribed after reconnect"
                );
            }

            return Some(reader);
        }
    }

    /// Handle one frame from the broker
    async fn dispatch(&self, frame: Frame) {
        match frame.frame_type {
            FrameType::Message => self.dispatch_message(frame).await,
            FrameType::Response => {
                if frame.success == Some(false) {
                    warn!(error = ?frame.error, "broker rejected request");
                } else {
                    trace!("request acknowledged");
                }
            }
            FrameType::Error => {
                warn!(error = ?frame.error, "broker reported error");
            }
            _ => {
                debug!(frame_type = ?frame.frame_type, "unexpected frame from broker");
            }
        }
    }

    async fn dispatch_message(&self, frame: Frame) {
        let handler = match self.subscription.lock().as_ref() {
            Some(sub) => Arc::clone(&sub.handler),
            None => {
                debug!("message frame without an active subscription");
                return;
            }
        };

        let Some(message_id) = frame.message_id else {
            debug!("message frame without message_id");
            return;
        };
        let payload = match frame.payload_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "message frame without payload");
                return;
            }
        };
        let offset = frame
            .offset
            .and_then(Offset::position)
            .unwrap_or_default();

        let message = Arc::new(Message {
            id: message_id,
            offset,
            payload,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        });

        match handler.handle(message).await {
            Ok(()) => {
                if let Err(e) = self.send(&Frame::ack(message_id)).await {
                    debug!(error = %e, "failed to send ack");
                }
            }
            Err(error) => {
                warn!(%message_id, offset, %error, "handler failed");
                if let Err(e) = self.send(&Frame::nack(message_id)).await {
                    debug!(error = %e, "failed to send nack");
                }
            }
        }
    }
}

/// Receive loop: read frames until the connection breaks, then reconnect
/// if configured.
async fn receive_loop(inner: Arc<ClientInner>, mut reader: OwnedReadHalf) {
    loop {
        let frame = tokio::select! {
            _ = inner.cancel.cancelled() => return,
            result = read_frame(&mut reader) => match result {
                Ok(frame) => frame,
                Err(e) => {
                    if inner.cancel.is_cancelled() {
                        return;
                    }
                    if e.is_recoverable() {
                        debug!(error = %e, "dropping invalid frame");
                        continue;
                    }

                    debug!(error = %e, "connection lost");
                    inner.mark_disconnected().await;
                    if !inner.config.auto_reconnect {
                        return;
                    }
                    match inner.reconnect().await {
                        Some(new_reader) => {
                            reader = new_reader;
                            continue;
                        }
                        None => return,
                    }
                }
            },
        };

        inner.dispatch(frame).await;
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
