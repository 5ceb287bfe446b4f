//! End-to-end tests over real TCP sockets
//!
//! These drive the broker server with actual clients: publish, fan-out
//! replay, latest-only subscriptions, oversize frames, and duplicate
//! subscriber handling.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use gpufleet_broker::{Broker, BrokerServer, BrokerServerConfig, QueueStats};
use gpufleet_client::{BrokerClient, ClientConfig};
use gpufleet_model::{GpuMetric, MetricBatch, METRIC_GPU_UTIL};
use gpufleet_protocol::{
    read_frame, write_frame, Frame, FrameType, HandlerError, Message, MessageHandler, Offset,
    ProtocolError, MAX_FRAME_SIZE,
};

/// Start a broker server on a fixed local port and wait until it accepts
async fn start_broker(port: u16) -> (Arc<Broker>, CancellationToken) {
    let broker = Arc::new(Broker::new());
    let cancel = CancellationToken::new();

    let server = BrokerServer::new(
        Arc::clone(&broker),
        BrokerServerConfig {
            address: "127.0.0.1".into(),
            port,
        },
    );
    tokio::spawn(server.run(cancel.clone()));

    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return (broker, cancel);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("broker did not start listening on port {port}");
}

fn client_config(port: u16) -> ClientConfig {
    ClientConfig {
        host: "127.0.0.1".into(),
        port,
        timeout: Duration::from_secs(2),
        auto_reconnect: false,
        reconnect_delay: Duration::from_millis(50),
    }
}

/// Sink double: collects the record batches a consumer would write
#[derive(Default)]
struct SinkRecorder {
    batches: Mutex<Vec<Vec<GpuMetric>>>,
}

#[async_trait::async_trait]
impl MessageHandler for SinkRecorder {
    async fn handle(&self, message: Arc<Message>) -> Result<(), HandlerError> {
        let batch: MetricBatch = serde_json::from_slice(&message.payload)
            .map_err(|e| HandlerError::new(e.to_string()))?;
        self.batches.lock().push(batch.metrics);
        Ok(())
    }
}

impl SinkRecorder {
    fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }

    fn record_uuids(&self) -> Vec<Vec<String>> {
        self.batches
            .lock()
            .iter()
            .map(|batch| batch.iter().map(|m| m.uuid.clone()).collect())
            .collect()
    }
}

fn single_record_batch(n: usize) -> Bytes {
    let batch = MetricBatch::new(
        "streamer-e2e",
        vec![GpuMetric::new(METRIC_GPU_UTIL, format!("GPU-{n}"), n as f64)],
    );
    Bytes::from(serde_json::to_vec(&batch).unwrap())
}

async fn wait_until(check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn fan_out_replay_reaches_every_consumer_in_order() {
    let port = 52431;
    let (broker, cancel) = start_broker(port).await;

    // Three single-record batches published before anyone subscribes.
    let producer = BrokerClient::new(client_config(port));
    producer.connect().await.unwrap();
    for n in 0..3 {
        producer.publish(single_record_batch(n)).await.unwrap();
    }
    wait_until(|| broker.log().len() == 3).await;

    // Two independent consumers replay from the beginning.
    let first_sink = Arc::new(SinkRecorder::default());
    let second_sink = Arc::new(SinkRecorder::default());

    let first = BrokerClient::new(client_config(port));
    first.connect().await.unwrap();
    first
        .subscribe("c1", Offset::EARLIEST, first_sink.clone())
        .await
        .unwrap();

    let second = BrokerClient::new(client_config(port));
    second.connect().await.unwrap();
    second
        .subscribe("c2", Offset::EARLIEST, second_sink.clone())
        .await
        .unwrap();

    wait_until(|| first_sink.batch_count() == 3 && second_sink.batch_count() == 3).await;

    let expected = vec![
        vec!["GPU-0".to_string()],
        vec!["GPU-1".to_string()],
        vec!["GPU-2".to_string()],
    ];
    assert_eq!(first_sink.record_uuids(), expected);
    assert_eq!(second_sink.record_uuids(), expected);

    wait_until(|| {
        broker.cursor("c1").unwrap_or_default() == 3
            && broker.cursor("c2").unwrap_or_default() == 3
    })
    .await;

    let stats = broker.stats();
    assert_eq!(stats.total_messages, 3);
    assert_eq!(stats.latest_offset, 2);
    assert_eq!(stats.subscriber_count, 2);

    producer.close().await;
    first.close().await;
    second.close().await;
    cancel.cancel();
}

#[tokio::test]
async fn latest_subscription_sees_only_new_batches() {
    let port = 52432;
    let (broker, cancel) = start_broker(port).await;

    // History the consumer must not see.
    for n in 0..3 {
        broker.publish(single_record_batch(n)).unwrap();
    }

    let sink = Arc::new(SinkRecorder::default());
    let consumer = BrokerClient::new(client_config(port));
    consumer.connect().await.unwrap();
    consumer
        .subscribe("c1", Offset::LATEST, sink.clone())
        .await
        .unwrap();
    wait_until(|| broker.cursor("c1").is_ok()).await;
    assert_eq!(broker.cursor("c1").unwrap(), 3);

    let producer = BrokerClient::new(client_config(port));
    producer.connect().await.unwrap();
    producer.publish(single_record_batch(99)).await.unwrap();

    wait_until(|| sink.batch_count() == 1).await;
    assert_eq!(sink.record_uuids(), vec![vec!["GPU-99".to_string()]]);
    wait_until(|| broker.cursor("c1").unwrap_or_default() == 4).await;

    producer.close().await;
    consumer.close().await;
    cancel.cancel();
}

#[tokio::test]
async fn oversize_frame_closes_the_connection_without_appending() {
    let port = 52433;
    let (broker, cancel) = start_broker(port).await;

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream
        .write_all(&(MAX_FRAME_SIZE + 1).to_be_bytes())
        .await
        .unwrap();

    // The broker must hang up rather than try to read the body.
    let result = read_frame(&mut stream).await;
    assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    assert_eq!(broker.log().len(), 0);

    cancel.cancel();
}

#[tokio::test]
async fn duplicate_subscribe_is_rejected_without_perturbing_the_first() {
    let port = 52434;
    let (broker, cancel) = start_broker(port).await;

    let mut first = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    write_frame(&mut first, &Frame::subscribe("c1", Offset::EARLIEST))
        .await
        .unwrap();
    let reply = read_frame(&mut first).await.unwrap();
    assert_eq!(reply.frame_type, FrameType::Response);
    assert_eq!(reply.success, Some(true));

    let mut second = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    write_frame(&mut second, &Frame::subscribe("c1", Offset::EARLIEST))
        .await
        .unwrap();
    let reply = read_frame(&mut second).await.unwrap();
    assert_eq!(reply.frame_type, FrameType::Response);
    assert_eq!(reply.success, Some(false));
    assert_eq!(reply.error.as_deref(), Some("subscriber already exists"));

    assert_eq!(broker.cursor("c1").unwrap(), 0);

    cancel.cancel();
}

#[tokio::test]
async fn zero_offset_subscribe_defaults_to_latest() {
    let port = 52435;
    let (broker, cancel) = start_broker(port).await;

    for n in 0..2 {
        broker.publish(single_record_batch(n)).unwrap();
    }

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    write_frame(&mut stream, &Frame::subscribe("c1", Offset(0)))
        .await
        .unwrap();
    let reply = read_frame(&mut stream).await.unwrap();
    assert_eq!(reply.success, Some(true));

    // Zero means "new messages only", so the cursor lands at the tail.
    assert_eq!(broker.cursor("c1").unwrap(), 2);

    cancel.cancel();
}

#[tokio::test]
async fn get_stats_frame_returns_the_queue_snapshot() {
    let port = 52436;
    let (broker, cancel) = start_broker(port).await;

    for n in 0..4 {
        broker.publish(single_record_batch(n)).unwrap();
    }

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    write_frame(&mut stream, &Frame::get_stats()).await.unwrap();

    let reply = read_frame(&mut stream).await.unwrap();
    assert_eq!(reply.frame_type, FrameType::Response);
    assert_eq!(reply.success, Some(true));

    let stats: QueueStats = serde_json::from_slice(&reply.payload_bytes().unwrap()).unwrap();
    assert_eq!(stats.total_messages, 4);
    assert_eq!(stats.latest_offset, 3);
    assert_eq!(stats.subscriber_count, 0);

    cancel.cancel();
}

#[tokio::test]
async fn disconnect_unsubscribes_the_connection_subscriber() {
    let port = 52437;
    let (broker, cancel) = start_broker(port).await;

    let sink = Arc::new(SinkRecorder::default());
    let consumer = BrokerClient::new(client_config(port));
    consumer.connect().await.unwrap();
    consumer
        .subscribe("c1", Offset::EARLIEST, sink.clone())
        .await
        .unwrap();
    wait_until(|| broker.stats().subscriber_count == 1).await;

    consumer.close().await;
    wait_until(|| broker.stats().subscriber_count == 0).await;

    cancel.cancel();
}
