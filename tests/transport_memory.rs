// tests/transport_memory.rs

mod common;

use serde_json::{json, Value};
use tokio::time::{timeout, Duration};

use common::init_logging;
use mom_queue::{
    // ---
    BoxError,
    ConnectionConfig,
    Envelope,
    Transport,
    TransportBuilder,
    TransportState,
};

async fn memory_transport(host: &str, binding: &str) -> Transport {
    // ---
    TransportBuilder::new()
        .broker("memory")
        .host(host)
        .bind(binding)
        .build()
        .await
        .expect("failed to build memory transport")
}

#[tokio::test]
async fn memory_publish_then_get_delivers() {
    // ---
    // Arrange
    // ---
    init_logging();
    let producer = memory_transport("mptgd", "test.queue").await;
    let mut consumer = memory_transport("mptgd", "test.queue").await;

    // ---
    // Act
    // ---
    producer.publish(&json!({ "hello": "world" })).await.expect("publish failed");

    // ---
    // Assert
    // ---
    let msg: Option<Value> = consumer.get().await.expect("get failed");
    assert_eq!(msg, Some(json!({ "hello": "world" })));
}

#[tokio::test]
async fn memory_consume_waits_for_publish() {
    // ---
    // Arrange
    // ---
    init_logging();
    let mut consumer = memory_transport("mcwfp", "later").await;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    consumer
        .set_consumer(move |msg: String| {
            let tx = tx.clone();
            async move { tx.send(msg).map_err(BoxError::from) }
        })
        .unwrap();

    let waiting = tokio::spawn(async move {
        consumer.consume().await.expect("consume failed");
    });

    // ---
    // Act
    // ---
    tokio::time::sleep(Duration::from_millis(20)).await;
    let producer = memory_transport("mcwfp", "later").await;
    producer.publish(&"eventually").await.unwrap();

    // ---
    // Assert
    // ---
    timeout(Duration::from_secs(2), waiting)
        .await
        .expect("consume never returned")
        .unwrap();
    assert_eq!(rx.recv().await.as_deref(), Some("eventually"));
}

#[tokio::test]
async fn memory_raw_envelopes_round_trip() {
    // ---
    // Arrange
    // ---
    init_logging();
    let mut transport = Transport::new(mom_queue::create_broker("memory").unwrap());
    assert_eq!(transport.state(), TransportState::Disconnected);

    transport
        .connect(ConnectionConfig::new("mrert").with_option("poll_interval_ms", "2"))
        .await
        .unwrap();
    transport.bind("raw").await.unwrap();

    // ---
    // Act
    // ---
    transport
        .publish_envelope(Envelope::from_bytes("opaque bytes"))
        .await
        .unwrap();
    let delivery = transport.claim().await.unwrap();

    // ---
    // Assert
    // ---
    assert_eq!(delivery.envelope.as_bytes(), b"opaque bytes");
    transport.ack_success(delivery).await.unwrap();
    assert!(transport.try_claim().await.unwrap().is_none());
}
