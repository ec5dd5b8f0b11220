//! Tests for the in-process bus

use std::time::Duration;

use bytes::Bytes;

use crate::memory::MemoryBus;
use crate::message::{Headers, OutboundMessage};
use crate::stream::{ConsumerConfig, StreamConfig};
use crate::{Bus, BusError, KvOperation};

fn event_stream() -> StreamConfig {
    StreamConfig::new("GVT_test", vec!["$GVT.test.EVENT.>".to_string()])
        .with_duplicate_window(Duration::from_secs(600))
}

fn outbound(subject: &str, body: &str) -> OutboundMessage {
    OutboundMessage::new(subject, Bytes::from(body.to_string()), Headers::new())
}

// =============================================================================
// Streams and publishing
// =============================================================================

#[tokio::test]
async fn test_ensure_stream_is_idempotent() {
    let bus = MemoryBus::new();
    bus.ensure_stream(event_stream()).await.unwrap();
    bus.ensure_stream(event_stream()).await.unwrap();
    assert!(bus.stream_exists("GVT_test"));
}

#[tokio::test]
async fn test_publish_assigns_sequences() {
    let bus = MemoryBus::new();
    bus.ensure_stream(event_stream()).await.unwrap();

    let s1 = bus
        .publish(outbound("$GVT.test.EVENT.a", "one"), "")
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    let s2 = bus
        .publish(outbound("$GVT.test.EVENT.a", "two"), "")
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(s1, 1);
    assert_eq!(s2, 2);
    assert_eq!(bus.stream_messages("GVT_test").len(), 2);
}

#[tokio::test]
async fn test_publish_without_matching_stream_fails() {
    let bus = MemoryBus::new();
    let err = bus
        .publish(outbound("other.subject", "x"), "")
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::NoStreamForSubject(_)));
}

#[tokio::test]
async fn test_publish_dedup_within_window() {
    let bus = MemoryBus::new();
    bus.ensure_stream(event_stream()).await.unwrap();

    let first = bus
        .publish(outbound("$GVT.test.EVENT.a", "one"), "id-1")
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    let dup = bus
        .publish(outbound("$GVT.test.EVENT.a", "one again"), "id-1")
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    // Second publish is dropped, reporting the original sequence
    assert_eq!(dup, first);
    assert_eq!(bus.stream_messages("GVT_test").len(), 1);
}

#[tokio::test]
async fn test_publish_failure_injection() {
    let bus = MemoryBus::new();
    bus.ensure_stream(event_stream()).await.unwrap();

    bus.set_publish_failures(true);
    let err = bus
        .publish(outbound("$GVT.test.EVENT.a", "x"), "")
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::PublishFailed(_)));

    bus.set_publish_failures(false);
    bus.publish(outbound("$GVT.test.EVENT.a", "x"), "")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_stream() {
    let bus = MemoryBus::new();
    bus.ensure_stream(event_stream()).await.unwrap();
    bus.delete_stream("GVT_test").await.unwrap();
    assert!(!bus.stream_exists("GVT_test"));

    let err = bus.delete_stream("GVT_test").await.unwrap_err();
    assert!(matches!(err, BusError::StreamNotFound(_)));
}

// =============================================================================
// Pull consumers and cumulative ack
// =============================================================================

#[tokio::test]
async fn test_fetch_delivers_in_order() {
    let bus = MemoryBus::new();
    bus.ensure_stream(event_stream()).await.unwrap();

    for i in 0..3 {
        bus.publish(outbound("$GVT.test.EVENT.a", &format!("m{i}")), "")
            .await
            .unwrap();
    }

    let mut consumer = bus
        .pull_subscribe("GVT_test", ConsumerConfig::new("dur", "$GVT.test.EVENT.>"))
        .await
        .unwrap();

    let batch = consumer.fetch(10, Duration::from_millis(50)).await.unwrap();
    assert_eq!(batch.len(), 3);
    assert_eq!(
        batch.iter().map(|m| m.stream_sequence).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn test_fetch_honors_filter_subject() {
    let bus = MemoryBus::new();
    bus.ensure_stream(event_stream()).await.unwrap();

    bus.publish(outbound("$GVT.test.EVENT.a", "match"), "")
        .await
        .unwrap();
    bus.publish(outbound("$GVT.test.EVENT.b", "no match"), "")
        .await
        .unwrap();

    let mut consumer = bus
        .pull_subscribe("GVT_test", ConsumerConfig::new("dur", "$GVT.test.EVENT.a"))
        .await
        .unwrap();

    let batch = consumer.fetch(10, Duration::from_millis(50)).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].subject, "$GVT.test.EVENT.a");
}

#[tokio::test]
async fn test_fetch_times_out_empty() {
    let bus = MemoryBus::new();
    bus.ensure_stream(event_stream()).await.unwrap();

    let mut consumer = bus
        .pull_subscribe("GVT_test", ConsumerConfig::new("dur", "$GVT.test.EVENT.>"))
        .await
        .unwrap();

    let batch = consumer.fetch(10, Duration::from_millis(20)).await.unwrap();
    assert!(batch.is_empty());
}

#[tokio::test]
async fn test_fetch_wakes_on_publish() {
    let bus = MemoryBus::new();
    bus.ensure_stream(event_stream()).await.unwrap();

    let mut consumer = bus
        .pull_subscribe("GVT_test", ConsumerConfig::new("dur", "$GVT.test.EVENT.>"))
        .await
        .unwrap();

    let publisher = bus.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        publisher
            .publish(outbound("$GVT.test.EVENT.a", "late"), "")
            .await
            .unwrap();
    });

    let batch = consumer.fetch(10, Duration::from_secs(2)).await.unwrap();
    assert_eq!(batch.len(), 1);
}

#[tokio::test]
async fn test_cumulative_ack_moves_floor() {
    let bus = MemoryBus::new();
    bus.ensure_stream(event_stream()).await.unwrap();

    for i in 0..3 {
        bus.publish(outbound("$GVT.test.EVENT.a", &format!("m{i}")), "")
            .await
            .unwrap();
    }

    let mut consumer = bus
        .pull_subscribe("GVT_test", ConsumerConfig::new("dur", "$GVT.test.EVENT.>"))
        .await
        .unwrap();

    let batch = consumer.fetch(10, Duration::from_millis(50)).await.unwrap();
    // Ack only the last; floor covers everything before it
    batch.last().unwrap().ack().await.unwrap();

    assert_eq!(bus.consumer_ack_floor("GVT_test", "dur"), Some(3));
}

#[tokio::test]
async fn test_unacked_messages_redeliver_on_resubscribe() {
    let bus = MemoryBus::new();
    bus.ensure_stream(event_stream()).await.unwrap();

    for i in 0..3 {
        bus.publish(outbound("$GVT.test.EVENT.a", &format!("m{i}")), "")
            .await
            .unwrap();
    }

    let mut consumer = bus
        .pull_subscribe("GVT_test", ConsumerConfig::new("dur", "$GVT.test.EVENT.>"))
        .await
        .unwrap();

    let batch = consumer.fetch(10, Duration::from_millis(50)).await.unwrap();
    assert_eq!(batch.len(), 3);
    // Ack only the first message, then drop the subscription
    batch[0].ack().await.unwrap();
    consumer.unsubscribe().await.unwrap();

    let mut consumer = bus
        .pull_subscribe("GVT_test", ConsumerConfig::new("dur", "$GVT.test.EVENT.>"))
        .await
        .unwrap();

    let redelivered = consumer.fetch(10, Duration::from_millis(50)).await.unwrap();
    assert_eq!(
        redelivered
            .iter()
            .map(|m| m.stream_sequence)
            .collect::<Vec<_>>(),
        vec![2, 3]
    );
}

#[tokio::test]
async fn test_fetch_after_unsubscribe_fails() {
    let bus = MemoryBus::new();
    bus.ensure_stream(event_stream()).await.unwrap();

    let mut consumer = bus
        .pull_subscribe("GVT_test", ConsumerConfig::new("dur", "$GVT.test.EVENT.>"))
        .await
        .unwrap();
    consumer.unsubscribe().await.unwrap();

    let err = consumer
        .fetch(1, Duration::from_millis(10))
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::ConsumerClosed(_)));
}

#[tokio::test]
async fn test_max_ack_pending_bounds_delivery() {
    let bus = MemoryBus::new();
    bus.ensure_stream(event_stream()).await.unwrap();

    for i in 0..5 {
        bus.publish(outbound("$GVT.test.EVENT.a", &format!("m{i}")), "")
            .await
            .unwrap();
    }

    let mut consumer = bus
        .pull_subscribe(
            "GVT_test",
            ConsumerConfig::new("dur", "$GVT.test.EVENT.>").with_max_ack_pending(2),
        )
        .await
        .unwrap();

    let batch = consumer.fetch(10, Duration::from_millis(50)).await.unwrap();
    assert_eq!(batch.len(), 2);

    // Acking frees the window
    batch.last().unwrap().ack().await.unwrap();
    let batch = consumer.fetch(10, Duration::from_millis(50)).await.unwrap();
    assert_eq!(batch.len(), 2);
}

// =============================================================================
// Key-value buckets
// =============================================================================

#[tokio::test]
async fn test_kv_put_get_delete() {
    let bus = MemoryBus::new();
    let kv = bus.key_value("GRAVITY_test_PRODUCT", "config store").await.unwrap();

    kv.put("orders", b"{}".to_vec()).await.unwrap();
    assert_eq!(kv.get("orders").await.unwrap(), Some(b"{}".to_vec()));
    assert_eq!(kv.keys().await.unwrap(), vec!["orders".to_string()]);

    kv.delete("orders").await.unwrap();
    assert_eq!(kv.get("orders").await.unwrap(), None);
}

#[tokio::test]
async fn test_kv_watch_sees_updates() {
    let bus = MemoryBus::new();
    let kv = bus.key_value("GRAVITY_test_PRODUCT", "config store").await.unwrap();

    let mut updates = kv.watch().await.unwrap();

    kv.put("orders", b"v1".to_vec()).await.unwrap();
    kv.delete("orders").await.unwrap();

    let put = updates.recv().await.unwrap();
    assert_eq!(put.operation, KvOperation::Put);
    assert_eq!(put.key, "orders");
    assert_eq!(put.value, b"v1".to_vec());

    let del = updates.recv().await.unwrap();
    assert_eq!(del.operation, KvOperation::Delete);
    assert_eq!(del.key, "orders");
}
