use super::*;
use frames::{Broadcast, Operation};
use std::time::Duration;
use tokio::time::timeout;

fn ping(channel: &str) -> Broadcast {
    Broadcast::new(channel, Operation::Delete, "kanban_cards").with_old_record(serde_json::json!({"id": "c1"}))
}

#[tokio::test]
async fn publish_reaches_subscriber_as_encoded_frame() {
    let hub = MemoryHub::new(4);
    let mut rx = hub.subscribe("kanban-cards:b1").await.unwrap();
    assert_eq!(hub.publish(&ping("kanban-cards:b1")), 1);

    let bytes = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    let decoded = frames::decode_broadcast(&bytes).unwrap();
    assert_eq!(decoded.table, "kanban_cards");
}

#[tokio::test]
async fn publish_without_subscriber_delivers_nothing() {
    let hub = MemoryHub::new(4);
    assert_eq!(hub.publish(&ping("nobody")), 0);
}

#[tokio::test]
async fn resubscribe_replaces_previous_receiver() {
    let hub = MemoryHub::new(4);
    let mut first = hub.subscribe("c").await.unwrap();
    let mut second = hub.subscribe("c").await.unwrap();

    assert!(timeout(Duration::from_secs(1), first.recv()).await.unwrap().is_none());
    hub.publish(&ping("c"));
    assert!(timeout(Duration::from_secs(1), second.recv()).await.unwrap().is_some());
}

#[tokio::test]
async fn unsubscribe_is_idempotent_and_prunes_channel() {
    let hub = MemoryHub::new(4);
    let _rx = hub.subscribe("a").await.unwrap();
    assert_eq!(hub.channels(), vec!["a".to_string()]);
    hub.unsubscribe("a").await;
    hub.unsubscribe("a").await;
    assert!(hub.channels().is_empty());
}

#[tokio::test]
async fn full_queue_drops_frame() {
    let hub = MemoryHub::new(1);
    let _rx = hub.subscribe("a").await.unwrap();
    assert_eq!(hub.publish(&ping("a")), 1);
    assert_eq!(hub.publish(&ping("a")), 0);
}

#[tokio::test]
async fn closed_hub_refuses_subscribe() {
    let hub = MemoryHub::new(1);
    hub.close();
    let err = hub.subscribe("a").await.unwrap_err();
    assert_eq!(err.error_code(), "E_TRANSPORT_CLOSED");
}
