//! Tests for browse flow operations.

use super::*;
use crate::flow::noop_eviction;
use restq_broker::{BrokerClient, BrowserSettings, InMemoryBroker, Message};

const WAIT: Duration = Duration::from_millis(50);

fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

fn msg_ref(id: &str) -> MessageRef {
    MessageRef::new(id.to_string()).unwrap()
}

fn text(body: &str) -> Message {
    Message::new(body.as_bytes().to_vec().into())
}

async fn bound_browse(broker: &InMemoryBroker, name: &str, mode: BrowseMode) -> BrowseFlow {
    let q = queue(name);
    broker.create_queue(&q).await;
    let browser = broker
        .open_browser(&q, BrowserSettings::default())
        .await
        .unwrap();
    BrowseFlow::new(
        FlowId::derive("browse-1").unwrap(),
        q,
        mode,
        browser,
        Arc::new(TimeoutScheduler::new()),
        Duration::from_secs(60),
        WAIT,
        noop_eviction(),
    )
}

// ============================================================================
// Browse Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_browse_walks_queue_without_consuming() {
    let broker = InMemoryBroker::new();
    let q = queue("orders");
    broker.publish(&q, text("m1")).await;
    broker.publish(&q, text("m2")).await;
    let flow = bound_browse(&broker, "orders", BrowseMode::ReadOnly).await;

    let first = flow.browse_next(&msg_ref("b1")).await.unwrap().unwrap();
    let second = flow.browse_next(&msg_ref("b2")).await.unwrap().unwrap();
    assert_eq!(&first.body[..], b"m1");
    assert_eq!(&second.body[..], b"m2");
    assert!(flow.browse_next(&msg_ref("b3")).await.unwrap().is_none());

    // Nothing was consumed.
    assert_eq!(broker.queue_depth(&q).await, Some(2));
    flow.close().await;

    // A later browse flow over the same queue observes the same messages.
    let successor = bound_browse(&broker, "orders", BrowseMode::ReadOnly).await;
    let replayed = successor.browse_next(&msg_ref("b1")).await.unwrap().unwrap();
    assert_eq!(&replayed.body[..], b"m1");
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_ref_is_a_precondition_violation() {
    let broker = InMemoryBroker::new();
    let q = queue("orders");
    broker.publish(&q, text("m1")).await;
    broker.publish(&q, text("m2")).await;
    let flow = bound_browse(&broker, "orders", BrowseMode::ReadOnly).await;

    flow.browse_next(&msg_ref("b1")).await.unwrap().unwrap();
    assert!(matches!(
        flow.browse_next(&msg_ref("b1")).await.err(),
        Some(FlowError::PreconditionViolated { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_seen_registry_lookups() {
    let broker = InMemoryBroker::new();
    let q = queue("orders");
    broker.publish(&q, text("m1")).await;
    let flow = bound_browse(&broker, "orders", BrowseMode::ReadOnly).await;

    flow.browse_next(&msg_ref("b1")).await.unwrap().unwrap();

    assert!(flow.is_seen(&msg_ref("b1")).await.unwrap());
    assert!(!flow.is_seen(&msg_ref("b9")).await.unwrap());
    assert_eq!(flow.seen_refs().await.unwrap(), vec![msg_ref("b1")]);

    let seen = flow.get_seen(&msg_ref("b1")).await.unwrap();
    assert_eq!(&seen.body[..], b"m1");
    assert!(matches!(
        flow.get_seen(&msg_ref("b9")).await.err(),
        Some(FlowError::UnknownMessageRef { .. })
    ));
}

// ============================================================================
// Delete Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_delete_removes_exactly_the_targeted_message() {
    let broker = InMemoryBroker::new();
    let q = queue("orders");
    broker.publish(&q, text("m1")).await;
    broker.publish(&q, text("m2")).await;
    let flow = bound_browse(&broker, "orders", BrowseMode::ReadDelete).await;

    flow.browse_next(&msg_ref("b1")).await.unwrap().unwrap();
    flow.delete(&msg_ref("b1")).await.unwrap();

    assert_eq!(broker.queue_depth(&q).await, Some(1));
    // The ref is no longer tracked once the message is gone.
    assert!(!flow.is_seen(&msg_ref("b1")).await.unwrap());
    assert!(matches!(
        flow.delete(&msg_ref("b1")).await.err(),
        Some(FlowError::UnknownMessageRef { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_read_only_mode_rejects_delete() {
    let broker = InMemoryBroker::new();
    let q = queue("orders");
    broker.publish(&q, text("m1")).await;
    let flow = bound_browse(&broker, "orders", BrowseMode::ReadOnly).await;

    flow.browse_next(&msg_ref("b1")).await.unwrap().unwrap();
    assert!(matches!(
        flow.delete(&msg_ref("b1")).await.err(),
        Some(FlowError::ReadOnlyFlow { .. })
    ));
    // Queue untouched, ref still tracked.
    assert_eq!(broker.queue_depth(&q).await, Some(1));
    assert!(flow.is_seen(&msg_ref("b1")).await.unwrap());
}

// ============================================================================
// Close Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_closed_browse_flow_is_permanently_inert() {
    let broker = InMemoryBroker::new();
    let flow = bound_browse(&broker, "orders", BrowseMode::ReadDelete).await;

    flow.close().await;
    flow.close().await; // idempotent
    assert!(flow.is_closed().await);

    assert!(matches!(
        flow.browse_next(&msg_ref("b1")).await.err(),
        Some(FlowError::Closed { .. })
    ));
    assert!(matches!(
        flow.delete(&msg_ref("b1")).await.err(),
        Some(FlowError::Closed { .. })
    ));
    assert!(matches!(
        flow.seen_refs().await.err(),
        Some(FlowError::Closed { .. })
    ));
    assert!(matches!(
        flow.keepalive().await.err(),
        Some(FlowError::Closed { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_mode_accessor() {
    let broker = InMemoryBroker::new();
    let read_only = bound_browse(&broker, "q-ro", BrowseMode::ReadOnly).await;
    let read_delete = bound_browse(&broker, "q-rd", BrowseMode::ReadDelete).await;
    assert_eq!(read_only.mode(), BrowseMode::ReadOnly);
    assert_eq!(read_delete.mode(), BrowseMode::ReadDelete);
}
