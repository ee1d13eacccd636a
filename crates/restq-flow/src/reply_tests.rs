//! Tests for the transport reply envelope.

use super::*;

#[test]
fn test_ok_reply() {
    let reply = Reply::ok();
    assert!(reply.success);
    assert_eq!(reply.status, 200);
    assert_eq!(reply.reason, "OK");
    assert!(reply.payload.is_none());
}

#[test]
fn test_created_carries_flow_id() {
    let flow_id = FlowId::derive("corr-1").unwrap();
    let reply = Reply::created(flow_id.clone());
    assert!(reply.success);
    assert_eq!(reply.status, 201);
    match reply.payload {
        Some(ReplyPayload::FlowId(id)) => assert_eq!(id, flow_id),
        other => panic!("expected flow id payload, got {other:?}"),
    }
}

#[test]
fn test_no_message_is_successful_but_404() {
    let reply = Reply::no_message();
    assert!(reply.success);
    assert_eq!(reply.status, 404);
    assert_eq!(reply.reason, "no messages available on this flow");
}

#[test]
fn test_failure_uses_stable_mapping() {
    let error = FlowError::Closed {
        flow_id: "f1".to_string(),
    };
    let reply = Reply::failure(&error);
    assert!(!reply.success);
    assert_eq!(reply.status, 501);
    assert_eq!(reply.reason, "this flow has been closed due to inactivity");
}

#[test]
fn test_with_refs_payload() {
    let refs = vec![
        MessageRef::new("c1".to_string()).unwrap(),
        MessageRef::new("c2".to_string()).unwrap(),
    ];
    let reply = Reply::with_refs(refs.clone());
    match reply.payload {
        Some(ReplyPayload::MessageRefs(listed)) => assert_eq!(listed, refs),
        other => panic!("expected refs payload, got {other:?}"),
    }
}

#[test]
fn test_pull_result_conversion() {
    let empty: Result<Option<ReceivedMessage>, FlowError> = Ok(None);
    let reply = Reply::from(empty);
    assert_eq!(reply.status, 404);
    assert!(reply.success);

    let failed: Result<Option<ReceivedMessage>, FlowError> = Err(FlowError::UnknownFlow {
        flow_id: "f1".to_string(),
    });
    let reply = Reply::from(failed);
    assert!(!reply.success);
    assert_eq!(reply.status, 400);
}

#[test]
fn test_with_header() {
    let reply = Reply::ok().with_header("Location".to_string(), "/restq/rec/f1".to_string());
    assert_eq!(
        reply.headers.get("Location"),
        Some(&"/restq/rec/f1".to_string())
    );
}
