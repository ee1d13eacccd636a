//! Structured reply envelope for the transport boundary.
//!
//! The flow layer never serializes responses itself. Every operation outcome
//! is packaged as a [`Reply`]: success flag, numeric status code, stable
//! human-readable reason, optional headers, and an optional payload handle
//! that the transport renders however it likes.

use crate::error::FlowError;
use crate::ident::{FlowId, MessageRef};
use restq_broker::ReceivedMessage;
use std::collections::HashMap;

#[cfg(test)]
#[path = "reply_tests.rs"]
mod tests;

/// Payload handed back to the transport for rendering
#[derive(Debug, Clone)]
pub enum ReplyPayload {
    /// One raw delivered message
    Message(ReceivedMessage),
    /// A set of tracked message refs
    MessageRefs(Vec<MessageRef>),
    /// The id of a newly bound flow
    FlowId(FlowId),
}

/// Outcome of one flow operation, ready for the transport to render
#[derive(Debug, Clone)]
pub struct Reply {
    pub success: bool,
    pub status: u16,
    pub reason: String,
    pub headers: HashMap<String, String>,
    pub payload: Option<ReplyPayload>,
}

impl Reply {
    /// Plain success with no payload
    pub fn ok() -> Self {
        Self {
            success: true,
            status: 200,
            reason: "OK".to_string(),
            headers: HashMap::new(),
            payload: None,
        }
    }

    /// Successful bind: 201 plus the new flow id
    pub fn created(flow_id: FlowId) -> Self {
        Self {
            success: true,
            status: 201,
            reason: "OK".to_string(),
            headers: HashMap::new(),
            payload: Some(ReplyPayload::FlowId(flow_id)),
        }
    }

    /// Success carrying one delivered message
    pub fn with_message(message: ReceivedMessage) -> Self {
        Self {
            success: true,
            status: 200,
            reason: "OK".to_string(),
            headers: HashMap::new(),
            payload: Some(ReplyPayload::Message(message)),
        }
    }

    /// Success carrying a list of message refs
    pub fn with_refs(refs: Vec<MessageRef>) -> Self {
        Self {
            success: true,
            status: 200,
            reason: "OK".to_string(),
            headers: HashMap::new(),
            payload: Some(ReplyPayload::MessageRefs(refs)),
        }
    }

    /// A pull that found nothing within the bounded wait. The operation
    /// succeeded; the 404 tells the HTTP-ish caller the result set is empty.
    pub fn no_message() -> Self {
        Self {
            success: true,
            status: 404,
            reason: "no messages available on this flow".to_string(),
            headers: HashMap::new(),
            payload: None,
        }
    }

    /// A rejected operation, rendered from its stable (status, reason) pair
    pub fn failure(error: &FlowError) -> Self {
        Self {
            success: false,
            status: error.status_code(),
            reason: error.reason(),
            headers: HashMap::new(),
            payload: None,
        }
    }

    /// Attach a response header
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }
}

impl From<Result<Option<ReceivedMessage>, FlowError>> for Reply {
    fn from(result: Result<Option<ReceivedMessage>, FlowError>) -> Self {
        match result {
            Ok(Some(message)) => Reply::with_message(message),
            Ok(None) => Reply::no_message(),
            Err(error) => Reply::failure(&error),
        }
    }
}
