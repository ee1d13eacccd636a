//! Error types for flow operations.
//!
//! Every rejected operation maps to a stable `(status, reason)` pair via
//! [`FlowError::status_code`] and [`FlowError::reason`], so the transport can
//! render a meaningful response without inspecting internals. Validation and
//! state errors are ordinary recoverable results; `PreconditionViolated`
//! marks a caller contract breach (a reused correlation id) and is never
//! silently absorbed.

use restq_broker::{BrokerError, ValidationError};
use thiserror::Error;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

/// Comprehensive error type for all flow operations
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Queue '{queue_name}' already has an active flow")]
    AlreadyBound { queue_name: String },

    #[error("No flow matches id '{flow_id}'")]
    UnknownFlow { flow_id: String },

    #[error("No tracked message matches ref '{message_ref}'")]
    UnknownMessageRef { message_ref: String },

    #[error("Flow '{flow_id}' is closed")]
    Closed { flow_id: String },

    #[error("Flow '{flow_id}' is a read-only browse flow")]
    ReadOnlyFlow { flow_id: String },

    #[error("Caller contract violated: {message}")]
    PreconditionViolated { message: String },

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl FlowError {
    /// Numeric status code for the transport reply
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AlreadyBound { .. } => 400,
            Self::UnknownFlow { .. } => 400,
            Self::UnknownMessageRef { .. } => 400,
            Self::Closed { .. } => 501,
            Self::ReadOnlyFlow { .. } => 403,
            Self::PreconditionViolated { .. } => 500,
            Self::Broker(broker) => match broker {
                BrokerError::QueueNotFound { .. } => 404,
                BrokerError::AccessDenied { .. } => 401,
                BrokerError::CapabilityMissing { .. } => 501,
                BrokerError::InvalidSelector { .. } => 400,
                BrokerError::ConnectionFailed { .. } => 503,
                BrokerError::HandleClosed => 501,
                BrokerError::Rejected { code, .. } => *code,
                BrokerError::Validation(_) => 400,
            },
            Self::Validation(_) => 400,
        }
    }

    /// Stable human-readable reason for the transport reply
    pub fn reason(&self) -> String {
        match self {
            Self::AlreadyBound { .. } => "a flow to this queue is already active".to_string(),
            Self::UnknownFlow { .. } => "invalid queue name or provided flow ID".to_string(),
            Self::UnknownMessageRef { .. } => "provided msg ID invalid".to_string(),
            Self::Closed { .. } => "this flow has been closed due to inactivity".to_string(),
            Self::ReadOnlyFlow { .. } => "browse flow is read-only".to_string(),
            Self::PreconditionViolated { .. } => {
                "message ID already tracked on this flow".to_string()
            }
            Self::Broker(broker) => format!("broker: {broker}"),
            Self::Validation(validation) => validation.to_string(),
        }
    }
}
