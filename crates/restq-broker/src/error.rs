//! Error types for broker operations.

use thiserror::Error;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

/// Comprehensive error type for all broker operations
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Access denied to queue: {queue_name}")]
    AccessDenied { queue_name: String },

    #[error("Broker capability missing: {capability}")]
    CapabilityMissing { capability: String },

    #[error("Invalid selector '{expression}': {message}")]
    InvalidSelector {
        expression: String,
        message: String,
    },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Handle is closed")]
    HandleClosed,

    #[error("Broker rejected the operation: {code} - {reason}")]
    Rejected { code: u16, reason: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl BrokerError {
    /// Check if error is transient and the operation may succeed if retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::AccessDenied { .. } => false,
            Self::CapabilityMissing { .. } => false,
            Self::InvalidSelector { .. } => false,
            Self::ConnectionFailed { .. } => true,
            Self::HandleClosed => false,
            Self::Rejected { .. } => false,
            Self::Validation(_) => false,
        }
    }
}

/// Validation errors for domain identifiers
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}
