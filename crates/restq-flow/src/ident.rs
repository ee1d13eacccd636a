//! Flow-layer identifiers.
//!
//! Both identifiers here are caller-visible: a [`FlowId`] is derived from the
//! correlation id of the request that created the flow, and a [`MessageRef`]
//! is the correlation id under which a caller addresses one pulled message.
//! The transport guarantees correlation ids are unique per request; the flow
//! layer treats reuse as a contract violation, not something to tolerate.

use restq_broker::ValidationError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[cfg(test)]
#[path = "ident_tests.rs"]
mod tests;

fn validate_opaque_id(field: &str, id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if id.len() > 128 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            message: "maximum 128 characters".to_string(),
        });
    }
    if !id.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            message: "only ASCII printable characters allowed".to_string(),
        });
    }
    Ok(())
}

/// Identifier of one flow, derived from the correlation id of the bind
/// request so the caller can reference the flow in later requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowId(String);

impl FlowId {
    /// Derive a flow id from a caller-visible correlation id
    pub fn derive(correlation_id: &str) -> Result<Self, ValidationError> {
        validate_opaque_id("flow_id", correlation_id)?;
        Ok(Self(correlation_id.to_string()))
    }

    /// Get flow id as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FlowId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::derive(s)
    }
}

/// Caller-supplied reference under which one retrieved message is tracked
/// until it is acknowledged (or deleted, for browse flows).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef(String);

impl MessageRef {
    /// Create a message reference with validation
    pub fn new(id: String) -> Result<Self, ValidationError> {
        validate_opaque_id("message_ref", &id)?;
        Ok(Self(id))
    }

    /// Get reference as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}
