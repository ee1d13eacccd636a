//! Message types and core domain identifiers for broker operations.

use crate::error::ValidationError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name with length and character restrictions.
///
/// Queues are external resources; this type only guards the identifier that
/// is passed through to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > 260 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-260 characters".to_string(),
            });
        }

        // ASCII alphanumeric, hyphens, underscores, dots (broker queue names
        // commonly use dotted hierarchies)
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, underscores, and dots allowed"
                    .to_string(),
            });
        }

        if name.starts_with('-') || name.ends_with('-') {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "no leading or trailing hyphens".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Broker-assigned identifier for a message held on a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// ============================================================================
// Selector
// ============================================================================

/// Filter expression restricting which messages a consumer or browser sees.
///
/// The supported grammar is a single attribute equality test:
/// `attribute = 'value'`. Attribute names follow identifier rules; the value
/// is a single-quoted string. Expressions are parsed once when the handle is
/// opened, so a malformed expression is rejected before any broker state is
/// created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    attribute: String,
    value: String,
}

impl Selector {
    /// Parse a selector expression of the form `attr = 'value'`.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::InvalidSelector` if the expression does not
    /// match the supported grammar.
    pub fn parse(expression: &str) -> Result<Self, crate::error::BrokerError> {
        let invalid = |message: &str| crate::error::BrokerError::InvalidSelector {
            expression: expression.to_string(),
            message: message.to_string(),
        };

        let (lhs, rhs) = expression
            .split_once('=')
            .ok_or_else(|| invalid("expected `attribute = 'value'`"))?;

        let attribute = lhs.trim();
        if attribute.is_empty()
            || !attribute
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid("attribute must be a plain identifier"));
        }

        let rhs = rhs.trim();
        let value = rhs
            .strip_prefix('\'')
            .and_then(|v| v.strip_suffix('\''))
            .ok_or_else(|| invalid("value must be single-quoted"))?;
        if value.contains('\'') {
            return Err(invalid("value must not contain embedded quotes"));
        }

        Ok(Self {
            attribute: attribute.to_string(),
            value: value.to_string(),
        })
    }

    /// Get the attribute name this selector tests.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Check whether a message's attributes satisfy this selector.
    pub fn matches(&self, attributes: &HashMap<String, String>) -> bool {
        attributes.get(&self.attribute) == Some(&self.value)
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = '{}'", self.attribute, self.value)
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message to be placed on a queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(with = "bytes_serde")]
    pub body: Bytes,
    pub attributes: HashMap<String, String>,
    pub correlation_id: Option<String>,
}

/// Custom serialization for Bytes
mod bytes_serde {
    use base64::{engine::general_purpose, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = general_purpose::STANDARD.encode(bytes);
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        Ok(Bytes::from(decoded))
    }
}

impl Message {
    /// Create new message with body
    pub fn new(body: Bytes) -> Self {
        Self {
            body,
            attributes: HashMap::new(),
            correlation_id: None,
        }
    }

    /// Add message attribute
    pub fn with_attribute(mut self, key: String, value: String) -> Self {
        self.attributes.insert(key, value);
        self
    }

    /// Add correlation ID for tracking
    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// A message delivered by the broker with processing metadata.
///
/// The embedded [`Receipt`] is the only thing a consumer needs to hand back
/// for acknowledgment, and the only thing a browser needs for deletion.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: Bytes,
    pub attributes: HashMap<String, String>,
    pub correlation_id: Option<String>,
    pub receipt: Receipt,
    pub delivery_count: u32,
    pub enqueued_at: Timestamp,
    pub delivered_at: Timestamp,
}

impl ReceivedMessage {
    /// Convert back to a sendable Message (for forwarding or replaying)
    pub fn message(&self) -> Message {
        Message {
            body: self.body.clone(),
            attributes: self.attributes.clone(),
            correlation_id: self.correlation_id.clone(),
        }
    }
}

/// Opaque token identifying one delivery of one message on one queue.
///
/// Receipts are minted by the broker at delivery time and are only meaningful
/// to the handle that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    queue_name: QueueName,
    sequence: u64,
}

impl Receipt {
    /// Create new receipt
    pub fn new(queue_name: QueueName, sequence: u64) -> Self {
        Self {
            queue_name,
            sequence,
        }
    }

    /// Get the queue this receipt belongs to
    pub fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }

    /// Get the broker sequence number of the delivery
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}
