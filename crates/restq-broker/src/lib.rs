//! # restq broker
//!
//! Broker client boundary for the restq flow lifecycle layer.
//!
//! This library provides:
//! - Broker-agnostic consumer and browser traits with manual acknowledgment
//! - Message types, receipts, and validated domain identifiers
//! - Selector expressions for filtered consumption
//! - A fully functional in-memory broker for tests and development
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all broker operations
//! - [`message`] - Message structures, receipts, and identifiers
//! - [`client`] - Consumer and browser traits
//! - [`providers`] - Broker implementations

// Module declarations
pub mod client;
pub mod error;
pub mod message;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use client::{
    BrokerClient, BrowserHandle, BrowserSettings, ConsumerHandle, ConsumerSettings,
};
pub use error::{BrokerError, ValidationError};
pub use message::{
    Message, MessageId, QueueName, Receipt, ReceivedMessage, Selector, Timestamp,
};
pub use providers::InMemoryBroker;
