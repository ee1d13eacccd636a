//! Client traits for broker consumers and browsers.
//!
//! These traits are the boundary between the flow lifecycle layer and a
//! concrete message broker. A [`BrokerClient`] mints handles; each handle
//! exclusively owns one broker-side binding and is released with an
//! idempotent `close`.
//!
//! Consumers always run in manual acknowledgment mode: a received message
//! stays on the broker until its [`Receipt`] is acknowledged, and messages
//! still outstanding when the handle closes become redeliverable.

use crate::error::BrokerError;
use crate::message::{QueueName, Receipt, ReceivedMessage, Selector};
use async_trait::async_trait;
use std::time::Duration;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Settings for opening a consumer binding.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Maximum number of unacknowledged deliveries outstanding at once.
    /// A window of 1 gives deterministic one-message-at-a-time polling.
    pub window_size: u32,
    /// Optional filter restricting which messages this consumer receives.
    pub selector: Option<Selector>,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            window_size: 1,
            selector: None,
        }
    }
}

impl ConsumerSettings {
    /// Create settings with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delivery window size
    pub fn with_window_size(mut self, window_size: u32) -> Self {
        self.window_size = window_size;
        self
    }

    /// Set the message selector
    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }
}

/// Settings for opening a browser binding.
#[derive(Debug, Clone, Default)]
pub struct BrowserSettings {
    /// Optional filter restricting which messages this browser sees.
    pub selector: Option<Selector>,
}

impl BrowserSettings {
    /// Create settings with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the message selector
    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }
}

/// Entry point for opening broker-side bindings
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Open a consuming binding to a queue (manual acknowledgment mode)
    async fn open_consumer(
        &self,
        queue: &QueueName,
        settings: ConsumerSettings,
    ) -> Result<Box<dyn ConsumerHandle>, BrokerError>;

    /// Open a non-destructive browsing binding to a queue
    async fn open_browser(
        &self,
        queue: &QueueName,
        settings: BrowserSettings,
    ) -> Result<Box<dyn BrowserHandle>, BrokerError>;
}

/// Exclusive handle for consuming messages from one queue
#[async_trait]
pub trait ConsumerHandle: Send + Sync {
    /// Receive the next message, waiting at most `bounded_wait`.
    ///
    /// Returns `Ok(None)` when no message became available within the wait;
    /// this is an expected outcome, not an error.
    async fn receive(
        &self,
        bounded_wait: Duration,
    ) -> Result<Option<ReceivedMessage>, BrokerError>;

    /// Acknowledge one delivered message, removing it from the queue
    async fn ack(&self, receipt: &Receipt) -> Result<(), BrokerError>;

    /// Close the binding. Idempotent; outstanding unacknowledged messages
    /// become redeliverable.
    async fn close(&self);
}

/// Handle for browsing messages on one queue without consuming them
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Return the next not-yet-browsed message, waiting at most
    /// `bounded_wait`. The message stays on the queue.
    async fn browse_next(
        &self,
        bounded_wait: Duration,
    ) -> Result<Option<ReceivedMessage>, BrokerError>;

    /// Delete one browsed message from the queue. This is the only mutation
    /// a browser can perform.
    async fn remove(&self, receipt: &Receipt) -> Result<(), BrokerError>;

    /// Close the binding. Idempotent.
    async fn close(&self);
}
