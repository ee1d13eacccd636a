//! In-memory broker implementation for testing and development.
//!
//! This module provides a fully functional in-memory broker that:
//! - Keeps per-queue FIFO message storage
//! - Enforces the consumer delivery window (at most `window_size`
//!   unacknowledged deliveries outstanding per consumer)
//! - Supports bounded-wait receive via `tokio::sync::Notify`
//! - Requeues unacknowledged in-flight messages when a consumer closes
//! - Implements a non-destructive browse cursor with explicit deletion
//!
//! This broker is intended for:
//! - Unit testing of the flow lifecycle layer
//! - Development and prototyping without a real broker

use crate::client::{BrokerClient, BrowserHandle, BrowserSettings, ConsumerHandle, ConsumerSettings};
use crate::error::BrokerError;
use crate::message::{Message, MessageId, QueueName, Receipt, ReceivedMessage, Selector, Timestamp};
use async_trait::async_trait;
use std::collections::HashMap;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
struct BrokerState {
    queues: HashMap<QueueName, QueueState>,
}

/// State of a single queue
struct QueueState {
    /// Messages available for delivery, ordered by sequence
    ready: Vec<StoredMessage>,
    /// Deliveries outstanding to a consumer, keyed by sequence
    in_flight: HashMap<u64, InFlightMessage>,
    /// Next delivery sequence number
    next_sequence: u64,
    /// Wakes receivers when a message arrives or the window frees up
    notify: Arc<Notify>,
    /// Simulates broker-side access control for tests
    access_denied: bool,
}

impl QueueState {
    fn new() -> Self {
        Self {
            ready: Vec::new(),
            in_flight: HashMap::new(),
            next_sequence: 0,
            notify: Arc::new(Notify::new()),
            access_denied: false,
        }
    }
}

/// A message held on a queue with delivery metadata
#[derive(Clone)]
struct StoredMessage {
    sequence: u64,
    message_id: MessageId,
    message: Message,
    enqueued_at: Timestamp,
    delivery_count: u32,
}

impl StoredMessage {
    fn to_received(&self, queue_name: &QueueName) -> ReceivedMessage {
        ReceivedMessage {
            message_id: self.message_id.clone(),
            body: self.message.body.clone(),
            attributes: self.message.attributes.clone(),
            correlation_id: self.message.correlation_id.clone(),
            receipt: Receipt::new(queue_name.clone(), self.sequence),
            delivery_count: self.delivery_count,
            enqueued_at: self.enqueued_at.clone(),
            delivered_at: Timestamp::now(),
        }
    }

    fn matches(&self, selector: &Option<Selector>) -> bool {
        match selector {
            Some(s) => s.matches(&self.message.attributes),
            None => true,
        }
    }
}

/// A delivery outstanding to a specific consumer
struct InFlightMessage {
    consumer_id: u64,
    message: StoredMessage,
}

// ============================================================================
// InMemoryBroker
// ============================================================================

/// In-memory broker implementation
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    next_consumer_id: AtomicU64,
}

impl InMemoryBroker {
    /// Create new empty in-memory broker
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                queues: HashMap::new(),
            })),
            next_consumer_id: AtomicU64::new(1),
        }
    }

    /// Create a queue if it does not already exist
    pub async fn create_queue(&self, queue: &QueueName) {
        let mut state = self.state.lock().await;
        state
            .queues
            .entry(queue.clone())
            .or_insert_with(QueueState::new);
    }

    /// Mark a queue as access-denied so `open_consumer`/`open_browser` fail.
    /// The queue is created if absent.
    pub async fn deny_access(&self, queue: &QueueName) {
        let mut state = self.state.lock().await;
        state
            .queues
            .entry(queue.clone())
            .or_insert_with(QueueState::new)
            .access_denied = true;
    }

    /// Place a message on a queue, creating the queue if absent
    pub async fn publish(&self, queue: &QueueName, message: Message) -> MessageId {
        let mut state = self.state.lock().await;
        let queue_state = state
            .queues
            .entry(queue.clone())
            .or_insert_with(QueueState::new);

        let message_id = MessageId::new();
        let sequence = queue_state.next_sequence;
        queue_state.next_sequence += 1;
        queue_state.ready.push(StoredMessage {
            sequence,
            message_id: message_id.clone(),
            message,
            enqueued_at: Timestamp::now(),
            delivery_count: 0,
        });
        queue_state.notify.notify_waiters();
        debug!(queue = %queue, message_id = %message_id, "published message");
        message_id
    }

    /// Number of messages currently available on a queue
    pub async fn queue_depth(&self, queue: &QueueName) -> Option<usize> {
        let state = self.state.lock().await;
        state.queues.get(queue).map(|q| q.ready.len())
    }

    fn allocate_consumer_id(&self) -> u64 {
        self.next_consumer_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn open_consumer(
        &self,
        queue: &QueueName,
        settings: ConsumerSettings,
    ) -> Result<Box<dyn ConsumerHandle>, BrokerError> {
        let state = self.state.lock().await;
        let queue_state = state
            .queues
            .get(queue)
            .ok_or_else(|| BrokerError::QueueNotFound {
                queue_name: queue.to_string(),
            })?;
        if queue_state.access_denied {
            return Err(BrokerError::AccessDenied {
                queue_name: queue.to_string(),
            });
        }
        drop(state);

        Ok(Box::new(InMemoryConsumer {
            state: Arc::clone(&self.state),
            queue_name: queue.clone(),
            consumer_id: self.allocate_consumer_id(),
            window_size: settings.window_size,
            selector: settings.selector,
            closed: AtomicBool::new(false),
        }))
    }

    async fn open_browser(
        &self,
        queue: &QueueName,
        settings: BrowserSettings,
    ) -> Result<Box<dyn BrowserHandle>, BrokerError> {
        let state = self.state.lock().await;
        let queue_state = state
            .queues
            .get(queue)
            .ok_or_else(|| BrokerError::QueueNotFound {
                queue_name: queue.to_string(),
            })?;
        if queue_state.access_denied {
            return Err(BrokerError::AccessDenied {
                queue_name: queue.to_string(),
            });
        }
        drop(state);

        Ok(Box::new(InMemoryBrowser {
            state: Arc::clone(&self.state),
            queue_name: queue.clone(),
            selector: settings.selector,
            cursor: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }))
    }
}

// ============================================================================
// InMemoryConsumer
// ============================================================================

/// Consumer handle over the shared broker state
struct InMemoryConsumer {
    state: Arc<Mutex<BrokerState>>,
    queue_name: QueueName,
    consumer_id: u64,
    window_size: u32,
    selector: Option<Selector>,
    closed: AtomicBool,
}

impl InMemoryConsumer {
    /// Deliver one message if the window has room and a match is ready.
    /// Returns the notify handle alongside so callers can wait for changes.
    async fn try_deliver(
        &self,
    ) -> Result<(Option<ReceivedMessage>, Arc<Notify>), BrokerError> {
        let mut state = self.state.lock().await;
        let queue_state = state
            .queues
            .get_mut(&self.queue_name)
            .ok_or_else(|| BrokerError::QueueNotFound {
                queue_name: self.queue_name.to_string(),
            })?;
        let notify = Arc::clone(&queue_state.notify);

        let outstanding = queue_state
            .in_flight
            .values()
            .filter(|m| m.consumer_id == self.consumer_id)
            .count();
        if outstanding >= self.window_size as usize {
            return Ok((None, notify));
        }

        let position = queue_state
            .ready
            .iter()
            .position(|m| m.matches(&self.selector));
        let Some(position) = position else {
            return Ok((None, notify));
        };

        let mut stored = queue_state.ready.remove(position);
        stored.delivery_count += 1;
        let received = stored.to_received(&self.queue_name);
        queue_state.in_flight.insert(
            stored.sequence,
            InFlightMessage {
                consumer_id: self.consumer_id,
                message: stored,
            },
        );
        Ok((Some(received), notify))
    }
}

#[async_trait]
impl ConsumerHandle for InMemoryConsumer {
    async fn receive(
        &self,
        bounded_wait: Duration,
    ) -> Result<Option<ReceivedMessage>, BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::HandleClosed);
        }

        let deadline = Instant::now() + bounded_wait;
        loop {
            let (delivered, notify) = self.try_deliver().await?;
            if let Some(message) = delivered {
                return Ok(Some(message));
            }

            // Register interest before re-checking so a publish between the
            // check and the wait cannot be missed.
            let mut notified = pin!(notify.notified());
            notified.as_mut().enable();
            let (delivered, _) = self.try_deliver().await?;
            if let Some(message) = delivered {
                return Ok(Some(message));
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }

            if self.closed.load(Ordering::SeqCst) {
                return Err(BrokerError::HandleClosed);
            }
        }
    }

    async fn ack(&self, receipt: &Receipt) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::HandleClosed);
        }

        let mut state = self.state.lock().await;
        let queue_state = state
            .queues
            .get_mut(&self.queue_name)
            .ok_or_else(|| BrokerError::QueueNotFound {
                queue_name: self.queue_name.to_string(),
            })?;

        let owned = queue_state
            .in_flight
            .get(&receipt.sequence())
            .map(|m| m.consumer_id == self.consumer_id)
            .unwrap_or(false);
        if !owned {
            return Err(BrokerError::Rejected {
                code: 400,
                reason: "unknown or expired receipt".to_string(),
            });
        }

        queue_state.in_flight.remove(&receipt.sequence());
        // The window freed up; wake any waiting receive.
        queue_state.notify.notify_waiters();
        debug!(queue = %self.queue_name, sequence = receipt.sequence(), "acknowledged message");
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut state = self.state.lock().await;
        if let Some(queue_state) = state.queues.get_mut(&self.queue_name) {
            // Requeue this consumer's unacknowledged deliveries at their
            // original positions.
            let mine: Vec<u64> = queue_state
                .in_flight
                .iter()
                .filter(|(_, m)| m.consumer_id == self.consumer_id)
                .map(|(sequence, _)| *sequence)
                .collect();
            for sequence in mine {
                if let Some(in_flight) = queue_state.in_flight.remove(&sequence) {
                    queue_state.ready.push(in_flight.message);
                }
            }
            queue_state.ready.sort_by_key(|m| m.sequence);
            queue_state.notify.notify_waiters();
        }
        debug!(queue = %self.queue_name, consumer_id = self.consumer_id, "consumer closed");
    }
}

// ============================================================================
// InMemoryBrowser
// ============================================================================

/// Browser handle over the shared broker state.
///
/// The cursor records the highest sequence already handed out, so repeated
/// `browse_next` calls walk the queue without consuming it.
struct InMemoryBrowser {
    state: Arc<Mutex<BrokerState>>,
    queue_name: QueueName,
    selector: Option<Selector>,
    cursor: AtomicU64,
    closed: AtomicBool,
}

impl InMemoryBrowser {
    async fn try_browse(
        &self,
    ) -> Result<(Option<ReceivedMessage>, Arc<Notify>), BrokerError> {
        let mut state = self.state.lock().await;
        let queue_state = state
            .queues
            .get_mut(&self.queue_name)
            .ok_or_else(|| BrokerError::QueueNotFound {
                queue_name: self.queue_name.to_string(),
            })?;
        let notify = Arc::clone(&queue_state.notify);

        let cursor = self.cursor.load(Ordering::SeqCst);
        let next = queue_state
            .ready
            .iter()
            .find(|m| m.sequence >= cursor && m.matches(&self.selector));
        match next {
            Some(stored) => {
                self.cursor.store(stored.sequence + 1, Ordering::SeqCst);
                Ok((Some(stored.to_received(&self.queue_name)), notify))
            }
            None => Ok((None, notify)),
        }
    }
}

#[async_trait]
impl BrowserHandle for InMemoryBrowser {
    async fn browse_next(
        &self,
        bounded_wait: Duration,
    ) -> Result<Option<ReceivedMessage>, BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::HandleClosed);
        }

        let deadline = Instant::now() + bounded_wait;
        loop {
            let (browsed, notify) = self.try_browse().await?;
            if let Some(message) = browsed {
                return Ok(Some(message));
            }

            let mut notified = pin!(notify.notified());
            notified.as_mut().enable();
            let (browsed, _) = self.try_browse().await?;
            if let Some(message) = browsed {
                return Ok(Some(message));
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }

            if self.closed.load(Ordering::SeqCst) {
                return Err(BrokerError::HandleClosed);
            }
        }
    }

    async fn remove(&self, receipt: &Receipt) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::HandleClosed);
        }

        let mut state = self.state.lock().await;
        let queue_state = state
            .queues
            .get_mut(&self.queue_name)
            .ok_or_else(|| BrokerError::QueueNotFound {
                queue_name: self.queue_name.to_string(),
            })?;

        let position = queue_state
            .ready
            .iter()
            .position(|m| m.sequence == receipt.sequence());
        match position {
            Some(position) => {
                queue_state.ready.remove(position);
                debug!(queue = %self.queue_name, sequence = receipt.sequence(), "removed message");
                Ok(())
            }
            None => Err(BrokerError::Rejected {
                code: 400,
                reason: "message no longer available".to_string(),
            }),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        debug!(queue = %self.queue_name, "browser closed");
    }
}
