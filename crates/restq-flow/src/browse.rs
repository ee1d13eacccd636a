//! Browse flow: non-destructive iteration over a queue's contents.
//!
//! A browse flow mirrors the consumer flow's read path against a `seen`
//! registry, but never consumes messages. The single mutation it can perform
//! is explicit deletion, and only when opened in [`BrowseMode::ReadDelete`];
//! deletion is deliberately a distinct operation from acknowledgment because
//! browsing is, by default, read-only. Browse flows have their own inactivity
//! window, independently configured and typically shorter than a consumer
//! flow's.

use crate::error::FlowError;
use crate::flow::EvictionHook;
use crate::ident::{FlowId, MessageRef};
use crate::scheduler::{TimeoutScheduler, TimerGeneration};
use restq_broker::{BrowserHandle, QueueName, ReceivedMessage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[cfg(test)]
#[path = "browse_tests.rs"]
mod tests;

/// What a browse flow is allowed to do to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrowseMode {
    /// Inspect only; `delete` is rejected
    ReadOnly,
    /// Inspect plus explicit per-message deletion
    ReadDelete,
}

enum BrowseState {
    Bound {
        browser: Box<dyn BrowserHandle>,
        seen: HashMap<MessageRef, ReceivedMessage>,
    },
    Closed,
}

/// One active browse binding to a queue
pub struct BrowseFlow {
    flow_id: FlowId,
    queue_name: QueueName,
    mode: BrowseMode,
    scheduler: Arc<TimeoutScheduler>,
    inactivity_timeout: Duration,
    receive_wait: Duration,
    timer: TimerGeneration,
    on_evict: EvictionHook,
    state: Mutex<BrowseState>,
}

impl BrowseFlow {
    /// Create a browse flow over an already-opened browser handle.
    /// The inactivity timer is armed by the registry after insertion.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        flow_id: FlowId,
        queue_name: QueueName,
        mode: BrowseMode,
        browser: Box<dyn BrowserHandle>,
        scheduler: Arc<TimeoutScheduler>,
        inactivity_timeout: Duration,
        receive_wait: Duration,
        on_evict: EvictionHook,
    ) -> Self {
        Self {
            flow_id,
            queue_name,
            mode,
            scheduler,
            inactivity_timeout,
            receive_wait,
            timer: TimerGeneration::new(),
            on_evict,
            state: Mutex::new(BrowseState::Bound {
                browser,
                seen: HashMap::new(),
            }),
        }
    }

    /// Get the flow id
    pub fn flow_id(&self) -> &FlowId {
        &self.flow_id
    }

    /// Get the bound queue name
    pub fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }

    /// Get the browse mode
    pub fn mode(&self) -> BrowseMode {
        self.mode
    }

    /// Timer slot for this flow's eviction and retention scheduling
    pub fn timer_generation(&self) -> &TimerGeneration {
        &self.timer
    }

    pub(crate) fn restart_timer(&self) {
        let hook = Arc::clone(&self.on_evict);
        self.scheduler
            .arm(&self.timer, self.inactivity_timeout, move |version| {
                hook(version)
            });
    }

    fn closed_error(&self) -> FlowError {
        FlowError::Closed {
            flow_id: self.flow_id.to_string(),
        }
    }

    /// Hand out the next not-yet-browsed message and track it under
    /// `message_ref`. The message stays on the queue.
    pub async fn browse_next(
        &self,
        message_ref: &MessageRef,
    ) -> Result<Option<ReceivedMessage>, FlowError> {
        let mut state = self.state.lock().await;
        let BrowseState::Bound { browser, seen } = &mut *state else {
            return Err(self.closed_error());
        };

        if seen.contains_key(message_ref) {
            return Err(FlowError::PreconditionViolated {
                message: format!("message ref '{message_ref}' already tracked"),
            });
        }

        self.restart_timer();
        let browsed = browser.browse_next(self.receive_wait).await?;
        if let Some(ref message) = browsed {
            seen.insert(message_ref.clone(), message.clone());
            debug!(
                flow_id = %self.flow_id,
                message_ref = %message_ref,
                seen = seen.len(),
                "browsed message"
            );
        }
        Ok(browsed)
    }

    /// Look up a previously browsed message. Does not remove the entry.
    pub async fn get_seen(&self, message_ref: &MessageRef) -> Result<ReceivedMessage, FlowError> {
        let mut state = self.state.lock().await;
        let BrowseState::Bound { seen, .. } = &mut *state else {
            return Err(self.closed_error());
        };

        self.restart_timer();
        seen.get(message_ref)
            .cloned()
            .ok_or_else(|| FlowError::UnknownMessageRef {
                message_ref: message_ref.to_string(),
            })
    }

    /// Check whether a message ref has been handed out by this flow
    pub async fn is_seen(&self, message_ref: &MessageRef) -> Result<bool, FlowError> {
        let mut state = self.state.lock().await;
        let BrowseState::Bound { seen, .. } = &mut *state else {
            return Err(self.closed_error());
        };

        self.restart_timer();
        Ok(seen.contains_key(message_ref))
    }

    /// List all seen message refs
    pub async fn seen_refs(&self) -> Result<Vec<MessageRef>, FlowError> {
        let mut state = self.state.lock().await;
        let BrowseState::Bound { seen, .. } = &mut *state else {
            return Err(self.closed_error());
        };

        self.restart_timer();
        Ok(seen.keys().cloned().collect())
    }

    /// Delete one browsed message from the queue. Only permitted in
    /// [`BrowseMode::ReadDelete`]; the only way a browse flow mutates the
    /// queue.
    pub async fn delete(&self, message_ref: &MessageRef) -> Result<(), FlowError> {
        let mut state = self.state.lock().await;
        let BrowseState::Bound { browser, seen } = &mut *state else {
            return Err(self.closed_error());
        };

        if self.mode == BrowseMode::ReadOnly {
            return Err(FlowError::ReadOnlyFlow {
                flow_id: self.flow_id.to_string(),
            });
        }

        self.restart_timer();
        let message = seen
            .get(message_ref)
            .ok_or_else(|| FlowError::UnknownMessageRef {
                message_ref: message_ref.to_string(),
            })?;
        browser.remove(&message.receipt).await?;
        seen.remove(message_ref);
        debug!(flow_id = %self.flow_id, message_ref = %message_ref, "deleted message");
        Ok(())
    }

    /// Heartbeat: reset the inactivity timer
    pub async fn keepalive(&self) -> Result<(), FlowError> {
        let mut state = self.state.lock().await;
        let BrowseState::Bound { .. } = &mut *state else {
            return Err(self.closed_error());
        };

        self.restart_timer();
        Ok(())
    }

    /// Whether this flow has been closed
    pub async fn is_closed(&self) -> bool {
        matches!(*self.state.lock().await, BrowseState::Closed)
    }

    /// Close the flow: disarm the timer and release the browser handle.
    /// Idempotent; the handle is released exactly once.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, BrowseState::Closed) {
            BrowseState::Bound { browser, seen } => {
                self.scheduler.disarm(&self.timer);
                drop(seen);
                browser.close().await;
                info!(flow_id = %self.flow_id, queue = %self.queue_name, "browse flow closed");
            }
            BrowseState::Closed => {}
        }
    }

    /// Eviction path: close only if the armed timer version is still current
    /// (checked under the flow's lock). Returns whether this call closed the
    /// flow.
    pub(crate) async fn close_if_stale(&self, version: u64) -> bool {
        let mut state = self.state.lock().await;
        if !self.timer.is_current(version) {
            return false;
        }
        match std::mem::replace(&mut *state, BrowseState::Closed) {
            BrowseState::Bound { browser, seen } => {
                drop(seen);
                browser.close().await;
                true
            }
            BrowseState::Closed => false,
        }
    }
}
