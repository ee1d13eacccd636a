//! Consumer flow: single-queue pull-based consumption with caller-addressable
//! unacknowledged-message tracking and its own inactivity lifecycle.
//!
//! A flow exclusively owns its broker consumer handle and releases it exactly
//! once, whether it is closed explicitly, by the inactivity timer, or at
//! process shutdown. Once closed a flow is permanently inert: every further
//! operation reports `Closed`, never a low-level broker fault. A new binding
//! is always a new flow with a new id.

use crate::error::FlowError;
use crate::ident::{FlowId, MessageRef};
use crate::scheduler::{TimeoutScheduler, TimerGeneration};
use restq_broker::{ConsumerHandle, QueueName, ReceivedMessage};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[cfg(test)]
#[path = "flow_tests.rs"]
mod tests;

/// Boxed eviction job produced when the inactivity timer fires
pub type EvictionJob = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Hook invoked by the inactivity timer with the armed timer version.
///
/// The hook body is responsible for the final version check under the flow's
/// lock (see [`ConsumerFlow::close_if_stale`]).
pub type EvictionHook = Arc<dyn Fn(u64) -> EvictionJob + Send + Sync>;

/// A no-op eviction hook, for flows managed outside a registry
pub fn noop_eviction() -> EvictionHook {
    Arc::new(|_version| {
        let job: EvictionJob = Box::pin(async {});
        job
    })
}

enum FlowState {
    Bound {
        consumer: Box<dyn ConsumerHandle>,
        unacked: HashMap<MessageRef, ReceivedMessage>,
    },
    Closed,
}

/// One active consumption binding to a queue
pub struct ConsumerFlow {
    flow_id: FlowId,
    queue_name: QueueName,
    scheduler: Arc<TimeoutScheduler>,
    inactivity_timeout: Duration,
    receive_wait: Duration,
    timer: TimerGeneration,
    on_evict: EvictionHook,
    state: Mutex<FlowState>,
}

impl ConsumerFlow {
    /// Create a flow over an already-opened consumer handle.
    ///
    /// The inactivity timer is not armed here; callers arm it with
    /// [`ConsumerFlow::restart_timer`] once the flow is registered, so the
    /// eviction hook never fires for a flow that is not yet looked up-able.
    pub fn new(
        flow_id: FlowId,
        queue_name: QueueName,
        consumer: Box<dyn ConsumerHandle>,
        scheduler: Arc<TimeoutScheduler>,
        inactivity_timeout: Duration,
        receive_wait: Duration,
        on_evict: EvictionHook,
    ) -> Self {
        Self {
            flow_id,
            queue_name,
            scheduler,
            inactivity_timeout,
            receive_wait,
            timer: TimerGeneration::new(),
            on_evict,
            state: Mutex::new(FlowState::Bound {
                consumer,
                unacked: HashMap::new(),
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

    /// Timer slot for this flow's eviction and retention scheduling
    pub fn timer_generation(&self) -> &TimerGeneration {
        &self.timer
    }

    /// Re-arm the inactivity timer. Called on every successful operation.
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

    /// Pull the next message off the queue and track it under `message_ref`.
    ///
    /// The inactivity timer is reset before the pull is attempted. Returns
    /// `Ok(None)` when nothing was available within the bounded receive
    /// wait; that is a valid, expected outcome.
    ///
    /// # Errors
    ///
    /// `PreconditionViolated` if `message_ref` is already tracked: the
    /// transport guarantees per-request-unique correlation ids, so a reused
    /// ref is a caller contract breach and is never silently overwritten.
    pub async fn pull_next(
        &self,
        message_ref: &MessageRef,
    ) -> Result<Option<ReceivedMessage>, FlowError> {
        let mut state = self.state.lock().await;
        let FlowState::Bound { consumer, unacked } = &mut *state else {
            return Err(self.closed_error());
        };

        if unacked.contains_key(message_ref) {
            return Err(FlowError::PreconditionViolated {
                message: format!("message ref '{message_ref}' already tracked"),
            });
        }

        self.restart_timer();
        let received = consumer.receive(self.receive_wait).await?;
        if let Some(ref message) = received {
            unacked.insert(message_ref.clone(), message.clone());
            debug!(
                flow_id = %self.flow_id,
                message_ref = %message_ref,
                outstanding = unacked.len(),
                "pulled message"
            );
        }
        Ok(received)
    }

    /// Look up a previously pulled, still-unacknowledged message.
    /// Does not remove the entry.
    pub async fn get_unacked(
        &self,
        message_ref: &MessageRef,
    ) -> Result<ReceivedMessage, FlowError> {
        let mut state = self.state.lock().await;
        let FlowState::Bound { unacked, .. } = &mut *state else {
            return Err(self.closed_error());
        };

        self.restart_timer();
        unacked
            .get(message_ref)
            .cloned()
            .ok_or_else(|| FlowError::UnknownMessageRef {
                message_ref: message_ref.to_string(),
            })
    }

    /// Check whether a message ref is currently tracked. Any touch counts as
    /// activity, which keeps the flow alive for a slow-polling caller.
    pub async fn is_tracked(&self, message_ref: &MessageRef) -> Result<bool, FlowError> {
        let mut state = self.state.lock().await;
        let FlowState::Bound { unacked, .. } = &mut *state else {
            return Err(self.closed_error());
        };

        self.restart_timer();
        Ok(unacked.contains_key(message_ref))
    }

    /// List all tracked message refs
    pub async fn tracked_refs(&self) -> Result<Vec<MessageRef>, FlowError> {
        let mut state = self.state.lock().await;
        let FlowState::Bound { unacked, .. } = &mut *state else {
            return Err(self.closed_error());
        };

        self.restart_timer();
        Ok(unacked.keys().cloned().collect())
    }

    /// Acknowledge one tracked message through the broker and stop tracking
    /// it. The only success path that removes a single entry.
    pub async fn acknowledge(&self, message_ref: &MessageRef) -> Result<(), FlowError> {
        let mut state = self.state.lock().await;
        let FlowState::Bound { consumer, unacked } = &mut *state else {
            return Err(self.closed_error());
        };

        self.restart_timer();
        let message = unacked
            .get(message_ref)
            .ok_or_else(|| FlowError::UnknownMessageRef {
                message_ref: message_ref.to_string(),
            })?;
        consumer.ack(&message.receipt).await?;
        unacked.remove(message_ref);
        debug!(flow_id = %self.flow_id, message_ref = %message_ref, "acknowledged message");
        Ok(())
    }

    /// Heartbeat: reset the inactivity timer without touching any message
    pub async fn keepalive(&self) -> Result<(), FlowError> {
        let mut state = self.state.lock().await;
        let FlowState::Bound { .. } = &mut *state else {
            return Err(self.closed_error());
        };

        self.restart_timer();
        Ok(())
    }

    /// Whether this flow has been closed
    pub async fn is_closed(&self) -> bool {
        matches!(*self.state.lock().await, FlowState::Closed)
    }

    /// Close the flow: disarm the timer and release the broker handle.
    /// Idempotent; the handle is released exactly once.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, FlowState::Closed) {
            FlowState::Bound { consumer, unacked } => {
                self.scheduler.disarm(&self.timer);
                drop(unacked);
                consumer.close().await;
                info!(flow_id = %self.flow_id, queue = %self.queue_name, "flow closed");
            }
            FlowState::Closed => {}
        }
    }

    /// Close the flow if the armed timer version is still current.
    ///
    /// This is the eviction path: the version check happens under the flow's
    /// lock, so a timer that fired concurrently with an activity reset (or
    /// with an explicit close) reliably no-ops. Returns whether the flow was
    /// closed by this call.
    pub(crate) async fn close_if_stale(&self, version: u64) -> bool {
        let mut state = self.state.lock().await;
        if !self.timer.is_current(version) {
            return false;
        }
        match std::mem::replace(&mut *state, FlowState::Closed) {
            FlowState::Bound { consumer, unacked } => {
                drop(unacked);
                consumer.close().await;
                true
            }
            FlowState::Closed => false,
        }
    }
}
