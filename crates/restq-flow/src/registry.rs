//! Flow registries: the single source of truth for queue↔flow bindings.
//!
//! Each registry owns one authoritative map from flow id to flow, plus a
//! secondary index from queue name to flow id, mutated together as one atomic
//! step under the registry mutex. That mutex guards only map access and is
//! never held across a broker call. Binding opens the broker handle first and
//! then performs check-and-insert as one critical section, so exactly one of
//! two concurrent binds for the same queue succeeds; the loser's fresh handle
//! is closed before `AlreadyBound` is returned and no partial state remains.
//!
//! Teardown policy: closing a flow (explicit unbind, inactivity eviction, or
//! shutdown) removes the queue binding immediately, so the queue is
//! rebindable at once, while the flow-id entry is retained in `Closed` state
//! for a bounded grace period so stale callers get a precise "closed" reply
//! instead of "unknown flow". A purge scheduled on the flow's own timer slot
//! removes the entry when the grace period ends.

use crate::browse::{BrowseFlow, BrowseMode};
use crate::config::FlowSettings;
use crate::error::FlowError;
use crate::flow::{ConsumerFlow, EvictionHook};
use crate::ident::FlowId;
use crate::scheduler::TimeoutScheduler;
use restq_broker::{BrokerClient, BrowserSettings, ConsumerSettings, QueueName, Selector};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

// ============================================================================
// Session Table
// ============================================================================

/// Authoritative flow-id→flow map plus queue-name secondary index.
///
/// All mutations that touch both maps happen through single methods called
/// under the owning registry's mutex, so the two can never drift apart.
struct SessionTable<F> {
    by_id: HashMap<FlowId, Arc<F>>,
    queue_index: HashMap<QueueName, FlowId>,
}

impl<F> SessionTable<F> {
    fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            queue_index: HashMap::new(),
        }
    }

    fn queue_bound(&self, queue: &QueueName) -> bool {
        self.queue_index.contains_key(queue)
    }

    fn contains_id(&self, flow_id: &FlowId) -> bool {
        self.by_id.contains_key(flow_id)
    }

    fn flow_id_for_queue(&self, queue: &QueueName) -> Option<FlowId> {
        self.queue_index.get(queue).cloned()
    }

    fn by_id(&self, flow_id: &FlowId) -> Option<Arc<F>> {
        self.by_id.get(flow_id).cloned()
    }

    /// Insert both the flow entry and the queue binding as one step
    fn bind_queue(&mut self, queue: QueueName, flow_id: FlowId, flow: Arc<F>) {
        self.by_id.insert(flow_id.clone(), flow);
        self.queue_index.insert(queue, flow_id);
    }

    /// Remove the queue binding, but only if it still points at `flow_id`.
    /// The flow entry itself stays for the retention window.
    fn release_queue(&mut self, queue: &QueueName, flow_id: &FlowId) {
        if self.queue_index.get(queue) == Some(flow_id) {
            self.queue_index.remove(queue);
        }
    }

    /// Drop the flow entry after the retention window
    fn purge(&mut self, flow_id: &FlowId) {
        self.by_id.remove(flow_id);
    }

    /// Empty both maps, returning every registered flow
    fn drain(&mut self) -> Vec<Arc<F>> {
        self.queue_index.clear();
        self.by_id.drain().map(|(_, flow)| flow).collect()
    }
}

// ============================================================================
// Bind Requests
// ============================================================================

/// Parameters for binding a consumer flow
#[derive(Debug, Clone)]
pub struct BindRequest {
    /// Caller-visible correlation id of the bind request; the flow id is
    /// derived from it
    pub correlation_id: String,
    /// Optional selector expression restricting delivered messages
    pub selector: Option<String>,
}

/// Parameters for binding a browse flow
#[derive(Debug, Clone)]
pub struct BrowseBindRequest {
    /// Caller-visible correlation id of the bind request
    pub correlation_id: String,
    /// Optional selector expression restricting browsed messages
    pub selector: Option<String>,
    /// Whether this browse flow may delete messages
    pub mode: BrowseMode,
}

// ============================================================================
// Consumer Flow Registry
// ============================================================================

/// Registry of consumer flows, at most one live flow per queue
pub struct FlowRegistry {
    broker: Arc<dyn BrokerClient>,
    scheduler: Arc<TimeoutScheduler>,
    settings: FlowSettings,
    table: Arc<Mutex<SessionTable<ConsumerFlow>>>,
}

impl FlowRegistry {
    /// Create a registry over a broker client and a shared scheduler
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        scheduler: Arc<TimeoutScheduler>,
        settings: FlowSettings,
    ) -> Self {
        Self {
            broker,
            scheduler,
            settings,
            table: Arc::new(Mutex::new(SessionTable::new())),
        }
    }

    /// Bind a new consumer flow to a queue.
    ///
    /// # Errors
    ///
    /// - `AlreadyBound` if the queue has a live flow (under concurrent binds,
    ///   exactly one caller wins)
    /// - `PreconditionViolated` if the derived flow id is already registered
    /// - `Broker(..)` if the broker refuses the consumer; no partial registry
    ///   state is left behind
    pub async fn bind(&self, queue: &QueueName, request: BindRequest) -> Result<FlowId, FlowError> {
        let flow_id = FlowId::derive(&request.correlation_id)?;

        // Fail fast before touching the broker.
        {
            let table = self.table.lock().await;
            if table.queue_bound(queue) {
                return Err(FlowError::AlreadyBound {
                    queue_name: queue.to_string(),
                });
            }
            if table.contains_id(&flow_id) {
                return Err(FlowError::PreconditionViolated {
                    message: format!("flow id '{flow_id}' already registered"),
                });
            }
        }

        let selector = request
            .selector
            .as_deref()
            .map(Selector::parse)
            .transpose()?;
        let mut consumer_settings =
            ConsumerSettings::new().with_window_size(self.settings.transport_window);
        if let Some(selector) = selector {
            consumer_settings = consumer_settings.with_selector(selector);
        }

        let consumer = self.broker.open_consumer(queue, consumer_settings).await?;

        let flow = Arc::new(ConsumerFlow::new(
            flow_id.clone(),
            queue.clone(),
            consumer,
            Arc::clone(&self.scheduler),
            self.settings.inactivity_timeout(),
            self.settings.receive_wait(),
            self.eviction_hook(queue.clone(), flow_id.clone()),
        ));

        // Check-and-insert is one critical section: a concurrent bind that
        // won the race is detected here, and the loser's handle is released.
        {
            let mut table = self.table.lock().await;
            if table.queue_bound(queue) {
                drop(table);
                flow.close().await;
                return Err(FlowError::AlreadyBound {
                    queue_name: queue.to_string(),
                });
            }
            table.bind_queue(queue.clone(), flow_id.clone(), Arc::clone(&flow));
            // Arm the first inactivity window before anyone else can see the
            // flow, so an immediate unbind cannot interleave with the arming.
            flow.restart_timer();
        }

        info!(queue = %queue, flow_id = %flow_id, "bound consumer flow");
        Ok(flow_id)
    }

    fn eviction_hook(&self, queue: QueueName, flow_id: FlowId) -> EvictionHook {
        let table = Arc::clone(&self.table);
        let scheduler = Arc::clone(&self.scheduler);
        let retention = self.settings.closed_retention();
        Arc::new(move |version| {
            let table = Arc::clone(&table);
            let scheduler = Arc::clone(&scheduler);
            let queue = queue.clone();
            let flow_id = flow_id.clone();
            let job: crate::flow::EvictionJob = Box::pin(async move {
                let flow = { table.lock().await.by_id(&flow_id) };
                let Some(flow) = flow else {
                    return;
                };
                if flow.close_if_stale(version).await {
                    warn!(queue = %queue, flow_id = %flow_id, "consumer flow evicted after inactivity");
                    table.lock().await.release_queue(&queue, &flow_id);
                    let purge_table = Arc::clone(&table);
                    let purge_id = flow_id.clone();
                    scheduler.arm(flow.timer_generation(), retention, move |_version| async move {
                        purge_table.lock().await.purge(&purge_id);
                    });
                }
            });
            job
        })
    }

    /// Unbind the flow currently bound to `queue`.
    ///
    /// Verifies that `flow_id` names exactly that flow, so a stale caller
    /// cannot tear down a replacement flow; on mismatch nothing is mutated.
    pub async fn unbind(&self, queue: &QueueName, flow_id: &FlowId) -> Result<(), FlowError> {
        let flow = {
            let mut table = self.table.lock().await;
            match table.flow_id_for_queue(queue) {
                Some(ref bound) if bound == flow_id => {
                    let flow = table.by_id(flow_id);
                    table.release_queue(queue, flow_id);
                    flow
                }
                _ => {
                    return Err(FlowError::UnknownFlow {
                        flow_id: flow_id.to_string(),
                    })
                }
            }
        };

        if let Some(flow) = flow {
            flow.close().await;
            self.arm_purge(&flow);
        }
        info!(queue = %queue, flow_id = %flow_id, "unbound consumer flow");
        Ok(())
    }

    fn arm_purge(&self, flow: &Arc<ConsumerFlow>) {
        let table = Arc::clone(&self.table);
        let flow_id = flow.flow_id().clone();
        self.scheduler.arm(
            flow.timer_generation(),
            self.settings.closed_retention(),
            move |_version| async move {
                table.lock().await.purge(&flow_id);
            },
        );
    }

    /// Is there currently a live flow bound to this queue?
    pub async fn has_active_flow(&self, queue: &QueueName) -> bool {
        self.table.lock().await.queue_bound(queue)
    }

    /// Look up a flow by id. During the retention window this returns the
    /// closed flow, whose operations all report `Closed`.
    pub async fn flow_by_id(&self, flow_id: &FlowId) -> Option<Arc<ConsumerFlow>> {
        self.table.lock().await.by_id(flow_id)
    }

    /// Id of the flow currently bound to a queue
    pub async fn flow_id_for_queue(&self, queue: &QueueName) -> Option<FlowId> {
        self.table.lock().await.flow_id_for_queue(queue)
    }

    /// Close every registered flow. Used at process shutdown; safe to call
    /// more than once.
    pub async fn shutdown_all(&self) {
        let flows = { self.table.lock().await.drain() };
        let count = flows.len();
        for flow in flows {
            flow.close().await;
        }
        if count > 0 {
            info!(flows = count, "consumer flow registry shut down");
        }
    }
}

// ============================================================================
// Browse Flow Registry
// ============================================================================

/// Registry of browse flows, at most one live browse flow per queue
pub struct BrowseRegistry {
    broker: Arc<dyn BrokerClient>,
    scheduler: Arc<TimeoutScheduler>,
    settings: FlowSettings,
    table: Arc<Mutex<SessionTable<BrowseFlow>>>,
}

impl BrowseRegistry {
    /// Create a registry over a broker client and a shared scheduler
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        scheduler: Arc<TimeoutScheduler>,
        settings: FlowSettings,
    ) -> Self {
        Self {
            broker,
            scheduler,
            settings,
            table: Arc::new(Mutex::new(SessionTable::new())),
        }
    }

    /// Bind a new browse flow to a queue. Same atomicity and failure
    /// semantics as [`FlowRegistry::bind`].
    pub async fn bind(
        &self,
        queue: &QueueName,
        request: BrowseBindRequest,
    ) -> Result<FlowId, FlowError> {
        let flow_id = FlowId::derive(&request.correlation_id)?;

        {
            let table = self.table.lock().await;
            if table.queue_bound(queue) {
                return Err(FlowError::AlreadyBound {
                    queue_name: queue.to_string(),
                });
            }
            if table.contains_id(&flow_id) {
                return Err(FlowError::PreconditionViolated {
                    message: format!("flow id '{flow_id}' already registered"),
                });
            }
        }

        let selector = request
            .selector
            .as_deref()
            .map(Selector::parse)
            .transpose()?;
        let mut browser_settings = BrowserSettings::new();
        if let Some(selector) = selector {
            browser_settings = browser_settings.with_selector(selector);
        }

        let browser = self.broker.open_browser(queue, browser_settings).await?;

        let flow = Arc::new(BrowseFlow::new(
            flow_id.clone(),
            queue.clone(),
            request.mode,
            browser,
            Arc::clone(&self.scheduler),
            self.settings.browse_inactivity_timeout(),
            self.settings.receive_wait(),
            self.eviction_hook(queue.clone(), flow_id.clone()),
        ));

        {
            let mut table = self.table.lock().await;
            if table.queue_bound(queue) {
                drop(table);
                flow.close().await;
                return Err(FlowError::AlreadyBound {
                    queue_name: queue.to_string(),
                });
            }
            table.bind_queue(queue.clone(), flow_id.clone(), Arc::clone(&flow));
            // Same interleaving guard as the consumer registry: arm before
            // the flow becomes visible.
            flow.restart_timer();
        }

        info!(queue = %queue, flow_id = %flow_id, mode = ?request.mode, "bound browse flow");
        Ok(flow_id)
    }

    fn eviction_hook(&self, queue: QueueName, flow_id: FlowId) -> EvictionHook {
        let table = Arc::clone(&self.table);
        let scheduler = Arc::clone(&self.scheduler);
        let retention = self.settings.closed_retention();
        Arc::new(move |version| {
            let table = Arc::clone(&table);
            let scheduler = Arc::clone(&scheduler);
            let queue = queue.clone();
            let flow_id = flow_id.clone();
            let job: crate::flow::EvictionJob = Box::pin(async move {
                let flow = { table.lock().await.by_id(&flow_id) };
                let Some(flow) = flow else {
                    return;
                };
                if flow.close_if_stale(version).await {
                    warn!(queue = %queue, flow_id = %flow_id, "browse flow evicted after inactivity");
                    table.lock().await.release_queue(&queue, &flow_id);
                    let purge_table = Arc::clone(&table);
                    let purge_id = flow_id.clone();
                    scheduler.arm(flow.timer_generation(), retention, move |_version| async move {
                        purge_table.lock().await.purge(&purge_id);
                    });
                }
            });
            job
        })
    }

    /// Unbind the browse flow currently bound to `queue`. Same verification
    /// as [`FlowRegistry::unbind`].
    pub async fn unbind(&self, queue: &QueueName, flow_id: &FlowId) -> Result<(), FlowError> {
        let flow = {
            let mut table = self.table.lock().await;
            match table.flow_id_for_queue(queue) {
                Some(ref bound) if bound == flow_id => {
                    let flow = table.by_id(flow_id);
                    table.release_queue(queue, flow_id);
                    flow
                }
                _ => {
                    return Err(FlowError::UnknownFlow {
                        flow_id: flow_id.to_string(),
                    })
                }
            }
        };

        if let Some(flow) = flow {
            flow.close().await;
            let table = Arc::clone(&self.table);
            let purge_id = flow.flow_id().clone();
            self.scheduler.arm(
                flow.timer_generation(),
                self.settings.closed_retention(),
                move |_version| async move {
                    table.lock().await.purge(&purge_id);
                },
            );
        }
        info!(queue = %queue, flow_id = %flow_id, "unbound browse flow");
        Ok(())
    }

    /// Is there currently a live browse flow bound to this queue?
    pub async fn has_active_flow(&self, queue: &QueueName) -> bool {
        self.table.lock().await.queue_bound(queue)
    }

    /// Look up a browse flow by id, including closed flows still in their
    /// retention window
    pub async fn flow_by_id(&self, flow_id: &FlowId) -> Option<Arc<BrowseFlow>> {
        self.table.lock().await.by_id(flow_id)
    }

    /// Id of the browse flow currently bound to a queue
    pub async fn flow_id_for_queue(&self, queue: &QueueName) -> Option<FlowId> {
        self.table.lock().await.flow_id_for_queue(queue)
    }

    /// Close every registered browse flow. Idempotent.
    pub async fn shutdown_all(&self) {
        let flows = { self.table.lock().await.drain() };
        let count = flows.len();
        for flow in flows {
            flow.close().await;
        }
        if count > 0 {
            info!(flows = count, "browse flow registry shut down");
        }
    }
}
