//! # restq flow
//!
//! Flow lifecycle manager: pull-based, acknowledgment-tracked consumption of
//! queue messages for callers on a stateless request/response transport.
//!
//! A transport cannot hold a live subscription open, so this library emulates
//! a long-lived "flow" (a bound, ordered, at-most-one-active consumer per
//! queue) out of short discrete interactions, while guarding against
//! resource leaks from callers that disappear mid-session.
//!
//! This library provides:
//! - Consumer flows with caller-addressable unacknowledged-message tracking
//! - Read-mostly browse flows with explicit, mode-gated deletion
//! - Registries enforcing single-active-flow-per-queue under concurrent binds
//! - Versioned inactivity timers that evict abandoned flows race-free
//! - A structured reply envelope with stable (status, reason) pairs
//!
//! ## Module Organization
//!
//! - [`scheduler`] - Shared one-shot timeout scheduling
//! - [`flow`] - Consumer flow operations and lifecycle
//! - [`browse`] - Browse flow operations and lifecycle
//! - [`registry`] - Queue↔flow registries, bind/unbind/shutdown
//! - [`ident`] - Flow and message identifiers
//! - [`error`] - Error taxonomy with stable status mapping
//! - [`reply`] - Transport-facing reply envelope
//! - [`config`] - Tunable settings with file/environment loading

// Module declarations
pub mod browse;
pub mod config;
pub mod error;
pub mod flow;
pub mod ident;
pub mod registry;
pub mod reply;
pub mod scheduler;

// Re-export commonly used types at crate root for convenience
pub use browse::{BrowseFlow, BrowseMode};
pub use config::FlowSettings;
pub use error::FlowError;
pub use flow::ConsumerFlow;
pub use ident::{FlowId, MessageRef};
pub use registry::{BindRequest, BrowseBindRequest, BrowseRegistry, FlowRegistry};
pub use reply::{Reply, ReplyPayload};
pub use scheduler::{TimeoutScheduler, TimerGeneration};
