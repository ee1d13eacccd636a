//! Shared one-shot timeout scheduling.
//!
//! Each flow owns a [`TimerGeneration`]: a monotonically increasing version
//! counter. Arming a timer advances the generation, which atomically cancels
//! whatever was armed before; a callback that wakes up with a superseded
//! version must no-op. The scheduler only pre-filters stale callbacks: the
//! authoritative check happens inside the callback body, under whatever lock
//! guards the owner's state, so a timer firing concurrently with an in-flight
//! operation is always resolved deterministically.
//!
//! The scheduler is constructed once and injected wherever timers are needed;
//! nothing here is ambient global state, which keeps timer behavior fully
//! controllable from tests via tokio's paused clock.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

/// Monotonically-versioned handle to one logical timer slot
#[derive(Debug, Clone)]
pub struct TimerGeneration {
    version: Arc<AtomicU64>,
}

impl TimerGeneration {
    /// Create a new generation starting at version zero
    pub fn new() -> Self {
        Self {
            version: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get the current version
    pub fn current(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Advance to a new version, superseding anything armed before.
    /// Returns the new version.
    pub fn advance(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Check whether a previously armed version is still current
    pub fn is_current(&self, version: u64) -> bool {
        self.current() == version
    }
}

impl Default for TimerGeneration {
    fn default() -> Self {
        Self::new()
    }
}

/// Fires a single callback after a delay, with atomic restart semantics
pub struct TimeoutScheduler;

impl TimeoutScheduler {
    /// Create a new scheduler
    pub fn new() -> Self {
        Self
    }

    /// Arm a one-shot callback on `generation` after `delay`.
    ///
    /// Advances the generation first, so any previously armed callback for
    /// the same slot is cancelled. The job receives the version it was armed
    /// with and must re-check it against the generation before acting.
    ///
    /// Must be called from within a tokio runtime. Returns the armed version.
    pub fn arm<F, Fut>(&self, generation: &TimerGeneration, delay: Duration, job: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let version = generation.advance();
        let generation = generation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if generation.is_current(version) {
                job(version).await;
            } else {
                trace!(version, "timer superseded before firing");
            }
        });
        version
    }

    /// Cancel whatever is armed on `generation`. Idempotent; race-free with
    /// a callback that is already executing (the callback's own version
    /// check is the commit point).
    pub fn disarm(&self, generation: &TimerGeneration) {
        generation.advance();
    }
}

impl Default for TimeoutScheduler {
    fn default() -> Self {
        Self::new()
    }
}
