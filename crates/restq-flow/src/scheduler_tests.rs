//! Tests for timer generations and the timeout scheduler.

use super::*;
use std::sync::atomic::AtomicUsize;

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// TimerGeneration Tests
// ============================================================================

#[test]
fn test_generation_starts_at_zero_and_advances() {
    let generation = TimerGeneration::new();
    assert_eq!(generation.current(), 0);
    assert_eq!(generation.advance(), 1);
    assert_eq!(generation.advance(), 2);
    assert_eq!(generation.current(), 2);
}

#[test]
fn test_is_current_tracks_supersession() {
    let generation = TimerGeneration::new();
    let armed = generation.advance();
    assert!(generation.is_current(armed));

    generation.advance();
    assert!(!generation.is_current(armed));
}

#[test]
fn test_clones_share_the_same_slot() {
    let generation = TimerGeneration::new();
    let clone = generation.clone();
    generation.advance();
    assert_eq!(clone.current(), 1);
}

// ============================================================================
// TimeoutScheduler Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_armed_job_fires_after_delay() {
    let scheduler = TimeoutScheduler::new();
    let generation = TimerGeneration::new();
    let fired = counter();

    let fired_clone = Arc::clone(&fired);
    scheduler.arm(&generation, Duration::from_secs(5), move |_version| {
        let fired = fired_clone;
        async move {
            fired.fetch_add(1, Ordering::SeqCst);
        }
    });

    tokio::time::advance(Duration::from_secs(4)).await;
    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rearming_supersedes_previous_job() {
    let scheduler = TimeoutScheduler::new();
    let generation = TimerGeneration::new();
    let fired = counter();

    for _ in 0..3 {
        let fired_clone = Arc::clone(&fired);
        scheduler.arm(&generation, Duration::from_secs(5), move |_version| {
            let fired = fired_clone;
            async move {
                fired.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
    }

    // Only the last armed job survives its full delay.
    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disarm_cancels_pending_job() {
    let scheduler = TimeoutScheduler::new();
    let generation = TimerGeneration::new();
    let fired = counter();

    let fired_clone = Arc::clone(&fired);
    scheduler.arm(&generation, Duration::from_secs(5), move |_version| {
        let fired = fired_clone;
        async move {
            fired.fetch_add(1, Ordering::SeqCst);
        }
    });
    scheduler.disarm(&generation);
    scheduler.disarm(&generation); // idempotent

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_job_receives_the_armed_version() {
    let scheduler = TimeoutScheduler::new();
    let generation = TimerGeneration::new();
    let observed = Arc::new(AtomicU64::new(0));

    let observed_clone = Arc::clone(&observed);
    let armed = scheduler.arm(&generation, Duration::from_secs(1), move |version| {
        let observed = observed_clone;
        async move {
            observed.store(version, Ordering::SeqCst);
        }
    });

    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(observed.load(Ordering::SeqCst), armed);
}
