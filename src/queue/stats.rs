//! Counters and reports exposed by the queue.

use std::sync::atomic::{AtomicU64, Ordering};

/// Drain loop state. `Draining` means exactly one drain task owns the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainState {
    Idle,
    Draining,
}

/// Snapshot returned by [`stats`](super::EventDispatchQueue::stats).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    /// Events whose handlers all ran, successfully or not.
    pub processed: u64,
    /// Failed handler invocations (not events).
    pub failed: u64,
    pub discarded: u64,
    pub pending: usize,
    pub state: DrainState,
    pub closed: bool,
}

/// Result of a shutdown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    pub processed: u64,
    pub failed: u64,
    /// Events dropped by `ShutdownMode::Discard`.
    pub discarded: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub submitted: AtomicU64,
    pub processed: AtomicU64,
    pub failed: AtomicU64,
    pub discarded: AtomicU64,
}

impl Counters {
    pub fn incr(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
