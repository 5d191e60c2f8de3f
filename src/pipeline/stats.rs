//! Run counters shared by the producer and every worker.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters for one [`Pipeline::run`](super::Pipeline::run).
///
/// Uses atomic counters so concurrent units of work can update them without
/// locking.
#[derive(Debug, Default)]
pub struct PipelineStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
    aborted: AtomicUsize,
}

impl PipelineStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of items whose payload reached the store.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns the number of items that failed terminally (including panics).
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of extra attempts made across all items.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Returns the number of in-flight items aborted by cancellation.
    #[must_use]
    pub fn aborted(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }

    pub(crate) fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_aborted(&self) {
        self.aborted.fetch_add(1, Ordering::SeqCst);
    }

    /// Records the retries behind an item that took `attempts` attempts.
    pub(crate) fn record_attempts(&self, attempts: u32) {
        let retries = attempts.saturating_sub(1) as usize;
        if retries > 0 {
            self.retried.fetch_add(retries, Ordering::SeqCst);
        }
    }
}
