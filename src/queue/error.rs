//! Error types for queue operations.

use thiserror::Error;

/// Errors raised by [`BoundedQueue`](super::BoundedQueue) protocol checks.
///
/// These indicate a bug in the caller rather than a runtime condition, so
/// the panicking variants of the queue API treat them as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// `task_done` was called more times than items were enqueued.
    #[error("task_done called without a matching get (no unfinished items)")]
    TaskDoneWithoutGet,
}
