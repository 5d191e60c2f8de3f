//! Bounded FIFO work queue shared by the producer and the worker pool.
//!
//! This module provides [`BoundedQueue`], an async monitor-style queue with
//! drain tracking in the spirit of a task queue:
//!
//! - [`BoundedQueue::put`] waits while the buffer is at capacity
//! - [`BoundedQueue::batch_put`] inserts a whole batch at once, ignoring capacity
//! - [`BoundedQueue::get`] waits until an item is available
//! - [`BoundedQueue::task_done`] marks one dequeued item as finished
//! - [`BoundedQueue::join`] waits until every inserted item is finished
//!
//! Waiters register with a [`Notify`] *before* re-checking state, so a wake-up
//! issued between the check and the await is never lost.
//!
//! # Example
//!
//! ```
//! use bulkfetch_core::queue::BoundedQueue;
//!
//! # async fn example() {
//! let queue = BoundedQueue::new(2);
//! queue.put("https://api.example.com/items/1").await;
//! queue.batch_put(["https://api.example.com/items/2", "https://api.example.com/items/3"]);
//!
//! while !queue.is_empty() {
//!     let url = queue.get().await;
//!     println!("fetching {url}");
//!     queue.task_done();
//! }
//! queue.join().await;
//! # }
//! ```

mod error;

pub use error::QueueError;

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{trace, warn};

/// Default queue capacity when no throttle is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 3;

/// Async FIFO queue with an optional capacity bound and drain tracking.
///
/// A capacity of `0` means unbounded. The queue is designed to be wrapped in
/// [`Arc`] and shared between one producer and many consumers. Internal state
/// sits behind a [`std::sync::Mutex`] that is never held across an `.await`.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: usize,
    /// Parked consumers waiting for an item.
    not_empty: Notify,
    /// Parked producers waiting for free space.
    not_full: Notify,
    /// `join` waiters.
    drained: Notify,
}

#[derive(Debug)]
struct QueueState<T> {
    buffer: VecDeque<T>,
    /// Items inserted but not yet marked done (buffered + in flight).
    unfinished: usize,
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` buffered items (`0` = unbounded).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                buffer: VecDeque::new(),
                unfinished: 0,
            }),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
            drained: Notify::new(),
        }
    }

    /// Creates a queue without a capacity bound.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Returns the configured capacity (`0` = unbounded).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of buffered (not yet dequeued) items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Returns `true` when no items are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    /// Returns the number of items inserted but not yet marked done.
    #[must_use]
    pub fn unfinished(&self) -> usize {
        self.lock().unfinished
    }

    /// Enqueues one item, waiting while the buffer is full.
    ///
    /// Wakes one parked consumer. Never waits on an unbounded queue.
    pub async fn put(&self, item: T) {
        loop {
            let mut space = pin!(self.not_full.notified());
            space.as_mut().enable();

            {
                let mut state = self.lock();
                if self.has_room(state.buffer.len()) {
                    state.buffer.push_back(item);
                    state.unfinished += 1;
                    trace!(len = state.buffer.len(), "item enqueued");
                    drop(state);
                    self.not_empty.notify_one();
                    return;
                }
            }

            trace!(capacity = self.capacity, "queue full, producer parked");
            space.await;
        }
    }

    /// Enqueues every item as one unit, ignoring the capacity bound.
    ///
    /// Used by the throttled producer, which paces itself by wall clock and
    /// must not deadlock against its own batch under a small capacity.
    /// Wakes every parked consumer.
    pub fn batch_put<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        let added = {
            let mut state = self.lock();
            let before = state.buffer.len();
            state.buffer.extend(items);
            let added = state.buffer.len() - before;
            state.unfinished += added;
            added
        };

        trace!(added, "batch enqueued");
        if added > 0 {
            self.not_empty.notify_waiters();
        }
    }

    /// Dequeues the oldest item, waiting until one is available.
    pub async fn get(&self) -> T {
        loop {
            let mut available = pin!(self.not_empty.notified());
            available.as_mut().enable();

            let popped = self.lock().buffer.pop_front();
            if let Some(item) = popped {
                self.not_full.notify_one();
                return item;
            }

            available.await;
        }
    }

    /// Marks one previously dequeued item as finished.
    ///
    /// Must be called exactly once per [`get`](Self::get), on the failure
    /// path too, or [`join`](Self::join) never returns.
    ///
    /// # Panics
    ///
    /// Panics if there are no unfinished items. Use
    /// [`try_task_done`](Self::try_task_done) to get the error instead.
    pub fn task_done(&self) {
        if let Err(error) = self.try_task_done() {
            panic!("queue protocol violation: {error}");
        }
    }

    /// Marks one previously dequeued item as finished.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::TaskDoneWithoutGet`] if there are no unfinished items.
    pub fn try_task_done(&self) -> Result<(), QueueError> {
        let remaining = {
            let mut state = self.lock();
            if state.unfinished == 0 {
                return Err(QueueError::TaskDoneWithoutGet);
            }
            state.unfinished -= 1;
            state.unfinished
        };

        if remaining == 0 {
            trace!("queue drained");
            self.drained.notify_waiters();
        }
        Ok(())
    }

    /// Waits until every inserted item has been marked done.
    pub async fn join(&self) {
        loop {
            let mut drained = pin!(self.drained.notified());
            drained.as_mut().enable();

            if self.lock().unfinished == 0 {
                return;
            }

            drained.await;
        }
    }

    /// Removes all still-buffered items and marks them done.
    ///
    /// Used on cancellation so that [`join`](Self::join) reflects only the
    /// in-flight work. Returns the removed items in FIFO order.
    pub fn clear_pending(&self) -> Vec<T> {
        let (removed, remaining) = {
            let mut state = self.lock();
            let removed: Vec<T> = state.buffer.drain(..).collect();
            state.unfinished = state.unfinished.saturating_sub(removed.len());
            (removed, state.unfinished)
        };

        self.not_full.notify_waiters();
        if remaining == 0 {
            self.drained.notify_waiters();
        }
        removed
    }

    fn has_room(&self, len: usize) -> bool {
        self.capacity == 0 || len < self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        // Every critical section leaves the state consistent, so a poisoned
        // lock still guards valid data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Calls [`BoundedQueue::task_done`] exactly once when dropped.
///
/// Held by each unit of work so that the drain count stays correct when the
/// work completes, fails, panics, or is aborted.
#[derive(Debug)]
pub struct TaskDoneGuard<T> {
    queue: Arc<BoundedQueue<T>>,
}

impl<T> TaskDoneGuard<T> {
    /// Creates a guard for one item dequeued from `queue`.
    #[must_use]
    pub fn new(queue: Arc<BoundedQueue<T>>) -> Self {
        Self { queue }
    }
}

impl<T> Drop for TaskDoneGuard<T> {
    fn drop(&mut self) {
        if let Err(error) = self.queue.try_task_done() {
            warn!(%error, "task done guard released without unfinished items");
        }
    }
}
