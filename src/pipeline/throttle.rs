//! Producer-side pacing.
//!
//! This module provides the [`Throttle`] type and the [`produce`] loop that
//! feeds work into a [`BoundedQueue`].
//!
//! # Overview
//!
//! Pacing is applied to the *producer*, not to individual requests:
//!
//! - With a throttle, items are grouped into batches of exactly
//!   `max_items_per_window` (the last one may be smaller). Each batch is
//!   inserted with [`BoundedQueue::batch_put`] and the producer then sleeps
//!   for one window, unless the source is exhausted. There is never a
//!   trailing sleep.
//! - Without a throttle, each item is inserted with [`BoundedQueue::put`], so
//!   the producer is paced only by queue backpressure.
//!
//! # Example
//!
//! ```
//! use std::num::NonZeroUsize;
//! use std::time::Duration;
//! use bulkfetch_core::pipeline::{Throttle, produce};
//! use bulkfetch_core::queue::BoundedQueue;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let queue = BoundedQueue::unbounded();
//! let throttle = Throttle::new(NonZeroUsize::new(3).unwrap(), Duration::from_millis(10));
//! let stats = produce(&queue, 0..7, Some(&throttle), &CancellationToken::new()).await;
//! assert_eq!(stats.batches, vec![3, 3, 1]);
//! assert_eq!(stats.suspensions, 2);
//! # }
//! ```

use std::num::NonZeroUsize;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use crate::queue::BoundedQueue;

/// Default pacing window (1 second).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// At most `max_items_per_window` items are released per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    max_items_per_window: NonZeroUsize,
    window: Duration,
}

impl Throttle {
    /// Creates a throttle releasing `max_items_per_window` items per `window`.
    #[must_use]
    pub fn new(max_items_per_window: NonZeroUsize, window: Duration) -> Self {
        Self {
            max_items_per_window,
            window,
        }
    }

    /// Creates a throttle with the default one-second window.
    #[must_use]
    pub fn per_second(max_items_per_window: NonZeroUsize) -> Self {
        Self::new(max_items_per_window, DEFAULT_WINDOW)
    }

    /// Creates a throttle from a plain count; `0` means "no throttle".
    #[must_use]
    pub fn from_rate(max_items_per_window: usize, window: Duration) -> Option<Self> {
        NonZeroUsize::new(max_items_per_window).map(|max| Self::new(max, window))
    }

    /// Returns the batch size.
    #[must_use]
    pub fn max_items_per_window(&self) -> NonZeroUsize {
        self.max_items_per_window
    }

    /// Returns the pause between batches.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}

/// What the producer did during one [`produce`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProduceStats {
    /// Items inserted into the queue.
    pub items: usize,
    /// Items inserted one at a time (unthrottled mode).
    pub puts: usize,
    /// Size of every batch inserted, in order (throttled mode).
    pub batches: Vec<usize>,
    /// Number of window sleeps taken.
    pub suspensions: usize,
    /// The source was cut short by cancellation.
    pub interrupted: bool,
}

/// Feeds `items` into `queue`, paced by `throttle` when one is given.
///
/// Stops early, without inserting the current batch or item, once `cancel`
/// fires. Returns a record of the puts, batches and sleeps performed.
#[instrument(skip_all, fields(throttled = throttle.is_some()))]
pub async fn produce<T, I>(
    queue: &BoundedQueue<T>,
    items: I,
    throttle: Option<&Throttle>,
    cancel: &CancellationToken,
) -> ProduceStats
where
    I: IntoIterator<Item = T>,
{
    let stats = match throttle {
        Some(throttle) => produce_throttled(queue, items, throttle, cancel).await,
        None => produce_unthrottled(queue, items, cancel).await,
    };

    debug!(
        items = stats.items,
        batches = stats.batches.len(),
        suspensions = stats.suspensions,
        interrupted = stats.interrupted,
        "producer finished"
    );
    stats
}

async fn produce_throttled<T, I>(
    queue: &BoundedQueue<T>,
    items: I,
    throttle: &Throttle,
    cancel: &CancellationToken,
) -> ProduceStats
where
    I: IntoIterator<Item = T>,
{
    let batch_size = throttle.max_items_per_window.get();
    let mut source = items.into_iter().peekable();
    let mut stats = ProduceStats::default();

    loop {
        if cancel.is_cancelled() {
            stats.interrupted = true;
            break;
        }
        let batch: Vec<T> = source.by_ref().take(batch_size).collect();
        let len = batch.len();
        if len == 0 {
            break;
        }

        queue.batch_put(batch);
        stats.items += len;
        stats.batches.push(len);

        // A short batch means the source ran dry.
        if len < batch_size || source.peek().is_none() {
            break;
        }

        trace!(window_ms = throttle.window.as_millis(), "window full, suspending producer");
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                stats.interrupted = true;
                break;
            }
            () = tokio::time::sleep(throttle.window) => stats.suspensions += 1,
        }
    }

    stats
}

async fn produce_unthrottled<T, I>(
    queue: &BoundedQueue<T>,
    items: I,
    cancel: &CancellationToken,
) -> ProduceStats
where
    I: IntoIterator<Item = T>,
{
    let mut stats = ProduceStats::default();

    for item in items {
        if cancel.is_cancelled() {
            stats.interrupted = true;
            break;
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                stats.interrupted = true;
                break;
            }
            () = queue.put(item) => {
                stats.items += 1;
                stats.puts += 1;
            }
        }
    }

    stats
}
