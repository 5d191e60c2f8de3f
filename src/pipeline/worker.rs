//! Concurrent consumers draining the work queue.
//!
//! [`WorkerSupervisor`] spawns a fixed number of consumer loops. Each loop
//! takes one item at a time, runs it as its own Tokio task so a panic cannot
//! take the loop down, and moves on to the next item whatever the outcome.
//! Terminal failures are reported out of band on an unbounded channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::PipelineError;
use super::stats::PipelineStats;
use crate::fetch::{Exhausted, FailureType, FetchOperationFactory, RetryPolicy, RetryableFetch};
use crate::queue::{BoundedQueue, TaskDoneGuard};
use crate::source::WorkItem;
use crate::store::Store;

/// An item the pipeline gave up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalFailure {
    /// The item that failed.
    pub item: WorkItem,
    /// Rendered error from the last attempt.
    pub error: String,
    /// Classification of the last error; `None` when the unit of work panicked.
    pub failure_type: Option<FailureType>,
    /// Attempts made before giving up (0 after a panic).
    pub attempts: u32,
}

impl TerminalFailure {
    fn exhausted(item: WorkItem, exhausted: &Exhausted) -> Self {
        Self {
            item,
            error: exhausted.error.to_string(),
            failure_type: Some(exhausted.failure_type),
            attempts: exhausted.attempts,
        }
    }

    fn panicked(item: WorkItem, join_error: &JoinError) -> Self {
        Self {
            item,
            error: format!("task panic: {join_error}"),
            failure_type: None,
            attempts: 0,
        }
    }
}

/// Everything a consumer loop needs, cloned into each loop.
#[derive(Clone)]
pub struct WorkerContext {
    /// Queue to drain.
    pub queue: Arc<BoundedQueue<WorkItem>>,
    /// Builds the fetch operation for each item.
    pub factory: Arc<dyn FetchOperationFactory>,
    /// Receives successful payloads.
    pub store: Arc<dyn Store>,
    /// Retry policy applied to every item.
    pub policy: RetryPolicy,
    /// Shared run counters.
    pub stats: Arc<PipelineStats>,
    /// Out-of-band failure reports.
    pub failures: mpsc::UnboundedSender<TerminalFailure>,
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("queue_len", &self.queue.len())
            .field("policy", &self.policy)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Owns the consumer loops of one run.
#[derive(Debug)]
pub struct WorkerSupervisor {
    loops: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl WorkerSupervisor {
    /// Spawns `concurrency` consumer loops over `context`.
    ///
    /// The loops run until `cancel` fires or [`shutdown`](Self::shutdown) is
    /// called. Must be called from within a Tokio runtime.
    #[must_use]
    #[instrument(level = "debug", skip(context, cancel))]
    pub fn start(concurrency: usize, context: &WorkerContext, cancel: CancellationToken) -> Self {
        let loops = (0..concurrency)
            .map(|worker_id| {
                tokio::spawn(consume(worker_id, context.clone(), cancel.clone()))
            })
            .collect();

        Self { loops, cancel }
    }

    /// Returns the number of consumer loops.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.loops.len()
    }

    /// Stops every loop and waits for it to exit.
    ///
    /// In-flight units of work are aborted; their queue accounting is still
    /// released.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SupervisorPanicked`] if a consumer loop itself
    /// panicked.
    pub async fn shutdown(self) -> Result<(), PipelineError> {
        self.cancel.cancel();

        let mut panicked = false;
        for handle in self.loops {
            if let Err(join_error) = handle.await {
                warn!(error = %join_error, "consumer loop terminated abnormally");
                panicked |= join_error.is_panic();
            }
        }

        if panicked {
            return Err(PipelineError::SupervisorPanicked);
        }
        debug!("all consumer loops stopped");
        Ok(())
    }
}

async fn consume(worker_id: usize, context: WorkerContext, cancel: CancellationToken) {
    debug!(worker_id, "consumer loop started");

    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            item = context.queue.get() => item,
        };

        let guard = TaskDoneGuard::new(Arc::clone(&context.queue));
        let mut unit = tokio::spawn(process_item(context.clone(), item.clone(), guard));

        let joined = tokio::select! {
            joined = &mut unit => joined,
            () = cancel.cancelled() => {
                unit.abort();
                unit.await
            }
        };

        match joined {
            Ok(()) => {}
            Err(join_error) if join_error.is_cancelled() => {
                debug!(worker_id, item = %item, "in-flight item aborted");
                context.stats.increment_aborted();
            }
            Err(join_error) => handle_unit_join_error(&context, item, &join_error),
        }
    }

    debug!(worker_id, "consumer loop stopped");
}

fn handle_unit_join_error(context: &WorkerContext, item: WorkItem, join_error: &JoinError) {
    warn!(item = %item, error = %join_error, "fetch task panicked");
    context.stats.increment_failed();
    report(context, TerminalFailure::panicked(item, join_error));
}

#[instrument(skip_all, fields(item = %item))]
async fn process_item(context: WorkerContext, item: WorkItem, _guard: TaskDoneGuard<WorkItem>) {
    let operation = context.factory.create(&item);
    let fetch = RetryableFetch::new(operation, context.policy.clone());

    match fetch.content().await {
        Ok(fetched) => {
            context.stats.record_attempts(fetched.attempts);
            context.store.add(fetched.payload);
            context.stats.increment_completed();
            info!(attempts = fetched.attempts, "item stored");
        }
        Err(exhausted) => {
            context.stats.record_attempts(exhausted.attempts);
            context.stats.increment_failed();
            warn!(
                error = %exhausted.error,
                failure_type = %exhausted.failure_type,
                attempts = exhausted.attempts,
                "fetch failed after all attempts"
            );
            report(&context, TerminalFailure::exhausted(item, &exhausted));
        }
    }
}

fn report(context: &WorkerContext, failure: TerminalFailure) {
    if context.failures.send(failure).is_err() {
        debug!("failure receiver dropped");
    }
}
