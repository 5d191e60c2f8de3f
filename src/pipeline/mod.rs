//! End-to-end bulk fetch: producer, queue, workers and store.
//!
//! This module provides the [`Pipeline`] which coordinates one run:
//!
//! 1. A [`WorkerSupervisor`] starts `concurrency` consumer loops
//! 2. The producer feeds the work-item sequence into a [`BoundedQueue`],
//!    paced by an optional [`Throttle`]
//! 3. Once the producer is done, the run waits for the queue to drain
//! 4. The workers are shut down and a [`RunReport`] is returned
//!
//! Individual fetch failures never fail the run. They are counted, logged
//! and listed in [`RunReport::failures`].
//!
//! # Example
//!
//! ```no_run
//! use std::num::NonZeroUsize;
//! use std::sync::Arc;
//! use bulkfetch_core::pipeline::{Pipeline, PipelineConfig, Throttle};
//! use bulkfetch_core::source::{id_range, url_sequence};
//! use bulkfetch_core::store::{ListStore, Store};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(ListStore::new());
//! let items = url_sequence("https://api.example.com/items", id_range(0, 50, 1));
//! let report = Pipeline::http(
//!     Arc::clone(&store) as Arc<dyn Store>,
//!     "https://api.example.com",
//!     None,
//!     items,
//!     PipelineConfig::default(),
//! )?
//! .with_throttle(Throttle::per_second(NonZeroUsize::new(5).unwrap()))
//! .run()
//! .await?;
//!
//! println!("completed {} of {}", report.completed, report.submitted);
//! # Ok(())
//! # }
//! ```

mod stats;
mod throttle;
mod worker;

pub use stats::PipelineStats;
pub use throttle::{DEFAULT_WINDOW, ProduceStats, Throttle, produce};
pub use worker::{TerminalFailure, WorkerContext, WorkerSupervisor};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::fetch::{Auth, FetchError, FetchOperationFactory, GetApiCallFactory, HttpClient, RetryPolicy};
use crate::queue::{BoundedQueue, DEFAULT_QUEUE_CAPACITY};
use crate::source::WorkItem;
use crate::store::Store;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Error type for pipeline runs.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The HTTP transport could not be configured.
    #[error("transport setup failed: {0}")]
    Transport(#[from] FetchError),

    /// A consumer loop panicked outside of any unit of work.
    #[error("worker supervisor panicked")]
    SupervisorPanicked,
}

/// Tuning knobs for one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of concurrent consumer loops (1-100).
    pub concurrency: usize,
    /// Queue capacity when unthrottled (`0` = unbounded).
    pub queue_capacity: usize,
    /// Retry policy applied to every item.
    pub retry_policy: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Sets the number of consumer loops.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the unthrottled queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConcurrency`] if `concurrency` is
    /// outside 1-100.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(PipelineError::InvalidConcurrency {
                value: self.concurrency,
            });
        }
        Ok(())
    }
}

/// Outcome of one [`Pipeline::run`].
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Items inserted into the queue.
    pub submitted: usize,
    /// Items whose payload reached the store.
    pub completed: usize,
    /// Items that failed terminally.
    pub failed: usize,
    /// Extra attempts made across all items.
    pub retried: usize,
    /// Whether the run was stopped by its cancellation token.
    pub cancelled: bool,
    /// Items dropped by cancellation (still buffered or aborted in flight).
    pub abandoned: usize,
    /// Producer pacing record.
    pub pacing: ProduceStats,
    /// One entry per terminally failed item, in failure order.
    pub failures: Vec<TerminalFailure>,
}

impl RunReport {
    /// Returns `true` if the run finished without failures or cancellation.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed == 0
    }
}

type WorkItems = Box<dyn Iterator<Item = WorkItem> + Send>;

/// One bulk-fetch run over a lazy work-item sequence.
pub struct Pipeline {
    store: Arc<dyn Store>,
    factory: Arc<dyn FetchOperationFactory>,
    items: WorkItems,
    config: PipelineConfig,
    throttle: Option<Throttle>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("throttle", &self.throttle)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline fetching every item of `items` through `factory`.
    pub fn new<F, I>(store: Arc<dyn Store>, factory: F, items: I, config: PipelineConfig) -> Self
    where
        F: FetchOperationFactory,
        I: IntoIterator<Item = WorkItem>,
        I::IntoIter: Send + 'static,
    {
        Self {
            store,
            factory: Arc::new(factory),
            items: Box::new(items.into_iter()),
            config,
            throttle: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a pipeline issuing JSON GET requests for every item.
    ///
    /// Relative items are resolved against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Transport`] if `base_url` is not a valid
    /// absolute URL or `auth` cannot be sent as configured.
    pub fn http<I>(
        store: Arc<dyn Store>,
        base_url: &str,
        auth: Option<Auth>,
        items: I,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = WorkItem>,
        I::IntoIter: Send + 'static,
    {
        let mut client = HttpClient::new().with_base_url(base_url)?;
        if let Some(auth) = auth {
            client = client.with_auth(auth)?;
        }
        Ok(Self::new(store, GetApiCallFactory::new(client), items, config))
    }

    /// Paces the producer with `throttle`.
    #[must_use]
    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Stops the run early when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Runs until every item has been fetched or has failed terminally.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConcurrency`] for an out-of-range
    /// concurrency and [`PipelineError::SupervisorPanicked`] if a consumer
    /// loop crashed. Individual fetch failures do NOT cause this method to
    /// error.
    #[instrument(skip(self), fields(concurrency = self.config.concurrency, throttled = self.throttle.is_some()))]
    pub async fn run(self) -> Result<RunReport, PipelineError> {
        self.config.validate()?;

        // Throttled batches bypass the bound, so the capacity only matters
        // for single puts.
        let capacity = match &self.throttle {
            Some(throttle) => throttle.max_items_per_window().get(),
            None => self.config.queue_capacity,
        };
        let queue = Arc::new(BoundedQueue::new(capacity));
        let stats = Arc::new(PipelineStats::new());
        let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();

        let context = WorkerContext {
            queue: Arc::clone(&queue),
            factory: self.factory,
            store: self.store,
            policy: self.config.retry_policy,
            stats: Arc::clone(&stats),
            failures: failures_tx,
        };
        let supervisor =
            WorkerSupervisor::start(self.config.concurrency, &context, self.cancel.child_token());
        drop(context);

        info!(queue_capacity = capacity, "starting pipeline");

        let pacing = produce(&queue, self.items, self.throttle.as_ref(), &self.cancel).await;

        // A drained queue only counts as finished if nothing was cut short.
        let cancelled = tokio::select! {
            biased;
            () = queue.join(), if !pacing.interrupted => stats.aborted() > 0,
            () = self.cancel.cancelled() => true,
        };

        let mut abandoned = 0;
        if cancelled {
            abandoned += queue.clear_pending().len();
            warn!(abandoned, "pipeline cancelled, pending items dropped");
        }

        supervisor.shutdown().await?;
        abandoned += stats.aborted();

        let mut failures = Vec::new();
        while let Ok(failure) = failures_rx.try_recv() {
            failures.push(failure);
        }

        let report = RunReport {
            submitted: pacing.items,
            completed: stats.completed(),
            failed: stats.failed(),
            retried: stats.retried(),
            cancelled,
            abandoned,
            pacing,
            failures,
        };

        info!(
            submitted = report.submitted,
            completed = report.completed,
            failed = report.failed,
            retried = report.retried,
            abandoned = report.abandoned,
            cancelled,
            "pipeline complete"
        );

        Ok(report)
    }
}
