//! Bulkfetch Core Library
//!
//! This library pulls large numbers of JSON resources from a remote API,
//! identified by a generated sequence of URLs, while respecting a
//! caller-supplied rate limit and tolerating transient failures.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`queue`] - Bounded async work queue with drain tracking
//! - [`fetch`] - HTTP transport and the bounded-retry fetch wrapper
//! - [`pipeline`] - Producer pacing, worker pool and the run coordinator
//! - [`source`] - Work items and the id/date sequences that generate them
//! - [`store`] - Sinks for fetched payloads

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fetch;
pub mod pipeline;
pub mod queue;
pub mod source;
pub mod store;

// Re-export commonly used types
pub use fetch::{
    Auth, DEFAULT_MAX_ATTEMPTS, FailureType, FetchError, FetchOperation, FetchOperationFactory,
    HttpClient, RetryPolicy, RetryableFetch,
};
pub use pipeline::{
    DEFAULT_CONCURRENCY, Pipeline, PipelineConfig, PipelineError, RunReport, TerminalFailure,
    Throttle,
};
pub use queue::{BoundedQueue, QueueError};
pub use source::WorkItem;
pub use store::{ListStore, Store};
