//! Fetching one work item: transport, retry policy and the operation contract.
//!
//! # Features
//!
//! - [`FetchOperation`] / [`FetchOperationFactory`] - the narrow contract the
//!   pipeline depends on
//! - [`RetryableFetch`] - bounded-attempt retry around one operation
//! - [`RetryPolicy`] - attempt limit, backoff and permanent-error handling
//! - [`HttpClient`] + [`GetApiCall`] - reqwest-backed JSON GET with base URL
//!   resolution and header or query-parameter credentials
//!
//! # Example
//!
//! ```no_run
//! use bulkfetch_core::fetch::{GetApiCall, HttpClient, RetryPolicy, RetryableFetch};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let operation = GetApiCall::new(client, "https://api.example.com/items/1");
//! let fetched = RetryableFetch::new(Box::new(operation), RetryPolicy::with_max_attempts(3))
//!     .content()
//!     .await?;
//! println!("{} after {} attempt(s)", fetched.payload, fetched.attempts);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
mod operation;
mod retry;
mod retryable;

pub use client::{Auth, GetApiCall, GetApiCallFactory, HttpClient};
pub use constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
pub use error::FetchError;
pub use operation::{FetchOperation, FetchOperationFactory};
pub use retry::{
    Backoff, DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error,
    parse_retry_after, retry_after_delay,
};
pub use retryable::{Exhausted, Fetched, RetryableFetch};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, FetchError>` explicitly in function signatures.
