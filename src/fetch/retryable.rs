//! Bounded-retry wrapper around a single [`FetchOperation`].

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::operation::FetchOperation;
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error, retry_after_delay};
use super::FetchError;

/// Successful outcome of a [`RetryableFetch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    /// Parsed payload returned by the final attempt.
    pub payload: Value,
    /// Number of attempts made (1 means no retry was needed).
    pub attempts: u32,
}

/// Terminal failure: the policy gave up on the item.
#[derive(Debug, Error)]
#[error("{error} (gave up after {attempts} attempt(s))")]
pub struct Exhausted {
    /// The error from the last attempt.
    #[source]
    pub error: FetchError,
    /// Classification of the last error.
    pub failure_type: FailureType,
    /// Number of attempts made.
    pub attempts: u32,
}

/// Runs a [`FetchOperation`] under a [`RetryPolicy`].
///
/// Attempts are counted in an explicit loop: each failure is classified and
/// the policy decides between another attempt and giving up. The last error
/// is returned to the caller, never swallowed.
pub struct RetryableFetch {
    operation: Box<dyn FetchOperation>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for RetryableFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryableFetch")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryableFetch {
    /// Wraps `operation` with `policy`.
    #[must_use]
    pub fn new(operation: Box<dyn FetchOperation>, policy: RetryPolicy) -> Self {
        Self { operation, policy }
    }

    /// Fetches the payload, retrying according to the policy.
    ///
    /// # Errors
    ///
    /// Returns [`Exhausted`] with the last error once the policy stops retrying.
    #[instrument(skip(self), fields(max_attempts = self.policy.max_attempts()))]
    pub async fn content(&self) -> Result<Fetched, Exhausted> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, "attempting fetch");

            let error = match self.operation.content().await {
                Ok(payload) => {
                    let pause = self.policy.success_pause();
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                    return Ok(Fetched {
                        payload,
                        attempts: attempt,
                    });
                }
                Err(error) => error,
            };

            let failure_type = classify_error(&error);
            let server_delay = if failure_type == FailureType::RateLimited {
                retry_after_delay(&error)
            } else {
                None
            };

            match self.policy.should_retry(failure_type, attempt) {
                RetryDecision::Retry {
                    delay: backoff_delay,
                    attempt: next_attempt,
                } => {
                    let delay = server_delay.unwrap_or(backoff_delay);
                    info!(
                        url = %error.url(),
                        attempt = next_attempt,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        using_retry_after = server_delay.is_some(),
                        %failure_type,
                        error = %error,
                        "retrying fetch"
                    );
                    if delay > Duration::ZERO {
                        tokio::time::sleep(delay).await;
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url = %error.url(), %reason, "not retrying fetch");
                    return Err(Exhausted {
                        error,
                        failure_type,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}
