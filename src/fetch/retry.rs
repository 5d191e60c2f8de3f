//! Bounded-attempt retry policy for fetch operations.
//!
//! This module provides the [`RetryPolicy`] and [`FailureType`] types for
//! classifying fetch errors and deciding whether another attempt is made.
//!
//! # Overview
//!
//! When an attempt fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - Temporary failures that may succeed on retry
//! - [`FailureType::Permanent`] - Client errors that are unlikely to change
//! - [`FailureType::RateLimited`] - Server rate limiting (HTTP 429)
//!
//! By default every failure type is retried up to `max_attempts`, matching
//! the behaviour of the ingestion jobs this crate serves. Call
//! [`RetryPolicy::fail_fast_on_permanent`] to stop permanent failures early.
//!
//! # Example
//!
//! ```
//! use bulkfetch_core::fetch::{FetchError, RetryDecision, RetryPolicy, classify_error};
//!
//! let policy = RetryPolicy::with_max_attempts(3);
//! let error = FetchError::http_status("https://api.example.com/items/7", 503);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("retrying in {delay:?} (attempt {attempt})");
//!     }
//!     RetryDecision::DoNotRetry { reason } => println!("giving up: {reason}"),
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use super::FetchError;
use super::constants::MAX_RETRY_AFTER;

/// Default maximum attempts (including the first one).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to backoff delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of fetch failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network reset, timeout, 5xx server errors.
    Transient,

    /// Failure that is unlikely to succeed on retry.
    ///
    /// Examples: 400 Bad Request, 404 Not Found, invalid JSON, invalid URL.
    Permanent,

    /// Server rate limiting (HTTP 429).
    RateLimited,
}

impl FailureType {
    /// Returns a stable lowercase label for logs and reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::RateLimited => "rate_limited",
        }
    }
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Give up and surface the last error.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Wait strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Retry immediately.
    None,

    /// `min(base_delay * multiplier^(attempt - 1), max_delay) + jitter`.
    Exponential {
        /// Delay before the first retry.
        base_delay: Duration,
        /// Upper bound before jitter.
        max_delay: Duration,
        /// Growth factor per attempt.
        multiplier: f32,
    },
}

impl Backoff {
    /// Exponential backoff with the default 1s base, 32s cap and 2x growth.
    #[must_use]
    pub fn exponential() -> Self {
        Self::Exponential {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

/// Configuration for bounded retries.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `backoff`: [`Backoff::None`]
/// - `retry_permanent`: `true` (client errors consume attempts like any other)
/// - `success_jitter`: zero (no pause after a successful call)
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Wait strategy between attempts.
    backoff: Backoff,

    /// Whether permanent failures are retried.
    retry_permanent: bool,

    /// Upper bound of the random pause inserted after a successful call.
    success_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::None,
            retry_permanent: true,
            success_jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    ///
    /// Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Sets the wait strategy between attempts.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Stops retrying as soon as a permanent failure is seen.
    #[must_use]
    pub fn fail_fast_on_permanent(mut self) -> Self {
        self.retry_permanent = false;
        self
    }

    /// Inserts a random pause of up to `max` after each successful call.
    ///
    /// Spreads out request timing when many workers hit the same service.
    #[must_use]
    pub fn success_jitter(mut self, max: Duration) -> Self {
        self.success_jitter = max;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns whether permanent failures are retried.
    #[must_use]
    pub fn retries_permanent(&self) -> bool {
        self.retry_permanent
    }

    /// Returns the configured wait strategy.
    #[must_use]
    pub fn backoff_strategy(&self) -> Backoff {
        self.backoff
    }

    /// Determines whether to retry a failed attempt.
    ///
    /// # Arguments
    ///
    /// * `failure_type` - Classification of the failure
    /// * `attempt` - The attempt number that just failed (1-indexed)
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent && !self.retry_permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Returns a random pause in `[0, success_jitter]`.
    #[must_use]
    pub fn success_pause(&self) -> Duration {
        if self.success_jitter.is_zero() {
            return Duration::ZERO;
        }
        random_up_to(self.success_jitter)
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Exponential {
                base_delay,
                max_delay,
                multiplier,
            } => {
                let base_ms = base_delay.as_millis() as f64;
                let exponent = f64::from(attempt.saturating_sub(1));
                let delay_ms = base_ms * f64::from(multiplier).powf(exponent);
                let capped_ms = delay_ms.min(max_delay.as_millis() as f64);

                Duration::from_millis(capped_ms as u64) + random_up_to(MAX_JITTER)
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn random_up_to(max: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(0..=max.as_millis() as u64))
}

/// Classifies a fetch error into a failure type for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | HTTP 408, 5xx | Transient |
/// | HTTP 429 | RateLimited |
/// | Other HTTP 4xx | Permanent |
/// | Timeout | Transient |
/// | Network (TLS, request builder) | Permanent |
/// | Network (other) | Transient |
/// | Decode, InvalidUrl, InvalidCredential | Permanent |
#[instrument]
pub fn classify_error(error: &FetchError) -> FailureType {
    match error {
        FetchError::HttpStatus { status, .. } => classify_http_status(*status),
        FetchError::Timeout { .. } => FailureType::Transient,
        FetchError::Network { source, .. } => {
            // A request that cannot be built fails the same way every time.
            if source.is_builder() || is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        FetchError::Decode { .. }
        | FetchError::InvalidUrl { .. }
        | FetchError::InvalidCredential { .. } => FailureType::Permanent,
        FetchError::Other { transient, .. } => {
            if *transient {
                FailureType::Transient
            } else {
                FailureType::Permanent
            }
        }
    }
}

#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,   // Request Timeout
        429 => FailureType::RateLimited, // Too Many Requests
        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}

/// Extracts the server-mandated delay from a rate-limited error.
///
/// Returns `None` unless the error carries a parseable Retry-After header.
#[must_use]
pub fn retry_after_delay(error: &FetchError) -> Option<Duration> {
    match error {
        FetchError::HttpStatus {
            retry_after: Some(value),
            ..
        } => parse_retry_after(value),
        _ => None,
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports integer seconds and HTTP-dates (RFC 7231). Dates in the past
/// yield zero; values above one hour are capped.
///
/// ```
/// use std::time::Duration;
/// use bulkfetch_core::fetch::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };

    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
        Err(_) => Some(Duration::ZERO),
    }
}
