//! Error types for the fetch module.
//!
//! This module defines structured errors for a single fetch-and-parse
//! attempt, carrying enough context (URL, status, Retry-After) for the retry
//! policy to classify them.

use thiserror::Error;

/// Errors that can occur while fetching and decoding one resource.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, reset, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-2xx response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// The response body was not valid JSON.
    #[error("invalid JSON body from {url}: {source}")]
    Decode {
        /// The URL whose body failed to parse.
        url: String,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The work item could not be turned into a valid URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// A credential cannot be sent as configured (e.g. an invalid header name).
    #[error("invalid credential `{name}`: {reason}")]
    InvalidCredential {
        /// The header or query parameter name.
        name: String,
        /// Why the credential was rejected.
        reason: String,
    },

    /// Failure reported by a custom fetch operation.
    #[error("fetch of {url} failed: {message}")]
    Other {
        /// The work item being fetched.
        url: String,
        /// Human-readable failure description.
        message: String,
        /// Whether retrying may help.
        transient: bool,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a JSON decode error.
    pub fn decode(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid credential error.
    pub fn invalid_credential(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidCredential {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a retryable failure for custom operations.
    pub fn transient(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other {
            url: url.into(),
            message: message.into(),
            transient: true,
        }
    }

    /// Creates a non-retryable failure for custom operations.
    pub fn permanent(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other {
            url: url.into(),
            message: message.into(),
            transient: false,
        }
    }

    /// Returns the URL or work item this error refers to.
    ///
    /// For [`FetchError::InvalidCredential`] this is the credential name.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Network { url, .. }
            | Self::Timeout { url }
            | Self::HttpStatus { url, .. }
            | Self::Decode { url, .. }
            | Self::InvalidUrl { url }
            | Self::Other { url, .. } => url,
            Self::InvalidCredential { name, .. } => name,
        }
    }

    /// Returns the HTTP status code, if this is a status error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        let error = FetchError::http_status("https://api.example.com/items/1", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("https://api.example.com/items/1"));
        assert_eq!(error.status(), Some(503));
    }

    #[test]
    fn test_http_status_with_retry_after_keeps_header() {
        let error = FetchError::http_status_with_retry_after(
            "https://api.example.com",
            429,
            Some("120".to_string()),
        );
        assert!(matches!(
            error,
            FetchError::HttpStatus { retry_after: Some(ref value), .. } if value == "120"
        ));
    }

    #[test]
    fn test_timeout_display() {
        let error = FetchError::timeout("https://api.example.com/slow");
        assert_eq!(error.to_string(), "timeout fetching https://api.example.com/slow");
        assert_eq!(error.status(), None);
    }

    #[test]
    fn test_decode_display_contains_url() {
        let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error = FetchError::decode("https://api.example.com/bad", source);
        assert!(error.to_string().starts_with("invalid JSON body from https://api.example.com/bad"));
    }

    #[test]
    fn test_url_accessor_covers_variants() {
        assert_eq!(FetchError::invalid_url("nope").url(), "nope");
        assert_eq!(FetchError::transient("item-1", "boom").url(), "item-1");
        assert_eq!(FetchError::permanent("item-2", "gone").url(), "item-2");
        assert_eq!(FetchError::invalid_credential("X-Key", "bad").url(), "X-Key");
    }

    #[test]
    fn test_invalid_credential_display_omits_token() {
        let error = FetchError::invalid_credential("X Api Key", "invalid HTTP header name");
        assert_eq!(
            error.to_string(),
            "invalid credential `X Api Key`: invalid HTTP header name"
        );
    }
}
