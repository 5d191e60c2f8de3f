//! HTTP transport for JSON APIs.
//!
//! This module provides [`HttpClient`], a thin reqwest wrapper that resolves
//! work items against an optional base URL, injects credentials and decodes
//! JSON bodies, plus [`GetApiCall`] / [`GetApiCallFactory`] which adapt it to
//! the [`FetchOperation`] contract used by the pipeline.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderName, HeaderValue, RETRY_AFTER};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::FetchError;
use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::operation::{FetchOperation, FetchOperationFactory};
use crate::source::WorkItem;

/// Credentials attached to every request.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// Sends the token in a request header, e.g. `X-Api-Key: <token>`.
    Header {
        /// Header name.
        name: String,
        /// Token value.
        token: String,
    },

    /// Sends the token as a query parameter, e.g. `?api_key=<token>`.
    QueryParam {
        /// Query parameter name.
        name: String,
        /// Token value.
        token: String,
    },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the token itself.
        match self {
            Self::Header { name, .. } => f
                .debug_struct("Header")
                .field("name", name)
                .field("token", &"<redacted>")
                .finish(),
            Self::QueryParam { name, .. } => f
                .debug_struct("QueryParam")
                .field("name", name)
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// HTTP client for fetching JSON documents.
///
/// Created once and cloned into every operation, sharing the connection pool.
///
/// # Example
///
/// ```no_run
/// use bulkfetch_core::fetch::{Auth, HttpClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()
///     .with_base_url("https://api.example.com/v1")?
///     .with_auth(Auth::QueryParam {
///         name: "api_key".to_string(),
///         token: "secret".to_string(),
///     })?;
/// let body = client.get_json("items/42").await?;
/// println!("{body}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Option<Url>,
    auth: Option<Auth>,
    /// Pre-validated form of [`Auth::Header`].
    auth_header: Option<(HeaderName, HeaderValue)>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 60 seconds
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    #[instrument(level = "debug")]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .user_agent(default_user_agent())
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            base_url: None,
            auth: None,
            auth_header: None,
        }
    }

    /// Resolves relative work items against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] if `base_url` is not an absolute URL.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, FetchError> {
        let mut parsed =
            Url::parse(base_url).map_err(|_| FetchError::invalid_url(base_url.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(FetchError::invalid_url(base_url.to_string()));
        }
        // `Url::join` replaces the last segment unless the path ends in '/'.
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }
        self.base_url = Some(parsed);
        Ok(self)
    }

    /// Attaches credentials to every request.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidCredential`] if a header credential has a
    /// name or token that cannot appear in an HTTP header.
    pub fn with_auth(mut self, auth: Auth) -> Result<Self, FetchError> {
        self.auth_header = match &auth {
            Auth::Header { name, token } => {
                let header_name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| FetchError::invalid_credential(name.as_str(), e))?;
                let mut header_value = HeaderValue::from_str(token)
                    .map_err(|e| FetchError::invalid_credential(name.as_str(), e))?;
                header_value.set_sensitive(true);
                Some((header_name, header_value))
            }
            Auth::QueryParam { .. } => None,
        };
        self.auth = Some(auth);
        Ok(self)
    }

    /// Turns a work item into the absolute URL that will be requested.
    ///
    /// Absolute items are used as-is; relative items are joined onto the
    /// base URL. Query-parameter credentials are appended here.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] if the item is relative and no base
    /// URL is configured, or if joining fails.
    pub fn resolve(&self, item: &str) -> Result<Url, FetchError> {
        let mut url = match (Url::parse(item), &self.base_url) {
            (Ok(absolute), _) => absolute,
            (Err(_), Some(base)) => base
                .join(item.trim_start_matches('/'))
                .map_err(|_| FetchError::invalid_url(item.to_string()))?,
            (Err(_), None) => return Err(FetchError::invalid_url(item.to_string())),
        };

        if let Some(Auth::QueryParam { name, token }) = &self.auth {
            url.query_pairs_mut().append_pair(name, token);
        }
        Ok(url)
    }

    /// Performs a GET and parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if:
    /// - The item cannot be resolved to a URL
    /// - The request fails (network error, timeout)
    /// - The server returns a non-2xx status
    /// - The body is not valid JSON
    #[instrument(skip(self), fields(item = %item))]
    pub async fn get_json(&self, item: &str) -> Result<Value, FetchError> {
        let url = self.resolve(item)?;

        let mut request = self.client.get(url);
        if let Some((name, value)) = &self.auth_header {
            request = request.header(name.clone(), value.clone());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(item)
            } else {
                FetchError::network(item, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            debug!(status = status.as_u16(), "non-success response");
            return Err(FetchError::http_status_with_retry_after(
                item,
                status.as_u16(),
                retry_after,
            ));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(item)
            } else {
                FetchError::network(item, e)
            }
        })?;

        serde_json::from_str(&body).map_err(|e| FetchError::decode(item, e))
    }
}

fn default_user_agent() -> String {
    format!("bulkfetch/{}", env!("CARGO_PKG_VERSION"))
}

/// GET request for one work item, decoded as JSON.
#[derive(Debug, Clone)]
pub struct GetApiCall {
    client: HttpClient,
    url: String,
}

impl GetApiCall {
    /// Creates the operation for `url` (absolute, or relative to the client's base URL).
    #[must_use]
    pub fn new(client: HttpClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FetchOperation for GetApiCall {
    async fn content(&self) -> Result<Value, FetchError> {
        self.client.get_json(&self.url).await
    }
}

/// Builds a [`GetApiCall`] per work item over a shared [`HttpClient`].
#[derive(Debug, Clone)]
pub struct GetApiCallFactory {
    client: HttpClient,
}

impl GetApiCallFactory {
    /// Creates a factory that issues every request through `client`.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

impl FetchOperationFactory for GetApiCallFactory {
    fn create(&self, item: &WorkItem) -> Box<dyn FetchOperation> {
        Box::new(GetApiCall::new(self.client.clone(), item.as_str()))
    }
}
