//! # HTTP Retrieval Utilities
//!
//! This module provides a robust, asynchronous API client wrapper around `reqwest`.
//! It includes middleware support for exponential backoff retries and standardized
//! JSON response handling.
//!
//! The retry budget is expressed as a *total attempt count*: a persistently
//! failing endpoint (timeouts, 5xx) is tried exactly `max_attempts` times
//! before the failure surfaces to the caller. Client errors (4xx) are never
//! retried and surface immediately.

use std::time::Duration;

use reqwest::{header::HeaderMap, Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;

/// A standardized container for API responses.
///
/// This struct wraps the deserialized data along with metadata about the
/// HTTP transaction, such as status codes and headers.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

/// An undeserialized API response. The body is kept as the exact bytes the
/// server produced so callers can persist it verbatim.
#[derive(Debug)]
pub struct RawResponse {
    pub body: Vec<u8>,
    pub status: u16,
    pub success: bool,
    pub headers: HeaderMap,
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs, per-request
/// timeouts and automatic retries.
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
}

impl ApiClient {
    /// Creates a new `ApiClient` instance with a retry policy.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL for the API (e.g., "https://api.example.com/v1/").
    /// * `timeout` - Per-request timeout applied by the underlying client.
    /// * `max_attempts` - Total attempts against a transiently failing endpoint.
    /// * `retry_base` - Lower bound of the exponential backoff between attempts.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        max_attempts: u32,
        retry_base: Duration,
    ) -> anyhow::Result<Self> {
        let url = Url::parse(base_url)?;

        // The middleware counts *retries*, so the total attempt count is
        // max_attempts = 1 initial try + (max_attempts - 1) retries.
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(retry_base, retry_base * 16)
            .build_with_max_retries(max_attempts.saturating_sub(1));

        let client = ClientBuilder::new(reqwest::Client::builder().timeout(timeout).build()?)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
        })
    }

    /// Performs a generic HTTP request and deserializes the JSON response.
    ///
    /// This method manages URL joining, query-string construction and JSON
    /// deserialization. Non-2xx responses are captured, not raised: the
    /// caller inspects [`ApiResponse::success`].
    ///
    /// # Errors
    /// Returns an `anyhow::Error` if URL joining or network execution fails
    /// (after the retry budget is spent).
    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        headers: Option<HeaderMap>,
    ) -> anyhow::Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
    {
        let full_url = self.base_url.join(path)?;
        let mut req = self.inner.request(method, full_url);

        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(h) = headers {
            req = req.headers(h);
        }

        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();
        let success = status.is_success();

        if success {
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            // Capture the error body as a string for debugging
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }

    /// Performs a GET request and returns the body bytes untouched.
    ///
    /// Used by the caching layer, which must persist the payload exactly as
    /// the server produced it.
    pub async fn get_bytes(
        &self,
        path: &str,
        query: &[(&str, String)],
        headers: Option<HeaderMap>,
    ) -> anyhow::Result<RawResponse> {
        let full_url = self.base_url.join(path)?;
        let mut req = self.inner.request(Method::GET, full_url);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(h) = headers {
            req = req.headers(h);
        }

        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();
        let success = status.is_success();
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse {
            body,
            status: status.as_u16(),
            success,
            headers: resp_headers,
        })
    }
}
