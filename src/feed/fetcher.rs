use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;

/// Errors that can occur while retrieving the source feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The feed URL was rejected before any request was made
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Limits applied to a single fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_retries: u32,
    pub max_size: usize,
    /// First retry delay; doubles on every further attempt.
    pub backoff: Duration,
    /// Fetch through a raw pass-through proxy: the request goes to
    /// `{proxy_prefix}{percent-encoded feed url}`.
    pub proxy_prefix: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            max_size: 10 * 1024 * 1024,
            backoff: Duration::from_secs(1),
            proxy_prefix: None,
        }
    }
}

impl From<&Config> for FetchOptions {
    fn from(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            max_size: config.max_feed_size,
            proxy_prefix: config.proxy_prefix.clone(),
            ..Self::default()
        }
    }
}

/// Builds the URL actually requested, applying the proxy prefix if any.
pub fn request_url(url: &str, proxy_prefix: Option<&str>) -> String {
    match proxy_prefix {
        Some(prefix) => {
            let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
            format!("{prefix}{encoded}")
        }
        None => url.to_owned(),
    }
}

/// Fetches the raw feed text at `url`.
///
/// # Behavior
///
/// - Each request is bounded by `options.timeout`
/// - HTTP 429 and 5xx responses are retried with exponential backoff, up to
///   `options.max_retries` times; other non-2xx statuses fail immediately
/// - Bodies larger than `options.max_size` are rejected
/// - Truncated bodies (shorter than Content-Length) are retried
/// - Bodies that are not valid UTF-8 are decoded lossily
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    options: &FetchOptions,
) -> Result<String, FetchError> {
    let target = request_url(url, options.proxy_prefix.as_deref());
    let mut retry_count = 0;

    let bytes = loop {
        let response = tokio::time::timeout(options.timeout, client.get(&target).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            if retry_count >= options.max_retries {
                return Err(if status.is_server_error() {
                    FetchError::HttpStatus(status.as_u16())
                } else {
                    FetchError::RateLimited(options.max_retries)
                });
            }

            let delay = options.backoff * 2u32.pow(retry_count);
            tracing::warn!(
                url = %url,
                status = %status,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Feed request failed, retrying after delay"
            );

            tokio::time::sleep(delay).await;
            retry_count += 1;
            continue;
        }

        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        match read_limited_bytes(response, options.max_size).await {
            Ok(bytes) => break bytes,
            Err(FetchError::IncompleteResponse { expected, received }) => {
                if retry_count >= options.max_retries {
                    return Err(FetchError::IncompleteResponse { expected, received });
                }

                let delay = options.backoff * 2u32.pow(retry_count);
                tracing::debug!(
                    url = %url,
                    expected = expected,
                    received = received,
                    attempt = retry_count + 1,
                    "Retrying incomplete download"
                );

                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }
            Err(e) => return Err(e),
        }
    };

    tracing::debug!(url = %url, bytes = bytes.len(), "Fetched feed");

    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(e) => {
            tracing::warn!(url = %url, "Feed body is not valid UTF-8, decoding lossily");
            Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
