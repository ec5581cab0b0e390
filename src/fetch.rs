//! HTTP fetching with bounded timeouts and capped retries
//!
//! Every network call the pipeline makes goes through [`HttpFetcher`]; no
//! request can block forever and no item is retried more than
//! `max_retries` times before it is recorded as failed.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during fetching
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}{}", body_suffix(.body))]
    Status { status: u16, body: String },
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("failed to parse URL: {0}")]
    InvalidUrl(String),
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {}", crate::util::truncate_str(body, 200))
    }
}

impl FetchError {
    /// HTTP status code, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Client errors other than 408/429 will not change on retry
    pub fn is_retryable(&self) -> bool {
        match self.status() {
            Some(408) | Some(429) => true,
            Some(code) => !(400..500).contains(&code),
            None => true,
        }
    }
}

/// A JSON response with the headers that came with it
#[derive(Debug, Clone)]
pub struct JsonResponse<T> {
    pub body: T,
    pub headers: HeaderMap,
}

impl<T> JsonResponse<T> {
    /// Integer header value, if present and well-formed
    pub fn header_u64(&self, name: &str) -> Option<u64> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}

/// A downloaded binary asset
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Configuration for the fetcher
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string
    pub user_agent: String,
    /// Whole-request timeout
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: crate::config::DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Thin reqwest wrapper shared by the legacy client and asset downloads
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// GET a URL and decode its JSON body. Non-2xx answers become
    /// [`FetchError::Status`] carrying the response body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<JsonResponse<T>, FetchError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| map_timeout(e, self.config.timeout))?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await.map_err(|e| map_timeout(e, self.config.timeout))?;
        let body = serde_json::from_str(&text).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(JsonResponse { body, headers })
    }

    /// GET a URL and report only whether the server answered at all
    pub async fn probe(&self, url: &str) -> Result<StatusCode, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_timeout(e, self.config.timeout))?;
        Ok(response.status())
    }

    /// Download raw bytes with an explicit per-request timeout
    pub async fn download_bytes(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<Downloaded, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_timeout(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response.bytes().await.map_err(|e| map_timeout(e, timeout))?;

        Ok(Downloaded {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

}

/// Timeouts report the limit that was actually in force for the request
fn map_timeout(err: reqwest::Error, limit: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(limit)
    } else {
        FetchError::Http(err)
    }
}

/// Source of binary assets for the transfer stage
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Download one asset (single attempt; callers own the retry policy)
    async fn download(&self, url: &str) -> Result<Downloaded, FetchError>;
}

/// [`HttpFetcher`] bound to the asset download timeout
#[derive(Debug, Clone)]
pub struct HttpAssetFetcher {
    fetcher: HttpFetcher,
    timeout: Duration,
}

impl HttpAssetFetcher {
    pub fn new(fetcher: HttpFetcher, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn download(&self, url: &str) -> Result<Downloaded, FetchError> {
        self.fetcher.download_bytes(url, self.timeout).await
    }
}

/// Retry policy: linear backoff, capped attempts
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before retry `n` is `base_delay * n`
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Policy that never waits between attempts
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::ZERO)
    }

    /// Delay before the given retry (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * retry
    }
}

/// Run `op` until it succeeds, the error is not retryable, or the policy is
/// exhausted. Returns the last error.
pub async fn retry_with_backoff<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries && err.is_retryable() => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                debug!("attempt {} failed ({}), retrying in {:?}", attempt, err, delay);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(err) => return Err(err),
        }
    }
}
