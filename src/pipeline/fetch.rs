//! Content fetching: landing page and document downloads.
//!
//! One [`HttpFetcher`] (and therefore one connection pool) lives for as long
//! as the scheduler does; it is created at startup and dropped on shutdown.
//! Every request is bounded by the configured timeout. The pipeline treats
//! any error from [`Fetcher::fetch`] as "nothing to do this cycle".

use crate::error::WatchError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Retrieves the bytes behind a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, WatchError>;
}

/// `reqwest`-backed fetcher with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, WatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("subwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WatchError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, WatchError> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        if !response.status().is_success() {
            return Err(WatchError::FetchFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(url, e))?;
        info!("Fetched {} ({} bytes)", url, bytes.len());
        Ok(bytes.to_vec())
    }
}

impl HttpFetcher {
    fn classify(&self, url: &str, e: reqwest::Error) -> WatchError {
        if e.is_timeout() {
            WatchError::FetchTimeout {
                url: url.to_string(),
                secs: self.timeout.as_secs(),
            }
        } else {
            WatchError::FetchFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// True if the bytes start with the `%PDF` magic.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}
