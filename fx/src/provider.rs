//! Rate feed providers.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::RateCacheConfig;
use crate::error::{FxError, FxResult};

/// Trait for sources of raw rate feed documents.
#[async_trait]
pub trait FeedProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch the current feed document.
    async fn fetch(&self) -> FxResult<Vec<u8>>;
}

/// Fetches the feed over HTTP(S).
pub struct HttpFeedProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedProvider {
    /// Create a provider for `url`. Every request is bounded by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> FxResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FxError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Create a provider from the cache configuration.
    pub fn from_config(config: &RateCacheConfig) -> FxResult<Self> {
        Self::new(config.feed_url.clone(), config.fetch_timeout)
    }

    /// Feed URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedProvider for HttpFeedProvider {
    fn name(&self) -> &str {
        "HTTP"
    }

    async fn fetch(&self) -> FxResult<Vec<u8>> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            warn!(url = %self.url, error = %e, "Feed request failed");
            if e.is_timeout() {
                FxError::Fetch(format!("request to {} timed out", self.url))
            } else {
                FxError::Fetch(format!("request to {} failed: {}", self.url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.url, status = %status, "Feed returned error status");
            return Err(FxError::Fetch(format!(
                "{} returned status {}",
                self.url, status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FxError::Fetch(format!("reading body from {}: {}", self.url, e)))?;

        debug!(url = %self.url, bytes = body.len(), "Fetched rate feed");
        Ok(body.to_vec())
    }
}

/// Provider returning a fixed response, for tests and offline runs.
#[cfg(any(test, feature = "test-utils"))]
pub struct StaticFeedProvider {
    response: parking_lot::Mutex<Result<Vec<u8>, String>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl StaticFeedProvider {
    /// Provider that always returns `body`.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            response: parking_lot::Mutex::new(Ok(body.into())),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Provider whose fetch always fails with `FxError::Fetch`.
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            response: parking_lot::Mutex::new(Err(reason.into())),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Replace the response body.
    pub fn set_body(&self, body: impl Into<Vec<u8>>) {
        *self.response.lock() = Ok(body.into());
    }

    /// Number of fetches performed.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl FeedProvider for StaticFeedProvider {
    fn name(&self) -> &str {
        "STATIC"
    }

    async fn fetch(&self) -> FxResult<Vec<u8>> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.response.lock().clone().map_err(FxError::Fetch)
    }
}
