//! Rate cache configuration.

use std::time::Duration;

use ratebank_common::Currency;

use crate::error::{FxError, FxResult};

/// Daily reference rates published by the European Central Bank.
pub const DEFAULT_FEED_URL: &str =
    "https://www.ecb.europa.eu/stats/eurofxref/eurofxref-daily.xml";

/// Default location of the persisted feed copy.
pub const DEFAULT_CACHE_PATH: &str = "./lib/offline_rates";

/// Configuration for the rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// URL of the rate feed.
    pub feed_url: String,
    /// Identifier of the persisted feed copy. `None` disables the fallback.
    pub cache_path: Option<String>,
    /// Upper bound on a single feed fetch.
    pub fetch_timeout: Duration,
    /// Currency all stored rates are relative to.
    pub base_currency: Currency,
    /// Write every successfully parsed network feed to `cache_path`.
    pub persist_on_refresh: bool,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            cache_path: Some(DEFAULT_CACHE_PATH.to_string()),
            fetch_timeout: Duration::from_secs(10),
            base_currency: Currency::eur(),
            persist_on_refresh: false,
        }
    }
}

impl RateCacheConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("RATEBANK_FEED_URL") {
            config.feed_url = url;
        }

        if let Ok(path) = std::env::var("RATEBANK_CACHE_PATH") {
            config.cache_path = if path.trim().is_empty() { None } else { Some(path) };
        }

        if let Ok(secs) = std::env::var("RATEBANK_FETCH_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.fetch_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(flag) = std::env::var("RATEBANK_PERSIST_ON_REFRESH") {
            config.persist_on_refresh = matches!(flag.as_str(), "1" | "true" | "yes");
        }

        config
    }

    /// Builder-style override of the cache identifier.
    pub fn with_cache_path(mut self, path: Option<impl Into<String>>) -> Self {
        self.cache_path = path.map(Into::into);
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> FxResult<()> {
        if self.feed_url.trim().is_empty() {
            return Err(FxError::Configuration("Feed URL cannot be empty".to_string()));
        }

        if self.fetch_timeout.is_zero() {
            return Err(FxError::Configuration(
                "Fetch timeout cannot be zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Configured cache identifier, treating an empty string as unset.
    pub fn cache_id(&self) -> Option<&str> {
        self.cache_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
    }
}
