//! Ratebank FX
//!
//! In-memory table of exchange rates against a single base currency,
//! refreshed from a reference feed, with minor-unit conversion on top.
//!
//! # Features
//!
//! - ECB-style XML feed parsing into exact decimal rates
//! - Whole-table refreshes swapped under a single lock
//! - Fallback to a persisted feed copy when the live feed is malformed
//! - Cross-rate triangulation through the base currency
//!
//! # Example
//!
//! ```rust,ignore
//! use ratebank_fx::{RateCache, RateCacheConfig};
//! use ratebank_common::Currency;
//!
//! let cache = RateCache::from_config(RateCacheConfig::from_env())?;
//! cache.refresh_from_network().await?;
//!
//! // 1.00 USD in yen
//! let yen = cache.convert(100, &Currency::usd(), &Currency::jpy(), 100, 1)?;
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod parser;
pub mod provider;
pub mod storage;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures;

pub use cache::{CacheBookkeeping, RateCache, RefreshOutcome, RefreshSource};
pub use config::RateCacheConfig;
pub use engine::ConversionEngine;
pub use error::{FxError, FxResult};
pub use parser::{FeedSnapshot, RateFeedParser};
pub use provider::{FeedProvider, HttpFeedProvider};
pub use storage::{CacheStorage, FileCacheStorage, MemoryCacheStorage};
pub use store::{RateStore, RateTable};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::StaticFeedProvider;
