//! Rate cache: refresh orchestration and the persisted-feed fallback.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use ratebank_common::{Currency, CurrencyRegistry, IsoCurrencyRegistry, Money};
use tracing::{debug, info, instrument, warn};

use crate::config::RateCacheConfig;
use crate::engine::ConversionEngine;
use crate::error::{FxError, FxResult};
use crate::parser::{FeedSnapshot, RateFeedParser};
use crate::provider::{FeedProvider, HttpFeedProvider};
use crate::storage::{CacheStorage, FileCacheStorage};
use crate::store::RateStore;

/// Where the rates of a refresh came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshSource {
    /// Live feed.
    Network,
    /// Persisted copy of an earlier feed.
    PersistedCache,
    /// Feed content handed in by the caller.
    Supplied,
}

/// Result of a successful refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    pub source: RefreshSource,
    /// Timestamp embedded in the applied feed.
    pub as_of: DateTime<Utc>,
    /// Number of feed entries applied.
    pub currencies: usize,
    /// Table generation installed by this refresh.
    pub generation: u64,
}

/// Refresh timestamps.
///
/// Tagged with the table generation they describe; a refresh that lost
/// the race to a newer one does not overwrite them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheBookkeeping {
    /// Table generation installed by the recorded refresh. 0 = none yet.
    pub generation: u64,
    /// Local wall-clock time of the last successful refresh.
    pub last_updated: Option<DateTime<Utc>>,
    /// Timestamp carried by the feed of the last successful refresh.
    pub rates_updated_at: Option<DateTime<Utc>>,
}

/// Owns the rate table and keeps it fresh.
///
/// Construct one per host process and share it behind an `Arc`.
pub struct RateCache {
    store: Arc<RateStore>,
    engine: ConversionEngine,
    feed: Arc<dyn FeedProvider>,
    storage: Arc<dyn CacheStorage>,
    config: RateCacheConfig,
    bookkeeping: RwLock<CacheBookkeeping>,
    last_feed: Mutex<Option<(u64, Arc<Vec<u8>>)>>,
}

impl RateCache {
    /// Create a cache with the ISO currency registry.
    pub fn new(
        config: RateCacheConfig,
        feed: Arc<dyn FeedProvider>,
        storage: Arc<dyn CacheStorage>,
    ) -> FxResult<Self> {
        config.validate()?;

        let store = Arc::new(RateStore::new(config.base_currency.clone()));
        let engine = ConversionEngine::new(Arc::clone(&store), Arc::new(IsoCurrencyRegistry::new()));

        Ok(Self {
            store,
            engine,
            feed,
            storage,
            config,
            bookkeeping: RwLock::new(CacheBookkeeping::default()),
            last_feed: Mutex::new(None),
        })
    }

    /// Create a cache fetching over HTTP and persisting to files.
    pub fn from_config(config: RateCacheConfig) -> FxResult<Self> {
        let feed = Arc::new(HttpFeedProvider::from_config(&config)?);
        Self::new(config, feed, Arc::new(FileCacheStorage::new()))
    }

    /// Replace the currency registry used for subunit ratios.
    pub fn with_registry(mut self, registry: Arc<dyn CurrencyRegistry>) -> Self {
        self.engine = ConversionEngine::new(Arc::clone(&self.store), registry);
        self
    }

    /// The rate table.
    pub fn store(&self) -> &Arc<RateStore> {
        &self.store
    }

    /// The conversion engine over this cache's table.
    pub fn engine(&self) -> &ConversionEngine {
        &self.engine
    }

    /// Active configuration.
    pub fn config(&self) -> &RateCacheConfig {
        &self.config
    }

    /// Copy of the refresh timestamps.
    pub fn bookkeeping(&self) -> CacheBookkeeping {
        self.bookkeeping.read().clone()
    }

    /// When the table was last refreshed, by the local clock.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.bookkeeping.read().last_updated
    }

    /// Timestamp embedded in the feed currently applied.
    pub fn rates_updated_at(&self) -> Option<DateTime<Utc>> {
        self.bookkeeping.read().rates_updated_at
    }

    /// Fetch and apply the live feed.
    ///
    /// A feed that fails to parse degrades to the persisted copy. Fetch
    /// failures are returned as-is. A cache identifier must be configured.
    #[instrument(skip(self), fields(provider = self.feed.name()))]
    pub async fn refresh_from_network(&self) -> FxResult<RefreshOutcome> {
        let cache_id = self.require_cache_id()?.to_string();

        let bytes = self.feed.fetch().await?;

        match RateFeedParser::parse(&bytes) {
            Ok(snapshot) => {
                let outcome = self.apply(&snapshot, RefreshSource::Network);
                let bytes = Arc::new(bytes);
                self.record_feed(outcome.generation, Arc::clone(&bytes));

                if self.config.persist_on_refresh {
                    if let Err(e) = self.storage.write(&cache_id, &bytes).await {
                        warn!(cache = %cache_id, error = %e, "Failed to persist fetched feed");
                    }
                }

                Ok(outcome)
            }
            Err(e) if e.is_fallback_trigger() => {
                warn!(error = %e, cache = %cache_id, "Live feed unusable, falling back to persisted copy");
                self.refresh_from_persisted_cache().await
            }
            Err(e) => Err(e),
        }
    }

    /// Apply the feed copy held in cache storage.
    #[instrument(skip(self))]
    pub async fn refresh_from_persisted_cache(&self) -> FxResult<RefreshOutcome> {
        let cache_id = self.require_cache_id()?;
        let bytes = self.storage.read(cache_id).await?;
        let snapshot = RateFeedParser::parse(&bytes)?;
        Ok(self.apply(&snapshot, RefreshSource::PersistedCache))
    }

    /// Apply feed content supplied by the caller. Parse errors are returned.
    pub fn refresh_from_str(&self, content: &str) -> FxResult<RefreshOutcome> {
        self.refresh_from_bytes(content.as_bytes())
    }

    /// Apply raw feed bytes supplied by the caller.
    pub fn refresh_from_bytes(&self, bytes: &[u8]) -> FxResult<RefreshOutcome> {
        let snapshot = RateFeedParser::parse(bytes)?;
        Ok(self.apply(&snapshot, RefreshSource::Supplied))
    }

    /// Write the most recently fetched feed to `destination`.
    ///
    /// Fetches the feed first if nothing has been fetched yet. Only feeds
    /// that parse are written.
    #[instrument(skip(self))]
    pub async fn persist_current_feed(&self, destination: &str) -> FxResult<()> {
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(FxError::InvalidCache(
                "no destination given for persisted feed".to_string(),
            ));
        }

        let current = self.last_feed.lock().as_ref().map(|(_, bytes)| Arc::clone(bytes));
        let bytes = match current {
            Some(bytes) => bytes,
            None => {
                debug!("No feed fetched yet, fetching before persisting");
                let fetched = self.feed.fetch().await?;
                RateFeedParser::parse(&fetched)?;
                let fetched = Arc::new(fetched);
                // Not applied to the table, so any refreshed feed supersedes it.
                self.record_feed(0, Arc::clone(&fetched));
                fetched
            }
        };

        self.storage.write(destination, &bytes).await?;
        info!(destination, bytes = bytes.len(), "Persisted rate feed");
        Ok(())
    }

    /// Read back the persisted feed copy.
    pub async fn export_persisted_feed(&self) -> FxResult<Vec<u8>> {
        let cache_id = self.require_cache_id()?;
        self.storage.read(cache_id).await
    }

    /// Convert minor units between currencies with explicit subunit ratios.
    pub fn convert(
        &self,
        amount: i64,
        from: &Currency,
        to: &Currency,
        from_ratio: u32,
        to_ratio: u32,
    ) -> FxResult<i64> {
        self.engine.convert(amount, from, to, from_ratio, to_ratio)
    }

    /// Convert a [`Money`] value into `to`.
    pub fn exchange(&self, money: &Money, to: &Currency) -> FxResult<Money> {
        self.engine.exchange(money, to)
    }

    fn require_cache_id(&self) -> FxResult<&str> {
        self.config
            .cache_id()
            .ok_or_else(|| FxError::InvalidCache("no cache identifier configured".to_string()))
    }

    fn apply(&self, snapshot: &FeedSnapshot, source: RefreshSource) -> RefreshOutcome {
        let generation = self.store.replace_all(snapshot);

        if !self.record_refresh(generation, snapshot.as_of) {
            debug!(generation, "Newer refresh already recorded");
        }

        info!(
            source = ?source,
            currencies = snapshot.len(),
            as_of = %snapshot.as_of,
            generation,
            "Rates refreshed"
        );

        RefreshOutcome {
            source,
            as_of: snapshot.as_of,
            currencies: snapshot.len(),
            generation,
        }
    }

    /// Record the timestamps of the refresh that installed `generation`.
    ///
    /// Returns false, leaving the bookkeeping untouched, when a newer
    /// generation has already been recorded.
    fn record_refresh(&self, generation: u64, as_of: DateTime<Utc>) -> bool {
        let mut bookkeeping = self.bookkeeping.write();
        if generation <= bookkeeping.generation {
            return false;
        }

        *bookkeeping = CacheBookkeeping {
            generation,
            last_updated: Some(Utc::now()),
            rates_updated_at: Some(as_of),
        };
        true
    }

    /// Remember the raw feed behind `generation` unless a newer one is held.
    fn record_feed(&self, generation: u64, bytes: Arc<Vec<u8>>) {
        let mut last_feed = self.last_feed.lock();
        match last_feed.as_ref() {
            Some((held, _)) if *held > generation => {}
            _ => *last_feed = Some((generation, bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{feed_with, SAMPLE_FEED};
    use crate::provider::StaticFeedProvider;
    use crate::storage::MemoryCacheStorage;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const CACHE_ID: &str = "lib/offline_rates";
    const MALFORMED: &str = "<html><body>502 Bad Gateway</body></html>";

    fn config() -> RateCacheConfig {
        RateCacheConfig::default().with_cache_path(Some(CACHE_ID))
    }

    fn cache_with(
        config: RateCacheConfig,
        feed: &Arc<StaticFeedProvider>,
        storage: &Arc<MemoryCacheStorage>,
    ) -> RateCache {
        RateCache::new(config, feed.clone(), storage.clone()).unwrap()
    }

    fn persisted_feed() -> String {
        feed_with("2024-01-04", &[("USD", "1.1"), ("JPY", "130")])
    }

    #[tokio::test]
    async fn test_refresh_from_network() {
        let feed = Arc::new(StaticFeedProvider::new(SAMPLE_FEED));
        let storage = Arc::new(MemoryCacheStorage::new());
        let cache = cache_with(config(), &feed, &storage);

        assert_eq!(cache.last_updated(), None);

        let outcome = cache.refresh_from_network().await.unwrap();

        assert_eq!(outcome.source, RefreshSource::Network);
        assert_eq!(outcome.currencies, 6);
        assert_eq!(outcome.generation, 1);
        assert_eq!(cache.store().get(&Currency::usd()), Some(dec!(1.0921)));
        assert_eq!(
            cache.rates_updated_at(),
            Some(Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap())
        );
        assert!(cache.last_updated().is_some());
        assert!(!storage.contains(CACHE_ID));
    }

    #[tokio::test]
    async fn test_malformed_feed_falls_back_to_persisted_copy() {
        let feed = Arc::new(StaticFeedProvider::new(MALFORMED));
        let storage = Arc::new(MemoryCacheStorage::new());
        storage.write(CACHE_ID, persisted_feed().as_bytes()).await.unwrap();
        let cache = cache_with(config(), &feed, &storage);

        let outcome = cache.refresh_from_network().await.unwrap();

        assert_eq!(outcome.source, RefreshSource::PersistedCache);
        let table = cache.store().snapshot();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(&Currency::usd()), Some(dec!(1.1)));
        assert_eq!(table.get(&Currency::jpy()), Some(dec!(130)));
        assert_eq!(table.get(&Currency::eur()), Some(Decimal::ONE));
        assert_eq!(
            cache.rates_updated_at(),
            Some(Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_malformed_feed_without_persisted_copy_fails() {
        let feed = Arc::new(StaticFeedProvider::new(MALFORMED));
        let storage = Arc::new(MemoryCacheStorage::new());
        let cache = cache_with(config(), &feed, &storage);
        cache.refresh_from_str(&persisted_feed()).unwrap();
        let before = cache.bookkeeping();

        let result = cache.refresh_from_network().await;

        assert!(matches!(result, Err(FxError::MissingCache(_))));
        assert_eq!(cache.store().get(&Currency::jpy()), Some(dec!(130)));
        assert_eq!(cache.bookkeeping(), before);
    }

    #[tokio::test]
    async fn test_malformed_feed_and_malformed_persisted_copy() {
        let feed = Arc::new(StaticFeedProvider::new(MALFORMED));
        let storage = Arc::new(MemoryCacheStorage::new());
        storage.write(CACHE_ID, b"not a feed").await.unwrap();
        let cache = cache_with(config(), &feed, &storage);

        let result = cache.refresh_from_network().await;

        assert!(matches!(result, Err(FxError::Parse(_))));
        assert!(!cache.store().is_populated());
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_fall_back() {
        let feed = Arc::new(StaticFeedProvider::unreachable("connection refused"));
        let storage = Arc::new(MemoryCacheStorage::new());
        storage.write(CACHE_ID, persisted_feed().as_bytes()).await.unwrap();
        let cache = cache_with(config(), &feed, &storage);

        let result = cache.refresh_from_network().await;

        assert!(matches!(result, Err(FxError::Fetch(_))));
        assert!(!cache.store().is_populated());
        assert_eq!(cache.last_updated(), None);
    }

    #[tokio::test]
    async fn test_network_refresh_without_cache_configured() {
        let feed = Arc::new(StaticFeedProvider::unreachable("no route to host"));
        let storage = Arc::new(MemoryCacheStorage::new());
        let cache = cache_with(config().with_cache_path(None::<String>), &feed, &storage);

        let result = cache.refresh_from_network().await;

        assert!(matches!(result, Err(FxError::InvalidCache(_))));
        assert_eq!(feed.calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_from_persisted_cache() {
        let feed = Arc::new(StaticFeedProvider::new(SAMPLE_FEED));
        let storage = Arc::new(MemoryCacheStorage::new());
        let cache = cache_with(config(), &feed, &storage);

        assert!(matches!(
            cache.refresh_from_persisted_cache().await,
            Err(FxError::MissingCache(_))
        ));

        storage.write(CACHE_ID, persisted_feed().as_bytes()).await.unwrap();
        let outcome = cache.refresh_from_persisted_cache().await.unwrap();

        assert_eq!(outcome.source, RefreshSource::PersistedCache);
        assert_eq!(cache.store().get(&Currency::usd()), Some(dec!(1.1)));
        assert_eq!(feed.calls(), 0);
    }

    #[tokio::test]
    async fn test_persisted_cache_requires_identifier() {
        let feed = Arc::new(StaticFeedProvider::new(SAMPLE_FEED));
        let storage = Arc::new(MemoryCacheStorage::new());
        let cache = cache_with(config().with_cache_path(Some("")), &feed, &storage);

        assert!(matches!(
            cache.refresh_from_persisted_cache().await,
            Err(FxError::InvalidCache(_))
        ));
        assert!(matches!(
            cache.export_persisted_feed().await,
            Err(FxError::InvalidCache(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_from_str_does_not_fall_back() {
        let feed = Arc::new(StaticFeedProvider::new(SAMPLE_FEED));
        let storage = Arc::new(MemoryCacheStorage::new());
        storage.write(CACHE_ID, persisted_feed().as_bytes()).await.unwrap();
        let cache = cache_with(config(), &feed, &storage);

        let result = cache.refresh_from_str(MALFORMED);

        assert!(matches!(result, Err(FxError::Parse(_))));
        assert!(!cache.store().is_populated());
        assert_eq!(cache.last_updated(), None);
    }

    #[tokio::test]
    async fn test_refresh_from_str() {
        let feed = Arc::new(StaticFeedProvider::new(SAMPLE_FEED));
        let storage = Arc::new(MemoryCacheStorage::new());
        let cache = cache_with(config(), &feed, &storage);

        let outcome = cache.refresh_from_str(&persisted_feed()).unwrap();

        assert_eq!(outcome.source, RefreshSource::Supplied);
        assert_eq!(
            cache.convert(100, &Currency::usd(), &Currency::jpy(), 100, 1).unwrap(),
            118
        );
        assert_eq!(
            cache
                .exchange(&Money::new(100, Currency::usd()), &Currency::jpy())
                .unwrap(),
            Money::new(118, Currency::jpy())
        );
        assert_eq!(feed.calls(), 0);
    }

    #[tokio::test]
    async fn test_persist_current_feed_after_refresh() {
        let feed = Arc::new(StaticFeedProvider::new(SAMPLE_FEED));
        let storage = Arc::new(MemoryCacheStorage::new());
        let cache = cache_with(config(), &feed, &storage);

        cache.refresh_from_network().await.unwrap();
        cache.persist_current_feed(CACHE_ID).await.unwrap();

        assert_eq!(feed.calls(), 1);
        assert_eq!(
            cache.export_persisted_feed().await.unwrap(),
            SAMPLE_FEED.as_bytes()
        );
    }

    #[tokio::test]
    async fn test_persist_current_feed_fetches_when_needed() {
        let feed = Arc::new(StaticFeedProvider::new(SAMPLE_FEED));
        let storage = Arc::new(MemoryCacheStorage::new());
        let cache = cache_with(config(), &feed, &storage);

        cache.persist_current_feed("backup/rates.xml").await.unwrap();

        assert_eq!(feed.calls(), 1);
        assert_eq!(
            storage.read("backup/rates.xml").await.unwrap(),
            SAMPLE_FEED.as_bytes()
        );
        assert!(!cache.store().is_populated());
    }

    #[tokio::test]
    async fn test_persist_current_feed_rejects_empty_destination() {
        let feed = Arc::new(StaticFeedProvider::new(SAMPLE_FEED));
        let storage = Arc::new(MemoryCacheStorage::new());
        let cache = cache_with(config(), &feed, &storage);

        let result = cache.persist_current_feed(" ").await;

        assert!(matches!(result, Err(FxError::InvalidCache(_))));
        assert_eq!(feed.calls(), 0);
    }

    #[tokio::test]
    async fn test_persist_current_feed_never_writes_malformed_feed() {
        let feed = Arc::new(StaticFeedProvider::new(MALFORMED));
        let storage = Arc::new(MemoryCacheStorage::new());
        let cache = cache_with(config(), &feed, &storage);

        let result = cache.persist_current_feed(CACHE_ID).await;

        assert!(matches!(result, Err(FxError::Parse(_))));
        assert!(!storage.contains(CACHE_ID));
    }

    #[tokio::test]
    async fn test_persist_on_refresh() {
        let feed = Arc::new(StaticFeedProvider::new(SAMPLE_FEED));
        let storage = Arc::new(MemoryCacheStorage::new());
        let mut config = config();
        config.persist_on_refresh = true;
        let cache = cache_with(config, &feed, &storage);

        cache.refresh_from_network().await.unwrap();

        assert_eq!(storage.read(CACHE_ID).await.unwrap(), SAMPLE_FEED.as_bytes());

        // The persisted copy now backs the next malformed fetch.
        feed.set_body(MALFORMED);
        let outcome = cache.refresh_from_network().await.unwrap();
        assert_eq!(outcome.source, RefreshSource::PersistedCache);
        assert_eq!(cache.store().get(&Currency::usd()), Some(dec!(1.0921)));
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let feed = Arc::new(StaticFeedProvider::new(SAMPLE_FEED));
        let storage = Arc::new(MemoryCacheStorage::new());
        let mut config = config();
        config.feed_url = String::new();

        assert!(matches!(
            RateCache::new(config, feed, storage),
            Err(FxError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_out_of_order_refresh_records_follow_the_table() {
        let feed = Arc::new(StaticFeedProvider::new(SAMPLE_FEED));
        let storage = Arc::new(MemoryCacheStorage::new());
        let cache = cache_with(config(), &feed, &storage);

        let older = RateFeedParser::parse_str(&persisted_feed()).unwrap();
        let newer = RateFeedParser::parse_str(SAMPLE_FEED).unwrap();
        let first = cache.store().replace_all(&older);
        let second = cache.store().replace_all(&newer);

        // The older refresh finishes its bookkeeping last.
        assert!(cache.record_refresh(second, newer.as_of));
        assert!(!cache.record_refresh(first, older.as_of));
        cache.record_feed(second, Arc::new(SAMPLE_FEED.as_bytes().to_vec()));
        cache.record_feed(first, Arc::new(persisted_feed().into_bytes()));

        assert_eq!(cache.store().get(&Currency::usd()), Some(dec!(1.0921)));
        assert_eq!(cache.bookkeeping().generation, cache.store().snapshot().generation());
        assert_eq!(
            cache.rates_updated_at(),
            Some(Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap())
        );

        cache.persist_current_feed(CACHE_ID).await.unwrap();
        assert_eq!(storage.read(CACHE_ID).await.unwrap(), SAMPLE_FEED.as_bytes());
        assert_eq!(feed.calls(), 0);
    }

    #[test]
    fn test_refresh_records_generation() {
        let feed = Arc::new(StaticFeedProvider::new(SAMPLE_FEED));
        let storage = Arc::new(MemoryCacheStorage::new());
        let cache = cache_with(config(), &feed, &storage);

        assert_eq!(cache.bookkeeping(), CacheBookkeeping::default());

        cache.refresh_from_str(&persisted_feed()).unwrap();
        let outcome = cache.refresh_from_str(SAMPLE_FEED).unwrap();

        assert_eq!(cache.bookkeeping().generation, outcome.generation);
        assert_eq!(outcome.generation, 2);
        assert_eq!(cache.rates_updated_at(), Some(outcome.as_of));
    }

    #[test]
    fn test_conversions_during_concurrent_refresh() {
        let feed = Arc::new(StaticFeedProvider::new(SAMPLE_FEED));
        let storage = Arc::new(MemoryCacheStorage::new());
        let cache = Arc::new(cache_with(config(), &feed, &storage));

        let cheap = feed_with("2024-01-04", &[("USD", "1.1"), ("JPY", "130")]);
        let dear = feed_with("2024-01-05", &[("USD", "2.2"), ("JPY", "260")]);
        cache.refresh_from_str(&cheap).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        let jpy = cache
                            .convert(100, &Currency::usd(), &Currency::jpy(), 100, 1)
                            .unwrap();
                        // Both feeds price USD/JPY identically; mixing them
                        // would give 59 or 236.
                        assert_eq!(jpy, 118);
                    }
                })
            })
            .collect();

        for i in 0..500 {
            cache
                .refresh_from_str(if i % 2 == 0 { &dear } else { &cheap })
                .unwrap();
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
