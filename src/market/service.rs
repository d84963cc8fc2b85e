use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::app_config::env::{CacheConfig, ProviderConfig};
use crate::cache::key::{all_pattern, namespace_pattern, CacheKeyBuilder, Namespace};
use crate::cache::stats::{CacheStats, CacheStatsSnapshot};
use crate::cache::{build_cache_store, CacheStore, Ttl};
use crate::error::MarketError;
use crate::market::gateway::{MarketGateway, PolygonGateway};
use crate::market::single_flight::SingleFlight;
use crate::market::types::{
    CandleQuery, MarketType, NormalizedAsset, NormalizedCandle, NormalizedOverview, SearchResult,
};
use crate::market::validate;
use crate::time_util;

/// Orchestrates cache, gateway and in-flight de-duplication.
///
/// Every piece of state is constructed and injected here; there are no
/// process-wide singletons. The (excluded) API layer talks only to this
/// type.
pub struct MarketDataService {
    cache: Arc<dyn CacheStore>,
    gateway: Arc<dyn MarketGateway>,
    stats: Arc<CacheStats>,
    flight: SingleFlight<String>,
    config: CacheConfig,
}

impl MarketDataService {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        gateway: Arc<dyn MarketGateway>,
        config: CacheConfig,
    ) -> Self {
        Self {
            cache,
            gateway,
            stats: Arc::new(CacheStats::new()),
            flight: SingleFlight::new(),
            config,
        }
    }

    /// Wire up the configured backend and the HTTP gateway.
    pub fn from_config(
        cache_config: CacheConfig,
        provider_config: ProviderConfig,
    ) -> anyhow::Result<Self> {
        let cache = build_cache_store(&cache_config)?;
        let gateway = Arc::new(PolygonGateway::new(provider_config)?);
        Ok(Self::new(cache, gateway, cache_config))
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_config(CacheConfig::from_env()?, ProviderConfig::from_env()?)
    }

    /// Cache-aside read path shared by all five operations.
    ///
    /// Hit: return the cached record. Miss: join or lead the single-flight
    /// slot for the key; the leader calls the gateway and populates the
    /// cache. A `BackendUnavailable` read degrades to a direct gateway call
    /// (still de-duplicated) and skips the write; cached entries that fail
    /// to decode are purged and treated as misses.
    async fn get_or_fetch<T, F, Fut>(
        &self,
        namespace: Namespace,
        key: String,
        fetch: F,
    ) -> Result<T, MarketError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, MarketError>>,
    {
        let mut degraded = false;
        match self.cache.get(&key).await {
            Ok(Some(payload)) => match serde_json::from_str::<T>(&payload) {
                Ok(value) => {
                    self.stats.record_hit();
                    return Ok(value);
                }
                Err(e) => {
                    warn!(key, "cached payload failed to decode, purging: {}", e);
                    let _ = self.cache.delete(&key).await;
                    self.stats.record_miss();
                }
            },
            Ok(None) => self.stats.record_miss(),
            Err(err) => {
                warn!(key, "cache read failed, bypassing cache: {}", err);
                self.stats.record_error();
                degraded = true;
            }
        }

        let ttl = Ttl::Seconds(self.config.ttl_for(namespace));
        let cache = Arc::clone(&self.cache);
        let stats = Arc::clone(&self.stats);
        let payload = self
            .flight
            .run(&key, || {
                let key = key.clone();
                async move {
                    let value = fetch().await?;
                    let payload = serde_json::to_string(&value).map_err(|e| {
                        MarketError::UpstreamDataError(format!("encode cache payload: {}", e))
                    })?;
                    if degraded {
                        // not cached until the backend is confirmed healthy
                        return Ok(payload);
                    }
                    match cache.set(&key, &payload, ttl).await {
                        Ok(()) => stats.record_set(),
                        Err(e) => {
                            warn!(key, "cache write failed: {}", e);
                            stats.record_error();
                        }
                    }
                    Ok(payload)
                }
            })
            .await?;

        serde_json::from_str(&payload)
            .map_err(|e| MarketError::UpstreamDataError(format!("decode cache payload: {}", e)))
    }

    pub async fn get_market_overview(
        &self,
        market: MarketType,
    ) -> Result<NormalizedOverview, MarketError> {
        let key = CacheKeyBuilder::new(&self.config.key_prefix, Namespace::Overview)
            .param("market", market)
            .build();
        let gateway = Arc::clone(&self.gateway);
        self.get_or_fetch(Namespace::Overview, key, move || async move {
            gateway.fetch_overview(market).await
        })
        .await
    }

    pub async fn get_assets(
        &self,
        market: MarketType,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<NormalizedAsset>, MarketError> {
        validate::validate_assets_query(limit, offset)?;
        let key = CacheKeyBuilder::new(&self.config.key_prefix, Namespace::Assets)
            .param("market", market)
            .param("limit", limit)
            .param("offset", offset)
            .build();
        let gateway = Arc::clone(&self.gateway);
        self.get_or_fetch(Namespace::Assets, key, move || async move {
            gateway.fetch_assets(market, limit, offset).await
        })
        .await
    }

    pub async fn get_asset_detail(&self, symbol: &str) -> Result<NormalizedAsset, MarketError> {
        validate::validate_symbol(symbol)?;
        let symbol = symbol.to_ascii_uppercase();
        let key = CacheKeyBuilder::new(&self.config.key_prefix, Namespace::AssetDetail)
            .param("symbol", &symbol)
            .build();
        let gateway = Arc::clone(&self.gateway);
        self.get_or_fetch(Namespace::AssetDetail, key, move || async move {
            gateway.fetch_asset_detail(&symbol).await
        })
        .await
    }

    pub async fn get_candles(
        &self,
        query: CandleQuery,
    ) -> Result<Vec<NormalizedCandle>, MarketError> {
        validate::validate_candle_query(&query)?;
        // key on the resolved range so omitted dates and their explicit
        // equivalents share one cache entry
        let (start, end) = query.resolved_range();
        let key = CacheKeyBuilder::new(&self.config.key_prefix, Namespace::Candles)
            .param("symbol", query.symbol.to_ascii_uppercase())
            .param("timespan", query.timespan)
            .param("multiplier", query.multiplier)
            .param("start", time_util::format_date(start))
            .param("end", time_util::format_date(end))
            .param("limit", query.limit)
            .build();
        let gateway = Arc::clone(&self.gateway);
        self.get_or_fetch(Namespace::Candles, key, move || async move {
            gateway.fetch_candles(&query).await
        })
        .await
    }

    pub async fn search(
        &self,
        query: &str,
        market: Option<MarketType>,
        limit: u32,
    ) -> Result<Vec<SearchResult>, MarketError> {
        validate::validate_search_query(query, limit)?;
        let canonical = query.trim().to_ascii_lowercase();
        let key = CacheKeyBuilder::new(&self.config.key_prefix, Namespace::Search)
            .param("q", &canonical)
            .param_opt("market", market)
            .param("limit", limit)
            .build();
        let gateway = Arc::clone(&self.gateway);
        let owned_query = canonical.clone();
        self.get_or_fetch(Namespace::Search, key, move || async move {
            gateway.search(&owned_query, market, limit).await
        })
        .await
    }

    /// Clear every key under the configured prefix. Returns the number of
    /// entries removed; an empty cache clears to zero.
    pub async fn invalidate_all(&self) -> Result<u64, MarketError> {
        self.stats.record_delete();
        match self
            .cache
            .clear_by_pattern(&all_pattern(&self.config.key_prefix))
            .await
        {
            Ok(count) => Ok(count),
            Err(err) => {
                self.stats.record_error();
                Err(err)
            }
        }
    }

    /// Clear one namespace without touching the others.
    pub async fn invalidate_namespace(&self, namespace: Namespace) -> Result<u64, MarketError> {
        self.stats.record_delete();
        match self
            .cache
            .clear_by_pattern(&namespace_pattern(&self.config.key_prefix, namespace))
            .await
        {
            Ok(count) => Ok(count),
            Err(err) => {
                self.stats.record_error();
                Err(err)
            }
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Operator action; zeroes every counter.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    pub async fn cache_healthy(&self) -> bool {
        self.cache.health_check().await
    }
}
