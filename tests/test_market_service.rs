use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use market_data_cache::app_config::env::CacheConfig;
use market_data_cache::cache::memory::MemoryCacheStore;
use market_data_cache::cache::{CacheStore, Ttl};
use market_data_cache::market::gateway::MarketGateway;
use market_data_cache::{
    CandleQuery, MarketDataService, MarketError, MarketType, Namespace, NormalizedAsset,
    NormalizedCandle, NormalizedOverview, SearchResult, Timespan,
};

/// Gateway double: counts calls per endpoint family and serves fixed data.
#[derive(Default)]
struct StubGateway {
    overview_calls: AtomicUsize,
    assets_calls: AtomicUsize,
    detail_calls: AtomicUsize,
    candle_calls: AtomicUsize,
    search_calls: AtomicUsize,
    delay: Option<Duration>,
    fail_with: Option<MarketError>,
}

impl StubGateway {
    fn slow(delay_ms: u64) -> Self {
        Self {
            delay: Some(Duration::from_millis(delay_ms)),
            ..Default::default()
        }
    }

    fn failing(err: MarketError) -> Self {
        Self {
            fail_with: Some(err),
            ..Default::default()
        }
    }

    async fn gate(&self) -> Result<(), MarketError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn candles(n: u32) -> Vec<NormalizedCandle> {
        (0..n as i64)
            .map(|i| NormalizedCandle {
                ts: i * 60_000,
                open: 100.0 + i as f64,
                high: 101.0 + i as f64,
                low: 99.0 + i as f64,
                close: 100.5 + i as f64,
                volume: 1000.0,
            })
            .collect()
    }
}

#[async_trait]
impl MarketGateway for StubGateway {
    async fn fetch_overview(&self, market: MarketType) -> Result<NormalizedOverview, MarketError> {
        self.overview_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        Ok(NormalizedOverview {
            market,
            total_assets: 42,
            last_updated: Utc::now(),
            top_gainers: vec![],
            top_losers: vec![],
            most_active: vec![],
        })
    }

    async fn fetch_assets(
        &self,
        market: MarketType,
        limit: u32,
        _offset: u32,
    ) -> Result<Vec<NormalizedAsset>, MarketError> {
        self.assets_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        Ok((0..limit)
            .map(|i| NormalizedAsset {
                symbol: format!("S{}", i),
                name: format!("S{}", i),
                market,
                currency: "USD".into(),
                active: true,
                price: Some(10.0),
                change: None,
                change_percent: None,
                volume: Some(100),
                description: None,
                market_cap: None,
                primary_exchange: None,
                homepage_url: None,
            })
            .collect())
    }

    async fn fetch_asset_detail(&self, symbol: &str) -> Result<NormalizedAsset, MarketError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        Ok(NormalizedAsset {
            symbol: symbol.to_string(),
            name: "Stub Corp".into(),
            market: MarketType::Stocks,
            currency: "USD".into(),
            active: true,
            price: None,
            change: None,
            change_percent: None,
            volume: None,
            description: Some("stub".into()),
            market_cap: Some(1.0e9),
            primary_exchange: None,
            homepage_url: None,
        })
    }

    async fn fetch_candles(
        &self,
        query: &CandleQuery,
    ) -> Result<Vec<NormalizedCandle>, MarketError> {
        self.candle_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        Ok(Self::candles(query.limit))
    }

    async fn search(
        &self,
        query: &str,
        market: Option<MarketType>,
        _limit: u32,
    ) -> Result<Vec<SearchResult>, MarketError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        Ok(vec![SearchResult {
            symbol: query.to_ascii_uppercase(),
            name: "Stub".into(),
            market: market.unwrap_or(MarketType::Stocks),
            currency: "USD".into(),
            active: true,
        }])
    }
}

/// Cache double that reports the backend as down on every operation.
struct DownCacheStore;

#[async_trait]
impl CacheStore for DownCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, MarketError> {
        Err(MarketError::BackendUnavailable("connection refused".into()))
    }
    async fn set(&self, _key: &str, _value: &str, _ttl: Ttl) -> Result<(), MarketError> {
        Err(MarketError::BackendUnavailable("connection refused".into()))
    }
    async fn delete(&self, _key: &str) -> Result<(), MarketError> {
        Err(MarketError::BackendUnavailable("connection refused".into()))
    }
    async fn clear_by_pattern(&self, _pattern: &str) -> Result<u64, MarketError> {
        Err(MarketError::BackendUnavailable("connection refused".into()))
    }
    async fn health_check(&self) -> bool {
        false
    }
}

/// Cache double whose reads work but every write is refused.
struct ReadOnlyCacheStore {
    inner: MemoryCacheStore,
}

#[async_trait]
impl CacheStore for ReadOnlyCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, MarketError> {
        self.inner.get(key).await
    }
    async fn set(&self, _key: &str, _value: &str, _ttl: Ttl) -> Result<(), MarketError> {
        Err(MarketError::BackendUnavailable("write refused".into()))
    }
    async fn delete(&self, key: &str) -> Result<(), MarketError> {
        self.inner.delete(key).await
    }
    async fn clear_by_pattern(&self, pattern: &str) -> Result<u64, MarketError> {
        self.inner.clear_by_pattern(pattern).await
    }
    async fn health_check(&self) -> bool {
        true
    }
}

fn service_with(gateway: Arc<StubGateway>) -> MarketDataService {
    let cache = Arc::new(MemoryCacheStore::new(Duration::from_secs(300)));
    MarketDataService::new(cache, gateway, CacheConfig::default())
}

#[tokio::test]
async fn candles_second_call_within_ttl_hits_cache() -> anyhow::Result<()> {
    let gateway = Arc::new(StubGateway::default());
    let service = service_with(Arc::clone(&gateway));

    let query = CandleQuery::new("AAPL")
        .timespan(Timespan::Day)
        .multiplier(1)
        .limit(100);

    let first = service.get_candles(query.clone()).await?;
    assert_eq!(first.len(), 100);
    assert!(first.windows(2).all(|w| w[0].ts < w[1].ts));
    assert_eq!(gateway.candle_calls.load(Ordering::SeqCst), 1);

    let second = service.get_candles(query).await?;
    assert_eq!(second, first);
    // served from cache, zero extra gateway calls
    assert_eq!(gateway.candle_calls.load(Ordering::SeqCst), 1);

    let stats = service.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.sets, 1);
    assert_eq!(stats.hit_rate_percent, 50.0);
    Ok(())
}

#[tokio::test]
async fn concurrent_misses_collapse_to_one_gateway_call() -> anyhow::Result<()> {
    let gateway = Arc::new(StubGateway::slow(80));
    let service = Arc::new(service_with(Arc::clone(&gateway)));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .get_candles(CandleQuery::new("AAPL").limit(50))
                .await
        }));
    }

    let mut results = Vec::new();
    for joined in futures::future::join_all(handles).await {
        results.push(joined??);
    }
    let first = &results[0];
    assert!(results.iter().all(|r| r == first));
    assert_eq!(gateway.candle_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn gateway_failure_shared_by_all_waiters_and_not_cached() -> anyhow::Result<()> {
    let gateway = Arc::new(StubGateway {
        delay: Some(Duration::from_millis(50)),
        fail_with: Some(MarketError::ProviderUnavailable("503".into())),
        ..Default::default()
    });
    let service = Arc::new(service_with(Arc::clone(&gateway)));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(
            async move { service.get_market_overview(MarketType::Stocks).await },
        ));
    }
    for handle in handles {
        let err = handle.await?.unwrap_err();
        assert_eq!(err, MarketError::ProviderUnavailable("503".into()));
    }
    assert_eq!(gateway.overview_calls.load(Ordering::SeqCst), 1);
    // a failure must never populate the cache
    assert_eq!(service.stats().sets, 0);
    Ok(())
}

#[tokio::test]
async fn backend_down_degrades_to_direct_gateway_calls() -> anyhow::Result<()> {
    let gateway = Arc::new(StubGateway::default());
    let service = MarketDataService::new(
        Arc::new(DownCacheStore),
        Arc::clone(&gateway) as Arc<dyn MarketGateway>,
        CacheConfig::default(),
    );

    let overview = service.get_market_overview(MarketType::Stocks).await?;
    assert_eq!(overview.total_assets, 42);
    assert_eq!(gateway.overview_calls.load(Ordering::SeqCst), 1);
    // one backend error per bypassed call, nothing else recorded
    let stats = service.stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.sets, 0);

    let _ = service.get_market_overview(MarketType::Stocks).await?;
    assert_eq!(service.stats().errors, 2);
    // degraded calls are not cached, so the gateway is hit again
    assert_eq!(gateway.overview_calls.load(Ordering::SeqCst), 2);
    assert!(!service.cache_healthy().await);
    Ok(())
}

#[tokio::test]
async fn undecodable_cache_entry_is_purged_and_refetched() -> anyhow::Result<()> {
    let gateway = Arc::new(StubGateway::default());
    let cache = Arc::new(MemoryCacheStore::new(Duration::from_secs(300)));
    let service = MarketDataService::new(
        Arc::clone(&cache) as Arc<dyn CacheStore>,
        Arc::clone(&gateway) as Arc<dyn MarketGateway>,
        CacheConfig::default(),
    );

    // seed a payload that is not valid JSON under the operation's key
    cache
        .set("market:asset_detail:symbol=MSFT", "{not json", Ttl::Default)
        .await?;

    let asset = service.get_asset_detail("MSFT").await?;
    assert_eq!(asset.symbol, "MSFT");
    assert_eq!(gateway.detail_calls.load(Ordering::SeqCst), 1);

    // corrupt entry counts as a miss, never a hit
    let stats = service.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.sets, 1);

    // the purged slot was repopulated with a decodable payload
    let _ = service.get_asset_detail("MSFT").await?;
    assert_eq!(gateway.detail_calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.stats().hits, 1);
    Ok(())
}

#[tokio::test]
async fn cache_write_failure_does_not_fail_the_request() -> anyhow::Result<()> {
    let gateway = Arc::new(StubGateway::default());
    let service = MarketDataService::new(
        Arc::new(ReadOnlyCacheStore {
            inner: MemoryCacheStore::new(Duration::from_secs(300)),
        }),
        Arc::clone(&gateway) as Arc<dyn MarketGateway>,
        CacheConfig::default(),
    );

    let asset = service.get_asset_detail("MSFT").await?;
    assert_eq!(asset.symbol, "MSFT");

    // the failed write is recorded but the caller still gets the data
    let stats = service.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.sets, 0);

    // nothing was stored, so the next call goes back to the gateway
    let _ = service.get_asset_detail("MSFT").await?;
    assert_eq!(gateway.detail_calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn short_search_query_fails_before_cache_and_gateway() {
    let gateway = Arc::new(StubGateway::default());
    let service = service_with(Arc::clone(&gateway));

    let err = service.search("A", None, 20).await.unwrap_err();
    assert!(matches!(err, MarketError::InvalidParameter(_)));
    assert_eq!(gateway.search_calls.load(Ordering::SeqCst), 0);
    // no cache operation happened either
    let stats = service.stats();
    assert_eq!(stats.hits + stats.misses + stats.sets + stats.errors, 0);
}

#[tokio::test]
async fn invalid_assets_limit_rejected() {
    let gateway = Arc::new(StubGateway::default());
    let service = service_with(Arc::clone(&gateway));

    let err = service
        .get_assets(MarketType::Stocks, 101, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidParameter(_)));
    assert_eq!(gateway.assets_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalidate_namespace_leaves_other_namespaces_alone() -> anyhow::Result<()> {
    let gateway = Arc::new(StubGateway::default());
    let service = service_with(Arc::clone(&gateway));

    let _ = service
        .get_candles(CandleQuery::new("AAPL").limit(10))
        .await?;
    let _ = service.get_asset_detail("AAPL").await?;
    let _ = service.search("apple", Some(MarketType::Stocks), 20).await?;

    let removed = service.invalidate_namespace(Namespace::Candles).await?;
    assert_eq!(removed, 1);

    // candles must refetch, detail still cached
    let _ = service
        .get_candles(CandleQuery::new("AAPL").limit(10))
        .await?;
    assert_eq!(gateway.candle_calls.load(Ordering::SeqCst), 2);
    let _ = service.get_asset_detail("AAPL").await?;
    assert_eq!(gateway.detail_calls.load(Ordering::SeqCst), 1);

    // clearing an already-empty namespace is 0, not an error
    let removed = service.invalidate_namespace(Namespace::Overview).await?;
    assert_eq!(removed, 0);

    let removed = service.invalidate_all().await?;
    // refetched candles + asset_detail + search entries were present
    assert_eq!(removed, 3);
    Ok(())
}

#[tokio::test]
async fn search_key_is_case_and_whitespace_canonical() -> anyhow::Result<()> {
    let gateway = Arc::new(StubGateway::default());
    let service = service_with(Arc::clone(&gateway));

    let _ = service.search("Tesla", None, 20).await?;
    let _ = service.search("  tesla ", None, 20).await?;
    let _ = service.search("TESLA", None, 20).await?;
    // all three are the same logical request
    assert_eq!(gateway.search_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn reset_stats_zeroes_counters() -> anyhow::Result<()> {
    let gateway = Arc::new(StubGateway::default());
    let service = service_with(Arc::clone(&gateway));

    let _ = service.get_asset_detail("MSFT").await?;
    assert!(service.stats().misses > 0);
    service.reset_stats();
    let stats = service.stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.hit_rate_percent, 0.0);
    Ok(())
}
