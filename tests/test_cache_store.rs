use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;

use market_data_cache::app_config::env::CacheConfig;
use market_data_cache::cache::memory::MemoryCacheStore;
use market_data_cache::{build_cache_store, CacheBackendKind, CacheStore, Ttl};

#[tokio::test]
async fn builder_selects_memory_backend() -> anyhow::Result<()> {
    let config = CacheConfig {
        backend: CacheBackendKind::Memory,
        ..CacheConfig::default()
    };
    let store = build_cache_store(&config)?;
    assert!(store.health_check().await);

    store.set("market:overview:market=stocks", "{}", Ttl::Default).await?;
    assert_eq!(
        store.get("market:overview:market=stocks").await?,
        Some("{}".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn trait_object_round_trip_and_expiry() -> anyhow::Result<()> {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new(Duration::from_secs(300)));

    store.set("k1", "v1", Ttl::Seconds(1)).await?;
    store.set("k2", "v2", Ttl::Default).await?;
    assert_eq!(store.get("k1").await?, Some("v1".to_string()));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    // k1 expired, k2 still on the default TTL
    assert_eq!(store.get("k1").await?, None);
    assert_eq!(store.get("k2").await?, Some("v2".to_string()));
    Ok(())
}

#[tokio::test]
async fn pattern_clear_counts_and_scopes() -> anyhow::Result<()> {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new(Duration::from_secs(300)));
    for i in 0..5 {
        store
            .set(&format!("market:candles:symbol=S{}", i), "c", Ttl::Default)
            .await?;
    }
    store.set("market:search:q=apple", "s", Ttl::Default).await?;

    assert_eq!(store.clear_by_pattern("market:candles:*").await?, 5);
    assert_eq!(store.clear_by_pattern("market:candles:*").await?, 0);
    assert_eq!(store.get("market:search:q=apple").await?, Some("s".to_string()));
    Ok(())
}

/// Exercises the networked backend against a local Redis. Run with
/// `cargo test -- --ignored` when REDIS_HOST points at a live instance.
#[tokio::test]
#[ignore]
async fn redis_backend_round_trip() -> anyhow::Result<()> {
    dotenv().ok();
    let config = CacheConfig {
        backend: CacheBackendKind::Redis,
        key_prefix: "market_test".to_string(),
        ..CacheConfig::default()
    };
    let store = build_cache_store(&config)?;
    assert!(store.health_check().await);

    store.set("market_test:candles:a", "v", Ttl::Seconds(5)).await?;
    assert_eq!(store.get("market_test:candles:a").await?, Some("v".to_string()));

    let removed = store.clear_by_pattern("market_test:*").await?;
    assert!(removed >= 1);
    assert_eq!(store.get("market_test:candles:a").await?, None);
    Ok(())
}
