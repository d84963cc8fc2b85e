#![allow(dead_code)]

pub mod app_config;
pub mod cache;
pub mod error;
pub mod market;
pub mod time_util;

pub use cache::key::Namespace;
pub use cache::stats::CacheStatsSnapshot;
pub use cache::{build_cache_store, CacheBackendKind, CacheStore, Ttl};
pub use error::MarketError;
pub use market::gateway::{MarketGateway, PolygonGateway};
pub use market::service::MarketDataService;
pub use market::types::{
    CandleQuery, MarketType, NormalizedAsset, NormalizedCandle, NormalizedOverview,
    NormalizedSummary, SearchResult, Timespan,
};
