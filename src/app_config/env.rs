use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use dotenv::dotenv;

use crate::cache::key::Namespace;
use crate::cache::CacheBackendKind;

/// 读取字符串环境变量，若不存在则返回默认值
pub fn env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) => v,
        Err(_) => default.to_string(),
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

/// 缓存配置 / cache layer configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    pub redis_url: String,
    pub default_ttl_secs: u64,
    pub key_prefix: String,
    pub overview_ttl_secs: u64,
    pub assets_ttl_secs: u64,
    pub asset_detail_ttl_secs: u64,
    pub candles_ttl_secs: u64,
    pub search_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            redis_url: "redis://127.0.0.1:6379/".to_string(),
            default_ttl_secs: 300,
            key_prefix: "market".to_string(),
            overview_ttl_secs: 300,
            assets_ttl_secs: 300,
            asset_detail_ttl_secs: 60,
            candles_ttl_secs: 300,
            search_ttl_secs: 120,
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let defaults = Self::default();
        let backend = match env::var("CACHE_BACKEND") {
            Ok(v) => {
                CacheBackendKind::from_str(&v).map_err(|e| anyhow!("CACHE_BACKEND: {}", e))?
            }
            Err(_) => defaults.backend,
        };
        Ok(Self {
            backend,
            redis_url: env::var("REDIS_HOST").unwrap_or(defaults.redis_url),
            default_ttl_secs: env_u64("CACHE_DEFAULT_TTL_SECS", defaults.default_ttl_secs),
            key_prefix: env::var("CACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            overview_ttl_secs: env_u64("CACHE_TTL_OVERVIEW_SECS", defaults.overview_ttl_secs),
            assets_ttl_secs: env_u64("CACHE_TTL_ASSETS_SECS", defaults.assets_ttl_secs),
            asset_detail_ttl_secs: env_u64(
                "CACHE_TTL_ASSET_DETAIL_SECS",
                defaults.asset_detail_ttl_secs,
            ),
            candles_ttl_secs: env_u64("CACHE_TTL_CANDLES_SECS", defaults.candles_ttl_secs),
            search_ttl_secs: env_u64("CACHE_TTL_SEARCH_SECS", defaults.search_ttl_secs),
        })
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Per-operation TTL, in seconds.
    pub fn ttl_for(&self, namespace: Namespace) -> u64 {
        match namespace {
            Namespace::Overview => self.overview_ttl_secs,
            Namespace::Assets => self.assets_ttl_secs,
            Namespace::AssetDetail => self.asset_detail_ttl_secs,
            Namespace::Candles => self.candles_ttl_secs,
            Namespace::Search => self.search_ttl_secs,
        }
    }
}

/// Market-data provider configuration. The surrounding system owns real
/// credential management; here the key only has to reach the query string.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub max_retries: usize,
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let api_key =
            env::var("MARKET_API_KEY").map_err(|_| anyhow!("MARKET_API_KEY config is none"))?;
        Ok(Self {
            base_url: env_or_default("MARKET_API_BASE_URL", "https://api.polygon.io"),
            api_key,
            timeout: Duration::from_millis(env_u64("MARKET_API_TIMEOUT_MS", 10_000)),
            max_retries: env_u64("MARKET_API_MAX_RETRIES", 2) as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_for_maps_every_namespace() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl_for(Namespace::Overview), 300);
        assert_eq!(config.ttl_for(Namespace::AssetDetail), 60);
        assert_eq!(config.ttl_for(Namespace::Search), 120);
    }

    #[test]
    fn process_env_wins_over_dotenv_defaults() {
        // dotenv never overrides variables already set on the process
        env::set_var("CACHE_TTL_SEARCH_SECS", "45");
        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.search_ttl_secs, 45);
        env::remove_var("CACHE_TTL_SEARCH_SECS");
    }
}
