pub mod key;
pub mod memory;
pub mod redis_store;
pub mod stats;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app_config::env::CacheConfig;
use crate::error::MarketError;

/// Entry lifetime passed to [`CacheStore::set`].
///
/// `Default` (and `Seconds(0)`) means "use the store's configured default
/// TTL"; storing forever requires the explicit `NoExpiry` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Default,
    Seconds(u64),
    NoExpiry,
}

impl Ttl {
    /// Resolve against the store's default. `None` means no expiry.
    pub fn resolve(&self, default_secs: u64) -> Option<u64> {
        match self {
            Ttl::Default | Ttl::Seconds(0) => Some(default_secs),
            Ttl::Seconds(secs) => Some(*secs),
            Ttl::NoExpiry => None,
        }
    }
}

/// Uniform key/value store with TTL. Both backends satisfy the same
/// contract; callers can not tell them apart through this trait.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `Ok(None)` for a missing or expired key; `Err(BackendUnavailable)`
    /// only when the backend itself fails. Never an error for absence.
    async fn get(&self, key: &str) -> Result<Option<String>, MarketError>;

    /// Overwrites any existing entry.
    async fn set(&self, key: &str, value: &str, ttl: Ttl) -> Result<(), MarketError>;

    /// Idempotent; deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), MarketError>;

    /// Deletes every key matching the glob pattern and returns the count.
    /// Matching zero keys is `Ok(0)`.
    async fn clear_by_pattern(&self, pattern: &str) -> Result<u64, MarketError>;

    /// Fast liveness probe. The in-process backend is always healthy.
    async fn health_check(&self) -> bool;
}

/// Cache backend selector, from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Memory,
    Redis,
}

impl FromStr for CacheBackendKind {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackendKind::Memory),
            "redis" => Ok(CacheBackendKind::Redis),
            other => Err(MarketError::invalid_parameter(format!(
                "unknown cache backend: {}",
                other
            ))),
        }
    }
}

/// Build the configured cache backend. Selection happens once, at
/// construction time; the rest of the system only sees the trait object.
pub fn build_cache_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, MarketError> {
    Ok(match config.backend {
        CacheBackendKind::Memory => Arc::new(memory::MemoryCacheStore::new(config.default_ttl())),
        CacheBackendKind::Redis => Arc::new(redis_store::RedisCacheStore::new(
            &config.redis_url,
            config.default_ttl_secs,
        )?),
    })
}

/// Glob matching for cache keys: `*` matches any run of characters,
/// `?` matches exactly one. Enough for namespace patterns; no character
/// classes.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    fn inner(p: &[u8], k: &[u8]) -> bool {
        match (p.first(), k.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                inner(&p[1..], k) || (!k.is_empty() && inner(p, &k[1..]))
            }
            (Some(b'?'), Some(_)) => inner(&p[1..], &k[1..]),
            (Some(pc), Some(kc)) if pc == kc => inner(&p[1..], &k[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_star_matches_runs() {
        assert!(glob_match("market:overview:*", "market:overview:market=stocks"));
        assert!(glob_match("market:*", "market:candles:symbol=AAPL"));
        assert!(!glob_match("market:overview:*", "market:candles:symbol=AAPL"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*b", "ab"));
        assert!(glob_match("a*b", "axxxb"));
        assert!(!glob_match("a*b", "axxxc"));
    }

    #[test]
    fn glob_question_mark_matches_single_char() {
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(!glob_match("a?c", "abbc"));
    }

    #[test]
    fn ttl_zero_resolves_to_default() {
        assert_eq!(Ttl::Seconds(0).resolve(300), Some(300));
        assert_eq!(Ttl::Default.resolve(300), Some(300));
        assert_eq!(Ttl::Seconds(60).resolve(300), Some(60));
        assert_eq!(Ttl::NoExpiry.resolve(300), None);
    }
}
