use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::cache::{glob_match, CacheStore, Ttl};
use crate::error::MarketError;

/// Owned exclusively by the store; callers only ever receive cloned values.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    stored_at: Instant,
    ttl: Option<Duration>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now >= self.stored_at + ttl,
            None => false,
        }
    }
}

/// In-process cache backend. Lazy expiry: entries are dropped when a read
/// finds them stale, which is externally indistinguishable from eviction.
pub struct MemoryCacheStore {
    map: DashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl MemoryCacheStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            map: DashMap::new(),
            default_ttl,
        }
    }

    /// Live entry count, stale entries excluded.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.map.iter().filter(|e| !e.value().is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, MarketError> {
        let now = Instant::now();
        let expired = match self.map.get(key) {
            Some(entry) => {
                if entry.is_expired(now) {
                    true
                } else {
                    return Ok(Some(entry.value.clone()));
                }
            }
            None => return Ok(None),
        };
        if expired {
            self.map.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Ttl) -> Result<(), MarketError> {
        let ttl = ttl
            .resolve(self.default_ttl.as_secs())
            .map(Duration::from_secs);
        self.map.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                stored_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), MarketError> {
        self.map.remove(key);
        Ok(())
    }

    async fn clear_by_pattern(&self, pattern: &str) -> Result<u64, MarketError> {
        let matched: Vec<String> = self
            .map
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        let mut removed = 0u64;
        for key in matched {
            if self.map.remove(&key).is_some() {
                removed += 1;
            }
        }
        debug!(pattern, removed, "memory cache pattern clear");
        Ok(removed)
    }

    async fn health_check(&self) -> bool {
        true
    }
}
