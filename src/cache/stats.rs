use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Raw counters, mutated under one lock so a snapshot can never observe a
/// torn update.
#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    sets: u64,
    deletes: u64,
    errors: u64,
}

/// Process-wide cache statistics. Held in an `Arc` by the service and
/// exposed read-only to operators via [`CacheStats::snapshot`].
#[derive(Debug, Default)]
pub struct CacheStats {
    inner: RwLock<Counters>,
}

/// Consistent point-in-time view of the counters, plus the derived hit rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub hit_rate_percent: f64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.inner.write().expect("stats lock poisoned").hits += 1;
    }

    pub fn record_miss(&self) {
        self.inner.write().expect("stats lock poisoned").misses += 1;
    }

    pub fn record_set(&self) {
        self.inner.write().expect("stats lock poisoned").sets += 1;
    }

    pub fn record_delete(&self) {
        self.inner.write().expect("stats lock poisoned").deletes += 1;
    }

    pub fn record_error(&self) {
        self.inner.write().expect("stats lock poisoned").errors += 1;
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let c = *self.inner.read().expect("stats lock poisoned");
        let total = c.hits + c.misses;
        let hit_rate_percent = if total == 0 {
            0.0
        } else {
            (c.hits as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
        };
        CacheStatsSnapshot {
            hits: c.hits,
            misses: c.misses,
            sets: c.sets,
            deletes: c.deletes,
            errors: c.errors,
            hit_rate_percent,
        }
    }

    /// Zero all counters in one step. Operator action only.
    pub fn reset(&self) {
        *self.inner.write().expect("stats lock poisoned") = Counters::default();
    }
}
