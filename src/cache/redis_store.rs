use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::{debug, warn};

use crate::cache::{CacheStore, Ttl};
use crate::error::MarketError;

/// Networked cache backend over Redis.
///
/// Holds a `redis::Client` and acquires a multiplexed async connection per
/// operation; the connection is never held across a provider call. Every
/// Redis I/O failure surfaces as `BackendUnavailable` so the service can
/// choose to degrade instead of failing the request.
pub struct RedisCacheStore {
    client: Client,
    default_ttl_secs: u64,
}

impl RedisCacheStore {
    pub fn new(redis_url: &str, default_ttl_secs: u64) -> Result<Self, MarketError> {
        let client = Client::open(redis_url)
            .map_err(|e| MarketError::BackendUnavailable(format!("redis client: {}", e)))?;
        Ok(Self {
            client,
            default_ttl_secs,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, MarketError> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, MarketError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Ttl) -> Result<(), MarketError> {
        let mut conn = self.connection().await?;
        match ttl.resolve(self.default_ttl_secs) {
            Some(secs) => conn.set_ex::<_, _, ()>(key, value, secs).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), MarketError> {
        let mut conn = self.connection().await?;
        // DEL on an absent key is a no-op in Redis, which matches the
        // idempotency contract.
        conn.del::<_, i64>(key).await?;
        Ok(())
    }

    async fn clear_by_pattern(&self, pattern: &str) -> Result<u64, MarketError> {
        let mut conn = self.connection().await?;
        // KEYS is acceptable at admin-triggered invalidation volume.
        let keys: Vec<String> = conn.keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: i64 = conn.del(keys).await?;
        debug!(pattern, removed, "redis cache pattern clear");
        Ok(removed.max(0) as u64)
    }

    async fn health_check(&self) -> bool {
        match self.connection().await {
            Ok(mut conn) => {
                match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
                    Ok(pong) => pong == "PONG",
                    Err(e) => {
                        warn!("redis health check failed: {}", e);
                        false
                    }
                }
            }
            Err(e) => {
                warn!("redis health check failed: {}", e);
                false
            }
        }
    }
}
