//! Redis cache module for the Nimbus platform
//!
//! This module provides functionality for connecting to Redis and performing
//! basic cache operations like get and set with TTL support, plus the atomic
//! counter primitive the rate limiter is built on.

use crate::error::{CacheError, CacheResult};
use redis::{AsyncCommands, Client};
use tracing::info;

/// Configuration for Redis connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl RedisConfig {
    /// Create a new RedisConfig from environment variables
    ///
    /// # Environment Variables
    /// - `REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
    /// - `REDIS_MAX_CONNECTIONS`: Maximum number of connections (default: 10)
    pub fn from_env() -> CacheResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let max_connections = std::env::var("REDIS_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        Ok(RedisConfig {
            url,
            max_connections,
        })
    }
}

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    client: Client,
}

impl RedisPool {
    /// Initialize a new Redis connection pool
    pub async fn new(config: &RedisConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.clone()).map_err(CacheError::Connection)?;
        info!("Redis client initialized with URL: {}", config.url);
        Ok(RedisPool { client })
    }

    /// Get a connection from the pool
    async fn get_connection(&self) -> CacheResult<redis::aio::MultiplexedConnection> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::Connection)?;
        Ok(conn)
    }

    /// Set a key-value pair in Redis with optional TTL
    pub async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;

        if let Some(ttl) = ttl_seconds {
            let _: () = conn
                .set_ex(key, value, ttl)
                .await
                .map_err(CacheError::Command)?;
        } else {
            let _: () = conn.set(key, value).await.map_err(CacheError::Command)?;
        }

        Ok(())
    }

    /// Get a value from Redis by key
    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await.map_err(CacheError::Command)?;
        Ok(value)
    }

    /// Delete a key from Redis
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;
        let _: u64 = conn.del(key).await.map_err(CacheError::Command)?;
        Ok(())
    }

    /// Atomically increment a counter, starting its expiry window on creation
    ///
    /// Returns the counter value after the increment. The TTL is only set when
    /// the increment created the key, so the window is anchored to the first
    /// hit rather than sliding with every call.
    pub async fn incr_with_ttl(&self, key: &str, ttl_seconds: u64) -> CacheResult<u64> {
        let mut conn = self.get_connection().await?;
        let count: u64 = conn.incr(key, 1u64).await.map_err(CacheError::Command)?;

        if count == 1 {
            let _: bool = conn
                .expire(key, ttl_seconds as i64)
                .await
                .map_err(CacheError::Command)?;
        }

        Ok(count)
    }

    /// Check if Redis is reachable
    pub async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(CacheError::Command)?;
        Ok(pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Option<RedisConfig> {
        // Cache tests need a live Redis; skip when none is configured.
        let url = std::env::var("REDIS_URL").ok()?;
        Some(RedisConfig {
            url,
            max_connections: 10,
        })
    }

    #[tokio::test]
    async fn test_set_get_delete() -> CacheResult<()> {
        let Some(config) = test_config() else {
            eprintln!("REDIS_URL not set, skipping");
            return Ok(());
        };

        let pool = RedisPool::new(&config).await?;

        let key = "common_test_key";
        let value = "common_test_value";
        pool.set(key, value, Some(5)).await?;

        let retrieved = pool.get(key).await?;
        assert_eq!(retrieved, Some(value.to_string()));

        pool.delete(key).await?;
        let retrieved = pool.get(key).await?;
        assert_eq!(retrieved, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_incr_with_ttl_counts_up() -> CacheResult<()> {
        let Some(config) = test_config() else {
            eprintln!("REDIS_URL not set, skipping");
            return Ok(());
        };

        let pool = RedisPool::new(&config).await?;

        let key = "common_test_counter";
        pool.delete(key).await?;

        assert_eq!(pool.incr_with_ttl(key, 60).await?, 1);
        assert_eq!(pool.incr_with_ttl(key, 60).await?, 2);
        assert_eq!(pool.incr_with_ttl(key, 60).await?, 3);

        pool.delete(key).await?;
        Ok(())
    }
}
