//! Rate limiter for preventing brute force attacks
//!
//! Fixed-window counters in Redis, keyed per operation and subject. The
//! window starts at the first attempt and the counter simply expires with
//! it. When Redis is unreachable the limiter fails open: login availability
//! outranks throttling strictness, and the event is logged.

use common::cache::RedisPool;
use tracing::{info, warn};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum number of attempts allowed per window
    pub max_attempts: u32,
    /// Time window in seconds
    pub window_seconds: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 300, // 5 minutes
        }
    }
}

impl RateLimiterConfig {
    /// Create a new RateLimiterConfig from environment variables
    ///
    /// # Environment Variables
    /// - `RATE_LIMIT_MAX_ATTEMPTS`: attempts per window (default: 5)
    /// - `RATE_LIMIT_WINDOW`: window length in seconds (default: 300)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_attempts = std::env::var("RATE_LIMIT_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_attempts);

        let window_seconds = std::env::var("RATE_LIMIT_WINDOW")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.window_seconds);

        Self {
            max_attempts,
            window_seconds,
        }
    }
}

/// Redis-backed fixed-window rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    redis: RedisPool,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(redis: RedisPool, config: RateLimiterConfig) -> Self {
        Self { config, redis }
    }

    /// Record an attempt and report whether the subject is still allowed
    pub async fn is_allowed(&self, key: &str) -> bool {
        let counter_key = format!("rate_limit:{}", key);

        match self
            .redis
            .incr_with_ttl(&counter_key, self.config.window_seconds)
            .await
        {
            Ok(count) => {
                if count > u64::from(self.config.max_attempts) {
                    info!("Rate limit exceeded for {}", key);
                    false
                } else {
                    true
                }
            }
            Err(e) => {
                warn!("Rate limiter unavailable, failing open: {}", e);
                true
            }
        }
    }

    /// Get the rate limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::cache::RedisConfig;

    #[test]
    fn test_default_config() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.window_seconds, 300);
    }

    #[tokio::test]
    async fn test_window_counts_attempts() {
        // Needs a live Redis; skip when none is configured.
        let Ok(url) = std::env::var("REDIS_URL") else {
            eprintln!("REDIS_URL not set, skipping");
            return;
        };

        let redis = RedisPool::new(&RedisConfig {
            url,
            max_connections: 10,
        })
        .await
        .unwrap();
        redis.delete("rate_limit:test:limiter").await.unwrap();

        let limiter = RateLimiter::new(
            redis.clone(),
            RateLimiterConfig {
                max_attempts: 2,
                window_seconds: 60,
            },
        );

        assert!(limiter.is_allowed("test:limiter").await);
        assert!(limiter.is_allowed("test:limiter").await);
        assert!(!limiter.is_allowed("test:limiter").await);

        redis.delete("rate_limit:test:limiter").await.unwrap();
    }
}
