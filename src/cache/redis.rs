use crate::cache::{CacheStats, ResponseCache};
use crate::error::{AppError, Result};
use crate::models::GenerateRouteResponse;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::RedisResult;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

/// Sorted set of cached keys scored by last use (unix ms).
const RECENCY_INDEX_KEY: &str = "route:generate:recency";

/// Shared response cache in Redis.
///
/// Entries expire through `SET EX`. The recency index bounds the entry count:
/// every write trims the least recently used keys beyond `max_entries`.
pub struct RedisCacheService {
    connection: ConnectionManager,
    ttl_seconds: u64,
    max_entries: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RedisCacheService {
    pub async fn new(redis_url: &str, ttl_seconds: u64, max_entries: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::Cache(format!("invalid Redis URL: {}", e)))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Cache(format!("Redis unreachable: {}", e)))?;

        tracing::info!(
            ttl_seconds,
            max_entries,
            "Response cache connected to Redis"
        );

        Ok(RedisCacheService {
            connection,
            ttl_seconds,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Drop the least recently used entries beyond capacity.
    async fn evict_overflow(&self, conn: &mut ConnectionManager) -> RedisResult<usize> {
        let len: u64 = redis::cmd("ZCARD")
            .arg(RECENCY_INDEX_KEY)
            .query_async(conn)
            .await?;
        let Some(last_rank) = overflow_last_rank(len, self.max_entries) else {
            return Ok(0);
        };

        let (evicted,): (Vec<String>,) = redis::pipe()
            .atomic()
            .cmd("ZRANGE")
            .arg(RECENCY_INDEX_KEY)
            .arg(0)
            .arg(last_rank)
            .cmd("ZREMRANGEBYRANK")
            .arg(RECENCY_INDEX_KEY)
            .arg(0)
            .arg(last_rank)
            .ignore()
            .query_async(conn)
            .await?;

        if !evicted.is_empty() {
            let _: () = redis::cmd("DEL").arg(&evicted).query_async(conn).await?;
        }
        Ok(evicted.len())
    }
}

#[async_trait]
impl ResponseCache for RedisCacheService {
    async fn get_cached_response(&self, key: &str) -> Option<GenerateRouteResponse> {
        let mut conn = self.connection.clone();
        let stored: RedisResult<Option<String>> =
            redis::cmd("GET").arg(key).query_async(&mut conn).await;

        let json = match stored {
            Ok(Some(json)) => json,
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(e) => {
                tracing::warn!(key, "Redis read failed: {}", e);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let response: GenerateRouteResponse = match serde_json::from_str(&json) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(key, "Discarding unreadable cache entry: {}", e);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        self.hits.fetch_add(1, Ordering::Relaxed);

        // XX: only refresh keys still tracked; an evicted key must not come back.
        let touched: RedisResult<()> = redis::cmd("ZADD")
            .arg(RECENCY_INDEX_KEY)
            .arg("XX")
            .arg(now_ms())
            .arg(key)
            .query_async(&mut conn)
            .await;
        if let Err(e) = touched {
            tracing::debug!(key, "Recency update failed: {}", e);
        }

        Some(response)
    }

    async fn cache_response(&self, key: &str, response: &GenerateRouteResponse) {
        let json = match serde_json::to_string(response) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key, "Response not cacheable: {}", e);
                return;
            }
        };

        let now = now_ms();
        let mut conn = self.connection.clone();
        let written: RedisResult<()> = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(json)
            .arg("EX")
            .arg(self.ttl_seconds)
            .ignore()
            .cmd("ZADD")
            .arg(RECENCY_INDEX_KEY)
            .arg(now)
            .arg(key)
            .ignore()
            .cmd("ZREMRANGEBYSCORE")
            .arg(RECENCY_INDEX_KEY)
            .arg("-inf")
            .arg(expired_before(now, self.ttl_seconds))
            .ignore()
            .query_async(&mut conn)
            .await;
        if let Err(e) = written {
            tracing::warn!(key, "Redis write failed: {}", e);
            return;
        }

        match self.evict_overflow(&mut conn).await {
            Ok(0) => {}
            Ok(evicted) => tracing::debug!(
                max_entries = self.max_entries,
                "Evicted {} least recently used responses",
                evicted
            ),
            Err(e) => tracing::warn!("Redis eviction failed: {}", e),
        }
    }

    async fn get_stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let hit_rate = if hits + misses > 0 {
            (hits as f64 / (hits + misses) as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            hits,
            misses,
            hit_rate,
            connected: self.health_check().await,
        }
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.connection.clone();
        let pong: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        pong.is_ok()
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Index entries scored at or below this have already expired.
fn expired_before(now_ms: i64, ttl_seconds: u64) -> i64 {
    now_ms.saturating_sub((ttl_seconds as i64).saturating_mul(1000))
}

/// Rank of the last index entry to evict, or `None` within capacity.
fn overflow_last_rank(len: u64, max_entries: u64) -> Option<i64> {
    let max_entries = max_entries.max(1);
    (len > max_entries).then(|| (len - max_entries - 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_evicted_within_capacity() {
        assert_eq!(overflow_last_rank(0, 256), None);
        assert_eq!(overflow_last_rank(256, 256), None);
    }

    #[test]
    fn evicts_oldest_ranks_beyond_capacity() {
        // One over: only rank 0.
        assert_eq!(overflow_last_rank(257, 256), Some(0));
        // Ranks 0..=3 leave exactly 16.
        assert_eq!(overflow_last_rank(20, 16), Some(3));
        // Zero capacity behaves as one entry.
        assert_eq!(overflow_last_rank(3, 0), Some(1));
    }

    #[test]
    fn expiry_cutoff_trails_by_ttl() {
        assert_eq!(expired_before(200_000, 120), 80_000);
        assert_eq!(expired_before(0, 120), -120_000);
    }
}
