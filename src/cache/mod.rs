mod memory;
mod redis;

pub use memory::MemoryCacheService;
pub use self::redis::RedisCacheService;

use crate::constants::{CACHE_COORD_DECIMALS, CACHE_DISTANCE_DECIMALS};
use crate::error::Result;
use crate::models::{GenerateRouteRequest, GenerateRouteResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Storage for generated responses, keyed by request fingerprint.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get_cached_response(&self, key: &str) -> Option<GenerateRouteResponse>;
    async fn cache_response(&self, key: &str, response: &GenerateRouteResponse);
    async fn get_stats(&self) -> CacheStats;
    async fn health_check(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub connected: bool,
}

/// Fingerprint of the inputs that shape a response.
/// Coordinates keep 5 decimals (~1 m), distance 1 decimal.
pub fn generate_cache_key(request: &GenerateRouteRequest) -> String {
    let mut hasher = DefaultHasher::new();

    let distance_bucket =
        (request.distance_km * 10_f64.powi(CACHE_DISTANCE_DECIMALS as i32)).round() as i64;

    request.theme.hash(&mut hasher);
    distance_bucket.hash(&mut hasher);
    request.round_trip.hash(&mut hasher);
    request
        .start_location
        .rounded_key(CACHE_COORD_DECIMALS)
        .hash(&mut hasher);
    let end = if request.round_trip {
        None
    } else {
        request
            .end_location
            .map(|end| end.rounded_key(CACHE_COORD_DECIMALS))
    };
    end.hash(&mut hasher);

    format!("route:generate:{:x}", hasher.finish())
}

/// Response cache with per-key locks so identical concurrent requests compute once.
pub struct GenerateCache {
    backend: Arc<dyn ResponseCache>,
    locks: moka::future::Cache<String, Arc<Mutex<()>>>,
}

impl GenerateCache {
    pub fn new(backend: Arc<dyn ResponseCache>, ttl_seconds: u64) -> Self {
        let locks = moka::future::Cache::builder()
            .time_to_idle(Duration::from_secs(ttl_seconds.max(1)))
            .max_capacity(10_000)
            .build();
        GenerateCache { backend, locks }
    }

    pub fn backend(&self) -> &Arc<dyn ResponseCache> {
        &self.backend
    }

    /// Serve from cache or run `compute` once per fingerprint.
    ///
    /// Debug requests bypass the cache. Errors are returned but never stored.
    /// Hits carry the caller's `request_id`.
    pub async fn get_or_compute<F, Fut>(
        &self,
        request: &GenerateRouteRequest,
        compute: F,
    ) -> Result<GenerateRouteResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<GenerateRouteResponse>>,
    {
        if request.debug {
            return compute().await;
        }

        let key = generate_cache_key(request);
        if let Some(hit) = self.lookup(&key, &request.request_id).await {
            return Ok(hit);
        }

        let lock = self
            .locks
            .get_with(key.clone(), async { Arc::new(Mutex::new(())) })
            .await;
        let _guard = lock.lock().await;

        // Another caller may have filled the entry while we waited.
        if let Some(hit) = self.lookup(&key, &request.request_id).await {
            return Ok(hit);
        }

        let response = compute().await?;
        self.backend.cache_response(&key, &response).await;
        Ok(response)
    }

    async fn lookup(&self, key: &str, request_id: &str) -> Option<GenerateRouteResponse> {
        let mut cached = self.backend.get_cached_response(key).await?;
        tracing::info!(
            request_id,
            backend = self.backend.backend_name(),
            "Cache hit for {}",
            key
        );
        cached.request_id = request_id.to_string();
        Some(cached)
    }
}
