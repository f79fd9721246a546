use crate::cache::{CacheStats, ResponseCache};
use crate::models::GenerateRouteResponse;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory response cache backed by moka with TTL and bounded capacity.
/// All methods are `&self`; moka handles its own synchronisation.
pub struct MemoryCacheService {
    responses: Cache<String, Arc<GenerateRouteResponse>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryCacheService {
    pub fn new(ttl_seconds: u64, max_capacity: u64) -> Self {
        let responses = Cache::builder()
            .time_to_live(Duration::from_secs(ttl_seconds))
            .max_capacity(max_capacity)
            .build();

        MemoryCacheService {
            responses,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl ResponseCache for MemoryCacheService {
    async fn get_cached_response(&self, key: &str) -> Option<GenerateRouteResponse> {
        match self.responses.get(key).await {
            Some(response) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Memory cache hit: {}", key);
                Some((*response).clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Memory cache miss: {}", key);
                None
            }
        }
    }

    async fn cache_response(&self, key: &str, response: &GenerateRouteResponse) {
        self.responses
            .insert(key.to_string(), Arc::new(response.clone()))
            .await;
        tracing::debug!("Memory cached response {}: {}", response.route.route_id, key);
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
            connected: true,
        }
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::GenerateCache;
    use crate::error::AppError;
    use crate::models::meta::{RouteMeta, RouteQuality};
    use crate::models::route::RouteOut;
    use crate::models::{Coordinates, GenerateRouteRequest, Theme};
    use std::sync::atomic::AtomicUsize;

    fn response(request_id: &str) -> GenerateRouteResponse {
        GenerateRouteResponse {
            request_id: request_id.to_string(),
            route: RouteOut {
                route_id: "route-1".into(),
                polyline: "_p~iF~ps|U_ulLnnqC".into(),
                distance_km: 2.0,
                duration_min: 25,
                title: "Green 2.0 km walk".into(),
                summary: "A walk.".into(),
                nav_waypoints: vec![],
                spots: vec![],
            },
            meta: RouteMeta {
                fallback_used: false,
                tools_used: vec![],
                fallback_reason: None,
                fallback_details: vec![],
                route_quality: RouteQuality {
                    is_fallback: false,
                    distance_match: 1.0,
                    distance_error_km: 0.0,
                    quality_score: 0.7,
                },
                plan: None,
                debug: None,
            },
        }
    }

    fn request(request_id: &str, debug: bool) -> GenerateRouteRequest {
        GenerateRouteRequest {
            request_id: request_id.into(),
            theme: Theme::Nature,
            distance_km: 2.0,
            start_location: Coordinates::new(35.0, 139.0).unwrap(),
            end_location: None,
            round_trip: true,
            debug,
        }
    }

    #[tokio::test]
    async fn cache_miss() {
        let cache = MemoryCacheService::new(3600, 100);
        assert!(cache.get_cached_response("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn stats_tracking() {
        let cache = MemoryCacheService::new(3600, 100);
        cache.cache_response("key1", &response("a")).await;

        cache.get_cached_response("missing").await;
        cache.get_cached_response("key1").await;
        cache.get_cached_response("key1").await;

        let stats = cache.get_stats().await;
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 66.666).abs() < 1.0);
        assert_eq!(cache.backend_name(), "memory");
    }

    #[tokio::test]
    async fn ttl_expiry() {
        let cache = MemoryCacheService::new(1, 100);
        cache.cache_response("key1", &response("a")).await;
        assert!(cache.get_cached_response("key1").await.is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(cache.get_cached_response("key1").await.is_none());
    }

    #[tokio::test]
    async fn hit_rewrites_request_id() {
        let cache = GenerateCache::new(Arc::new(MemoryCacheService::new(60, 10)), 60);
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let first = cache
            .get_or_compute(&request("first", false), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(response("first"))
            })
            .await
            .unwrap();
        let second = cache
            .get_or_compute(&request("second", false), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(response("second"))
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.request_id, "first");
        assert_eq!(second.request_id, "second");
        assert_eq!(second.route.route_id, first.route.route_id);
    }

    #[tokio::test]
    async fn debug_bypasses_and_errors_are_not_stored() {
        let cache = GenerateCache::new(Arc::new(MemoryCacheService::new(60, 10)), 60);
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        for _ in 0..2 {
            cache
                .get_or_compute(&request("dbg", true), move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(response("dbg"))
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let failed = cache
            .get_or_compute(&request("x", false), || async {
                Err(AppError::Internal("boom".into()))
            })
            .await;
        assert!(failed.is_err());
        let stats = cache.backend().get_stats().await;
        assert_eq!(stats.hits, 0);

        let recovered = cache
            .get_or_compute(&request("y", false), || async { Ok(response("y")) })
            .await;
        assert!(recovered.is_ok());
    }
}
