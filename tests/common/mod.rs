use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use walkroute::config::PipelineConfig;
use walkroute::db::{AnalyticsRow, AnalyticsSink, AnalyticsTable};
use walkroute::error::{AppError, Result};
use walkroute::models::{Coordinates, GenerateRouteRequest, Place, RouteScore, Theme};
use walkroute::services::directions::{
    DirectionsError, DirectionsProvider, DirectionsRequest, ProviderRoute,
};
use walkroute::services::places::{PlaceSearch, PlacesProvider};
use walkroute::services::polyline;
use walkroute::services::ranker::{RankRequest, RankResponse, Ranker};
use walkroute::services::route_pipeline::RoutePipeline;
use walkroute::services::text_gen::{GeneratedText, TextGenerator, TextRequest};

pub const START: Coordinates = Coordinates {
    lat: 35.0,
    lng: 139.0,
};

/// Closed square of roughly 1.8 km around the start.
#[allow(dead_code)]
pub fn loop_path() -> Vec<Coordinates> {
    vec![
        START,
        Coordinates { lat: 35.004, lng: 139.0 },
        Coordinates { lat: 35.004, lng: 139.005 },
        Coordinates { lat: 35.0, lng: 139.005 },
        START,
    ]
}

#[allow(dead_code)]
pub fn provider_route(distance_km: f64) -> ProviderRoute {
    ProviderRoute {
        polyline: polyline::encode(&loop_path()).unwrap(),
        distance_km,
        duration_min: Some(distance_km * 12.5),
        has_stairs: false,
        elevation_gain_m: 5.0,
    }
}

/// What the fake directions provider answers once its queue is drained.
#[allow(dead_code)]
#[derive(Clone, Copy)]
pub enum Exhausted {
    NoRoute,
    Reject,
    Unconfigured,
}

pub struct FakeDirections {
    queue: Mutex<VecDeque<f64>>,
    exhausted: Exhausted,
    /// Answers every call with a route whose length depends on the requested target.
    sized_by: Option<fn(f64) -> f64>,
    requested: Mutex<Vec<f64>>,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeDirections {
    /// Answers with routes of these distances in order, then `NoRoute`.
    pub fn distances(distances: &[f64]) -> Self {
        Self {
            queue: Mutex::new(distances.iter().copied().collect()),
            ..Self::always(Exhausted::NoRoute)
        }
    }

    pub fn always(exhausted: Exhausted) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            exhausted,
            sized_by: None,
            requested: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn sized_by(route_km_for_target: fn(f64) -> f64) -> Self {
        Self {
            sized_by: Some(route_km_for_target),
            ..Self::always(Exhausted::NoRoute)
        }
    }

    /// Target distance of every request received, in call order.
    pub fn requested_targets(&self) -> Vec<f64> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectionsProvider for FakeDirections {
    async fn compute_route(
        &self,
        request: &DirectionsRequest,
    ) -> std::result::Result<Option<ProviderRoute>, DirectionsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(request.target_km);
        if let Some(route_km_for_target) = self.sized_by {
            return Ok(Some(provider_route(route_km_for_target(request.target_km))));
        }
        let next = self.queue.lock().unwrap().pop_front();
        match (next, self.exhausted) {
            (Some(distance_km), _) => Ok(Some(provider_route(distance_km))),
            (None, Exhausted::NoRoute) => Ok(None),
            (None, Exhausted::Reject) => Err(DirectionsError::Rejected {
                status: 400,
                message: "invalid waypoints".to_string(),
            }),
            (None, Exhausted::Unconfigured) => Err(DirectionsError::NotConfigured),
        }
    }
}

pub struct FakePlaces {
    places: Vec<Place>,
    fail: bool,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakePlaces {
    /// Three places of distinct types sitting on the loop edges.
    pub fn along_loop() -> Self {
        let place = |name: &str, place_type: &str, lat: f64, lng: f64| Place {
            name: name.to_string(),
            place_type: place_type.to_string(),
            place_id: Some(format!("osm:{}", name)),
            lat,
            lng,
        };
        Self {
            places: vec![
                place("Maple Park", "park", 35.002, 139.0),
                place("Hill Shrine", "shrine", 35.004, 139.0025),
                place("Old Well", "historic", 35.002, 139.005),
            ],
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            places: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PlacesProvider for FakePlaces {
    async fn search(&self, _query: &PlaceSearch) -> Result<Vec<Place>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::PlacesApi("HTTP 503".to_string()));
        }
        Ok(self.places.clone())
    }
}

#[allow(dead_code)]
pub enum FakeRanker {
    /// `1 - distance_error_ratio` for every route sent.
    ByDistanceError,
    Fails,
    Slow(Duration),
}

#[async_trait]
impl Ranker for FakeRanker {
    async fn rank(&self, request: &RankRequest) -> Result<RankResponse> {
        match self {
            FakeRanker::ByDistanceError => Ok(RankResponse {
                scores: request
                    .routes
                    .iter()
                    .map(|r| RouteScore {
                        route_id: r.route_id.clone(),
                        score: 1.0 - r.features.distance_error_ratio,
                    })
                    .collect(),
                failed_route_ids: Vec::new(),
            }),
            FakeRanker::Fails => Err(AppError::RankerApi("HTTP 500".to_string())),
            FakeRanker::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(RankResponse::default())
            }
        }
    }
}

#[allow(dead_code)]
pub enum FakeTextGen {
    Writes,
    Fails,
}

#[async_trait]
impl TextGenerator for FakeTextGen {
    async fn generate(&self, request: &TextRequest) -> Result<Option<GeneratedText>> {
        match self {
            FakeTextGen::Writes => Ok(Some(GeneratedText {
                title: Some("Quiet loop among the trees".to_string()),
                description: format!(
                    "A relaxed {:.1} km loop through leafy side streets, with room to slow down and look around.",
                    request.distance_km
                ),
            })),
            FakeTextGen::Fails => Err(AppError::TextGeneration("quota exceeded".to_string())),
        }
    }
}

/// Keeps every analytics row in memory.
#[derive(Default)]
pub struct RecordingSink {
    rows: Mutex<Vec<(AnalyticsTable, AnalyticsRow)>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, table: AnalyticsTable) -> usize {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == table)
            .count()
    }

    pub fn payloads(&self, table: AnalyticsTable) -> Vec<serde_json::Value> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| *t == table)
            .map(|(_, row)| row.payload.clone())
            .collect()
    }
}

#[async_trait]
impl AnalyticsSink for RecordingSink {
    async fn insert_rows(&self, table: AnalyticsTable, rows: Vec<AnalyticsRow>) -> Result<()> {
        let mut stored = self.rows.lock().unwrap();
        stored.extend(rows.into_iter().map(|row| (table, row)));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Deterministic config: fixed seed, no early exit before three candidates, short timeouts.
#[allow(dead_code)]
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        min_routes: 3,
        fixed_seed: Some(7),
        directions_timeout_ms: 500,
        places_timeout_ms: 500,
        ranker_timeout_ms: 200,
        text_gen_timeout_ms: 500,
        ..PipelineConfig::default()
    }
}

pub struct Fakes {
    pub directions: Arc<FakeDirections>,
    pub places: Arc<FakePlaces>,
    pub ranker: Option<Arc<FakeRanker>>,
    pub text_gen: Arc<FakeTextGen>,
    pub sink: Arc<RecordingSink>,
}

#[allow(dead_code)]
impl Fakes {
    /// Every collaborator healthy; directions returns 1.8, 2.3 and 1.95 km loops.
    pub fn healthy() -> Self {
        Self {
            directions: Arc::new(FakeDirections::distances(&[1.8, 2.3, 1.95])),
            places: Arc::new(FakePlaces::along_loop()),
            ranker: Some(Arc::new(FakeRanker::ByDistanceError)),
            text_gen: Arc::new(FakeTextGen::Writes),
            sink: Arc::new(RecordingSink::default()),
        }
    }

    pub fn pipeline(&self, config: PipelineConfig) -> RoutePipeline {
        RoutePipeline::new(
            self.directions.clone(),
            self.places.clone(),
            self.ranker
                .clone()
                .map(|r| r as Arc<dyn walkroute::services::ranker::Ranker>),
            self.text_gen.clone(),
            self.sink.clone(),
            config,
        )
    }
}

#[allow(dead_code)]
pub fn round_trip_request(request_id: &str, debug: bool) -> GenerateRouteRequest {
    GenerateRouteRequest {
        request_id: request_id.to_string(),
        theme: Theme::Nature,
        distance_km: 2.0,
        start_location: START,
        end_location: None,
        round_trip: true,
        debug,
    }
}

/// Let fire-and-forget analytics tasks finish.
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
