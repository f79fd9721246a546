//! Request-scoped route proposal pipeline.
//!
//! Stages run in a fixed order and merge their output into a [`PipelineState`]. Every
//! external failure is turned into a fallback reason instead of an error, so a valid
//! request always gets a route back.

pub mod candidates;
pub mod fallback;
pub mod features;
pub mod proposals;
pub mod quality;
pub mod selection;
pub mod spots;
pub mod state;
pub mod waypoints;

use crate::config::PipelineConfig;
use crate::db::{spawn_insert, AnalyticsRow, AnalyticsSink, AnalyticsTable};
use crate::error::{AppError, Result};
use crate::models::features::FeatureVector;
use crate::models::meta::RouteMeta;
use crate::models::route::{is_degenerate_polyline, FeedbackRequest, FeedbackResponse, RouteOut};
use crate::models::{
    Coordinates, GenerateRouteRequest, GenerateRouteResponse, RawCandidate,
    RequestContext, RouteCandidate, RouteQuality, Scores, Spot, StageStatus, Theme, Tool,
};
use crate::services::copy::{
    fallback_title, normalize_description, normalize_title, template_descriptions,
};
use crate::services::directions::DirectionsProvider;
use crate::services::places::PlacesProvider;
use crate::services::polyline;
use crate::services::ranker::{RankRequest, Ranker};
use crate::services::text_gen::{TextGenerator, TextRequest};
use candidates::{CandidateGenerator, GenerationFailure};
use features::PoiSignals;
use futures::stream::{self, StreamExt};
use proposals::ProposalRng;
use serde::Serialize;
use spots::SpotCollector;
use state::{PipelineState, PlacesOutcome, Stage, StageUpdate, TextOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Salt so template choice does not track the first proposal jitter draw.
const TEMPLATE_SEED_SALT: u64 = 0x7465_7874;

#[derive(Serialize)]
struct CandidateRecord<'a> {
    route_id: &'a str,
    theme: Theme,
    distance_km: f64,
    is_fallback: bool,
    features: Option<&'a FeatureVector>,
    score: Option<f64>,
    shown_rank: Option<usize>,
    selected: bool,
    features_version: &'a str,
    ranker_version: &'a str,
}

#[derive(Serialize)]
struct ProposalRecord<'a> {
    route_id: &'a str,
    theme: Theme,
    title: &'a str,
    distance_km: f64,
    route_quality: Option<&'a RouteQuality>,
    fallback_reasons: Option<String>,
    tools_used: &'a [Tool],
    spot_count: usize,
    plan: Vec<String>,
    total_latency_ms: u64,
}

#[derive(Serialize)]
struct FeedbackRecord<'a> {
    route_id: &'a str,
    rating: i32,
}

pub struct RoutePipeline {
    generator: CandidateGenerator,
    collector: SpotCollector,
    /// `None` disables the ranking service; heuristic scores are used instead.
    ranker: Option<Arc<dyn Ranker>>,
    text_gen: Arc<dyn TextGenerator>,
    analytics: Arc<dyn AnalyticsSink>,
    config: PipelineConfig,
}

impl RoutePipeline {
    pub fn new(
        directions: Arc<dyn DirectionsProvider>,
        places: Arc<dyn PlacesProvider>,
        ranker: Option<Arc<dyn Ranker>>,
        text_gen: Arc<dyn TextGenerator>,
        analytics: Arc<dyn AnalyticsSink>,
        config: PipelineConfig,
    ) -> Self {
        RoutePipeline {
            generator: CandidateGenerator::new(directions, config.clone()),
            collector: SpotCollector::new(places, config.clone()),
            ranker,
            text_gen,
            analytics,
            config,
        }
    }

    pub async fn run(&self, request: &GenerateRouteRequest) -> Result<GenerateRouteResponse> {
        let started = Instant::now();

        let t = Instant::now();
        request.validate().map_err(AppError::Validation)?;
        let ctx = RequestContext::from(request);
        let seed = self
            .config
            .fixed_seed
            .unwrap_or_else(|| Uuid::new_v4().as_u128() as u64);
        let mut state = PipelineState::new(ctx, seed);
        state.merge(Stage::ValidateRequest, StageUpdate::Done, t.elapsed());

        tracing::info!(
            request_id = %state.ctx.request_id,
            theme = state.ctx.theme.as_str(),
            "Generating {:.2}km route from ({:.5}, {:.5}), round_trip={}",
            state.ctx.distance_km,
            state.ctx.start.lat,
            state.ctx.start.lng,
            state.ctx.round_trip
        );

        let t = Instant::now();
        self.store(AnalyticsTable::RouteRequest, &state.ctx.request_id, &[request]);
        state.merge(Stage::LogRequest, StageUpdate::Done, t.elapsed());

        let t = Instant::now();
        let update = self.generate_candidates(&state.ctx, seed).await;
        state.merge(Stage::GenerateCandidates, update, t.elapsed());

        match state.routes_status {
            StageStatus::Ok => {}
            StageStatus::Empty | StageStatus::Error | StageStatus::Skipped => {
                let t = Instant::now();
                tracing::warn!(
                    request_id = %state.ctx.request_id,
                    status = ?state.routes_status,
                    "No provider routes, using fallback candidate"
                );
                let fallback = fallback::build_fallback_candidate(&state.ctx).with_fresh_id();
                state.merge(
                    Stage::FallbackCandidates,
                    StageUpdate::FallbackCandidates(vec![fallback]),
                    t.elapsed(),
                );
            }
        }

        let t = Instant::now();
        let features = self.compute_features(&state).await;
        state.merge(Stage::ComputeFeatures, StageUpdate::Features(features), t.elapsed());

        let t = Instant::now();
        let update = self.score_by_ranker(&state).await;
        state.merge(Stage::ScoreByRanker, update, t.elapsed());

        match state.ranker_status {
            StageStatus::Ok => {}
            StageStatus::Empty | StageStatus::Error | StageStatus::Skipped => {
                let t = Instant::now();
                let scores = selection::heuristic_scores(
                    &state.candidates,
                    &state.features,
                    state.ctx.distance_km,
                );
                tracing::info!(
                    request_id = %state.ctx.request_id,
                    "Heuristic scores for {} candidates",
                    scores.len()
                );
                state.merge(
                    Stage::FallbackRanking,
                    StageUpdate::FallbackRanking(scores),
                    t.elapsed(),
                );
            }
        }

        let t = Instant::now();
        let selected = selection::select_route(&state.candidates, &state.scores, &state.ctx)
            .ok_or_else(|| {
                AppError::NoViableRoute(format!(
                    "no candidate for request {}",
                    state.ctx.request_id
                ))
            })?;
        let selected_route = selected.candidate.clone();
        tracing::info!(
            request_id = %state.ctx.request_id,
            route_id = %selected_route.route_id,
            "Selected {:.3}km route (score {:?}, rank {:?})",
            selected_route.distance_km,
            selected.best_score,
            selected.shown_rank
        );
        state.merge(Stage::SelectBestRoute, StageUpdate::Selected(selected), t.elapsed());

        let t = Instant::now();
        let sampled = waypoints::sample_route(&selected_route.polyline, &state.ctx);
        state.merge(Stage::SamplePoints, StageUpdate::Sampled(sampled), t.elapsed());

        let t = Instant::now();
        let permits = Semaphore::new(self.config.concurrency.max(1));
        let (places, mut text) = tokio::join!(
            self.fetch_places(&state, &permits),
            self.generate_text(&state.ctx, &selected_route, seed, &permits)
        );
        if !text.generated {
            // Template titles name the first spot once both branches are in.
            let spot_names: Vec<String> = places.spots.iter().map(|s| s.name.clone()).collect();
            text.title = normalize_title(&fallback_title(
                state.ctx.theme,
                selected_route.distance_km,
                &spot_names,
            ));
        }
        state.merge(
            Stage::ParallelPostprocess,
            StageUpdate::Postprocessed { places, text },
            t.elapsed(),
        );

        let t = Instant::now();
        let nav_waypoints = waypoints::build_nav_waypoints(
            &state.sampled.path,
            &state.sampled.sample_points,
            &state.ctx,
        );
        state.merge(Stage::SimplifyWaypoints, StageUpdate::Waypoints(nav_waypoints), t.elapsed());

        let t = Instant::now();
        let route_quality = quality::compute_quality(
            &selected_route,
            state.ctx.distance_km,
            &state.ledger,
            &state.tools_used,
        );
        state.merge(
            Stage::ComputeQuality,
            StageUpdate::Quality(route_quality.clone()),
            t.elapsed(),
        );

        let t = Instant::now();
        let details = quality::fallback_details(&state.ledger);
        state.merge(
            Stage::BuildFallbackDetails,
            StageUpdate::FallbackDetails(details),
            t.elapsed(),
        );

        let t = Instant::now();
        self.store_candidates(&state, &selected_route.route_id);
        state.merge(Stage::StoreCandidates, StageUpdate::Done, t.elapsed());

        let t = Instant::now();
        self.store_proposal(&state, &selected_route, started.elapsed().as_millis() as u64);
        state.merge(Stage::StoreProposal, StageUpdate::Done, t.elapsed());

        let t = Instant::now();
        let route = build_route_out(&state, &selected_route);
        state.merge(Stage::BuildResponse, StageUpdate::Done, t.elapsed());

        let fallback_used = quality::is_fallback_used(&state.ledger, &selected_route);
        tracing::info!(
            request_id = %state.ctx.request_id,
            fallback_used,
            fallback_reason = state.ledger.joined().as_deref().unwrap_or("none"),
            "Route ready in {}ms",
            started.elapsed().as_millis()
        );

        let (plan, debug) = if state.ctx.debug {
            (Some(state.plan_names()), Some(state.debug_info()))
        } else {
            (None, None)
        };

        Ok(GenerateRouteResponse {
            request_id: state.ctx.request_id.clone(),
            route,
            meta: RouteMeta {
                fallback_used,
                tools_used: state.tools_used.clone(),
                fallback_reason: state.ledger.joined(),
                fallback_details: state.fallback_details.clone(),
                route_quality,
                plan,
                debug,
            },
        })
    }

    /// Validate and record a rating. Storage is best-effort.
    pub fn record_feedback(&self, feedback: &FeedbackRequest) -> Result<FeedbackResponse> {
        feedback.validate().map_err(AppError::Validation)?;
        tracing::info!(
            request_id = %feedback.request_id,
            route_id = %feedback.route_id,
            rating = feedback.rating,
            "Feedback received"
        );
        self.store(
            AnalyticsTable::RouteFeedback,
            &feedback.request_id,
            &[FeedbackRecord {
                route_id: &feedback.route_id,
                rating: feedback.rating,
            }],
        );
        Ok(FeedbackResponse {
            request_id: feedback.request_id.clone(),
            route_id: feedback.route_id.clone(),
            status: "accepted".to_string(),
        })
    }

    async fn generate_candidates(&self, ctx: &RequestContext, seed: u64) -> StageUpdate {
        let mut rng = ProposalRng::new(seed);
        match self.generator.generate(ctx, &mut rng).await {
            Ok(generated) => StageUpdate::Candidates {
                status: StageStatus::Ok,
                candidates: generated
                    .candidates
                    .into_iter()
                    .map(RawCandidate::with_fresh_id)
                    .collect(),
                relaxation_step: generated.relaxation_step,
            },
            Err(failure) => {
                tracing::warn!(request_id = %ctx.request_id, "Candidate generation failed: {}", failure);
                let (status, relaxation_step) = match failure {
                    GenerationFailure::Empty { attempts, .. } => {
                        (StageStatus::Empty, attempts.saturating_sub(1))
                    }
                    GenerationFailure::Unavailable(_) => (StageStatus::Error, 0),
                };
                StageUpdate::Candidates {
                    status,
                    candidates: Vec::new(),
                    relaxation_step,
                }
            }
        }
    }

    async fn compute_features(&self, state: &PipelineState) -> HashMap<String, FeatureVector> {
        let ctx = &state.ctx;
        let paths: Vec<Vec<Coordinates>> = state
            .candidates
            .iter()
            .map(|c| {
                if is_degenerate_polyline(&c.polyline) {
                    Vec::new()
                } else {
                    polyline::decode(&c.polyline)
                }
            })
            .collect();

        let signals: Vec<PoiSignals> = if self.config.poi_features_enabled {
            let permits = Semaphore::new(self.config.concurrency.max(1));
            let permits = &permits;
            let paths = &paths;
            stream::iter(0..state.candidates.len().min(paths.len()))
                .map(|i| self.poi_signals(ctx, &state.candidates[i], &paths[i], state.seed, permits))
                .buffered(self.config.concurrency.max(1))
                .collect()
                .await
        } else {
            vec![PoiSignals::default(); state.candidates.len()]
        };

        let mut theme_ranks: HashMap<Theme, u32> = HashMap::new();
        state
            .candidates
            .iter()
            .zip(paths.iter().zip(signals.iter()))
            .map(|(candidate, (path, poi))| {
                let rank = theme_ranks.entry(candidate.theme).or_insert(0);
                *rank += 1;
                let features = features::compute_features(
                    candidate,
                    path,
                    ctx,
                    state.relaxation_step,
                    *rank,
                    poi,
                );
                (candidate.route_id.clone(), features)
            })
            .collect()
    }

    async fn poi_signals(
        &self,
        ctx: &RequestContext,
        candidate: &RouteCandidate,
        path: &[Coordinates],
        seed: u64,
        permits: &Semaphore,
    ) -> PoiSignals {
        if candidate.is_fallback {
            return PoiSignals::default();
        }
        let Ok(_permit) = permits.acquire().await else {
            return PoiSignals::default();
        };
        self.collector
            .signals_for(ctx, path, candidate.distance_km, seed)
            .await
    }

    async fn score_by_ranker(&self, state: &PipelineState) -> StageUpdate {
        let request_id = &state.ctx.request_id;
        let Some(ranker) = &self.ranker else {
            tracing::info!(request_id = %request_id, "Ranker disabled");
            return StageUpdate::Ranking {
                status: StageStatus::Skipped,
                scores: Scores::new(),
            };
        };

        let request = RankRequest {
            request_id: request_id.clone(),
            routes: selection::representatives(&state.candidates, &state.features),
        };
        let (status, scores) =
            match tokio::time::timeout(self.config.ranker_timeout(), ranker.rank(&request)).await {
                Ok(Ok(response)) => {
                    if !response.failed_route_ids.is_empty() {
                        tracing::warn!(
                            request_id = %request_id,
                            "Ranker failed to score {} routes",
                            response.failed_route_ids.len()
                        );
                    }
                    let scores: Scores = response
                        .scores
                        .into_iter()
                        .filter(|s| s.score.is_finite())
                        .filter(|s| state.candidates.iter().any(|c| c.route_id == s.route_id))
                        .collect();
                    if scores.is_empty() {
                        (StageStatus::Empty, scores)
                    } else {
                        (StageStatus::Ok, scores)
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(request_id = %request_id, "Ranker failed: {}", e);
                    (StageStatus::Error, Scores::new())
                }
                Err(_) => {
                    tracing::warn!(
                        request_id = %request_id,
                        "Ranker timed out after {}ms",
                        self.config.ranker_timeout_ms
                    );
                    (StageStatus::Error, Scores::new())
                }
            };
        StageUpdate::Ranking { status, scores }
    }

    async fn fetch_places(&self, state: &PipelineState, permits: &Semaphore) -> PlacesOutcome {
        let ctx = &state.ctx;
        let failed = PlacesOutcome {
            status: StageStatus::Error,
            spots: Vec::new(),
        };
        let Ok(_permit) = permits.acquire().await else {
            return failed;
        };

        match self
            .collector
            .collect(&ctx.request_id, ctx.theme, &state.sampled.sample_points, state.seed)
            .await
        {
            Ok(collected) => {
                let spots: Vec<Spot> = spots::spots_along_route(&collected, &state.sampled.path)
                    .iter()
                    .map(Spot::from)
                    .collect();
                tracing::info!(request_id = %ctx.request_id, "Attached {} spots", spots.len());
                PlacesOutcome {
                    status: if spots.is_empty() {
                        StageStatus::Empty
                    } else {
                        StageStatus::Ok
                    },
                    spots,
                }
            }
            Err(e) => {
                tracing::warn!(request_id = %ctx.request_id, "Place search failed: {}", e);
                failed
            }
        }
    }

    async fn generate_text(
        &self,
        ctx: &RequestContext,
        route: &RouteCandidate,
        seed: u64,
        permits: &Semaphore,
    ) -> TextOutcome {
        let distance_km = route.distance_km;
        let duration_min = route
            .duration_min
            .unwrap_or_else(|| fallback::estimate_duration_min(distance_km));
        let request = TextRequest {
            request_id: ctx.request_id.clone(),
            theme: ctx.theme,
            distance_km,
            duration_min,
            spot_names: Vec::new(),
        };

        let generated = match permits.acquire().await {
            Ok(_permit) => {
                match tokio::time::timeout(
                    self.config.text_gen_timeout(),
                    self.text_gen.generate(&request),
                )
                .await
                {
                    Ok(Ok(Some(text))) if !text.description.trim().is_empty() => Some(text),
                    Ok(Ok(_)) => {
                        tracing::warn!(request_id = %ctx.request_id, "Text generation returned nothing");
                        None
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(request_id = %ctx.request_id, "Text generation failed: {}", e);
                        None
                    }
                    Err(_) => {
                        tracing::warn!(
                            request_id = %ctx.request_id,
                            "Text generation timed out after {}ms",
                            self.config.text_gen_timeout_ms
                        );
                        None
                    }
                }
            }
            Err(_) => None,
        };

        let default_title = fallback_title(ctx.theme, distance_km, &request.spot_names);
        match generated {
            Some(text) => TextOutcome {
                title: normalize_title(text.title.as_deref().unwrap_or(&default_title)),
                summary: normalize_description(&text.description, distance_km, duration_min),
                generated: true,
            },
            None => {
                let templates = template_descriptions(ctx.theme);
                let idx = ProposalRng::new(seed ^ TEMPLATE_SEED_SALT).pick(templates.len());
                TextOutcome {
                    title: normalize_title(&default_title),
                    summary: normalize_description(templates[idx], distance_km, duration_min),
                    generated: false,
                }
            }
        }
    }

    fn store<T: Serialize>(&self, table: AnalyticsTable, request_id: &str, records: &[T]) {
        let rows: Vec<AnalyticsRow> = records
            .iter()
            .filter_map(|record| match AnalyticsRow::from_record(request_id, record) {
                Ok(row) => Some(row),
                Err(e) => {
                    tracing::warn!(request_id, table = table.table_name(), "Dropping row: {}", e);
                    None
                }
            })
            .collect();
        spawn_insert(self.analytics.clone(), table, rows);
    }

    fn store_candidates(&self, state: &PipelineState, selected_id: &str) {
        let ranks = state.scores.rank_map();
        let records: Vec<CandidateRecord> = state
            .candidates
            .iter()
            .map(|c| CandidateRecord {
                route_id: &c.route_id,
                theme: c.theme,
                distance_km: c.distance_km,
                is_fallback: c.is_fallback,
                features: state.features.get(&c.route_id),
                score: state.scores.get(&c.route_id),
                shown_rank: ranks.get(&c.route_id).copied(),
                selected: c.route_id == selected_id,
                features_version: &self.config.features_version,
                ranker_version: &self.config.ranker_version,
            })
            .collect();
        self.store(AnalyticsTable::RouteCandidate, &state.ctx.request_id, &records);
    }

    fn store_proposal(&self, state: &PipelineState, route: &RouteCandidate, total_latency_ms: u64) {
        let record = ProposalRecord {
            route_id: &route.route_id,
            theme: state.ctx.theme,
            title: &state.title,
            distance_km: route.distance_km,
            route_quality: state.quality.as_ref(),
            fallback_reasons: state.ledger.joined(),
            tools_used: &state.tools_used,
            spot_count: state.spots.len(),
            plan: state.plan_names(),
            total_latency_ms,
        };
        self.store(AnalyticsTable::RouteProposal, &state.ctx.request_id, &[record]);
    }
}

fn build_route_out(state: &PipelineState, route: &RouteCandidate) -> RouteOut {
    let polyline = state
        .sampled
        .reencoded
        .clone()
        .unwrap_or_else(|| route.polyline.clone());
    let duration_min = route
        .duration_min
        .unwrap_or_else(|| fallback::estimate_duration_min(route.distance_km));

    RouteOut {
        route_id: route.route_id.clone(),
        polyline,
        distance_km: route.distance_km,
        duration_min: duration_min.round().max(0.0) as u32,
        title: state.title.clone(),
        summary: state.summary.clone(),
        nav_waypoints: state.nav_waypoints.clone(),
        spots: state.spots.clone(),
    }
}
