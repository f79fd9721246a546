use super::waypoints::SampledRoute;
use crate::models::features::FeatureVector;
use crate::models::meta::{DebugCandidate, DebugInfo};
use crate::models::{
    Coordinates, FallbackDetail, FallbackLedger, FallbackReason, RequestContext, RouteCandidate,
    RouteQuality, Scores, SelectedRoute, Spot, StageStatus, Tool,
};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Candidates listed in the debug payload.
const DEBUG_CANDIDATES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ValidateRequest,
    LogRequest,
    GenerateCandidates,
    FallbackCandidates,
    ComputeFeatures,
    ScoreByRanker,
    FallbackRanking,
    SelectBestRoute,
    SamplePoints,
    ParallelPostprocess,
    SimplifyWaypoints,
    ComputeQuality,
    BuildFallbackDetails,
    StoreCandidates,
    StoreProposal,
    BuildResponse,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ValidateRequest => "validate_request",
            Stage::LogRequest => "log_request",
            Stage::GenerateCandidates => "generate_candidates",
            Stage::FallbackCandidates => "fallback_candidates",
            Stage::ComputeFeatures => "compute_features",
            Stage::ScoreByRanker => "score_by_ranker",
            Stage::FallbackRanking => "fallback_ranking",
            Stage::SelectBestRoute => "select_best_route",
            Stage::SamplePoints => "sample_points_from_polyline",
            Stage::ParallelPostprocess => "parallel_postprocess",
            Stage::SimplifyWaypoints => "simplify_polyline_to_waypoints",
            Stage::ComputeQuality => "compute_quality",
            Stage::BuildFallbackDetails => "build_fallback_details",
            Stage::StoreCandidates => "store_candidates",
            Stage::StoreProposal => "store_proposal",
            Stage::BuildResponse => "build_response",
        }
    }
}

/// Result of the place branch of the fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacesOutcome {
    pub status: StageStatus,
    pub spots: Vec<Spot>,
}

/// Result of the text branch of the fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOutcome {
    pub title: String,
    pub summary: String,
    /// False when template copy was used.
    pub generated: bool,
}

/// Output of one stage, merged into [`PipelineState`].
#[derive(Debug, Clone)]
pub enum StageUpdate {
    /// Stages that only have side effects.
    Done,
    Candidates {
        status: StageStatus,
        candidates: Vec<RouteCandidate>,
        relaxation_step: u32,
    },
    FallbackCandidates(Vec<RouteCandidate>),
    Features(HashMap<String, FeatureVector>),
    Ranking {
        status: StageStatus,
        scores: Scores,
    },
    FallbackRanking(Scores),
    Selected(SelectedRoute),
    Sampled(SampledRoute),
    Postprocessed {
        places: PlacesOutcome,
        text: TextOutcome,
    },
    Waypoints(Vec<Coordinates>),
    Quality(RouteQuality),
    FallbackDetails(Vec<FallbackDetail>),
}

/// Everything one request has produced so far. Each stage writes only its own fields,
/// and tools and fallback reasons are only ever appended here in `merge`.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub ctx: RequestContext,
    pub seed: u64,
    pub routes_status: StageStatus,
    pub ranker_status: StageStatus,
    pub places_status: StageStatus,
    pub candidates: Vec<RouteCandidate>,
    pub relaxation_step: u32,
    pub features: HashMap<String, FeatureVector>,
    pub scores: Scores,
    pub selected: Option<SelectedRoute>,
    pub sampled: SampledRoute,
    pub spots: Vec<Spot>,
    pub title: String,
    pub summary: String,
    pub nav_waypoints: Vec<Coordinates>,
    pub quality: Option<RouteQuality>,
    pub fallback_details: Vec<FallbackDetail>,
    pub ledger: FallbackLedger,
    pub tools_used: Vec<Tool>,
    pub plan: Vec<Stage>,
    pub latency_ms: BTreeMap<String, u64>,
}

impl PipelineState {
    pub fn new(ctx: RequestContext, seed: u64) -> Self {
        Self {
            ctx,
            seed,
            routes_status: StageStatus::Skipped,
            ranker_status: StageStatus::Skipped,
            places_status: StageStatus::Skipped,
            candidates: Vec::new(),
            relaxation_step: 0,
            features: HashMap::new(),
            scores: Scores::new(),
            selected: None,
            sampled: SampledRoute::default(),
            spots: Vec::new(),
            title: String::new(),
            summary: String::new(),
            nav_waypoints: Vec::new(),
            quality: None,
            fallback_details: Vec::new(),
            ledger: FallbackLedger::new(),
            tools_used: Vec::new(),
            plan: Vec::new(),
            latency_ms: BTreeMap::new(),
        }
    }

    fn use_tool(&mut self, tool: Tool) {
        if !self.tools_used.contains(&tool) {
            self.tools_used.push(tool);
        }
    }

    pub fn merge(&mut self, stage: Stage, update: StageUpdate, elapsed: Duration) {
        self.plan.push(stage);
        self.latency_ms
            .insert(stage.as_str().to_string(), elapsed.as_millis() as u64);

        match update {
            StageUpdate::Done => {}
            StageUpdate::Candidates {
                status,
                candidates,
                relaxation_step,
            } => {
                self.routes_status = status;
                if status == StageStatus::Ok {
                    self.use_tool(Tool::MapsRoutes);
                }
                self.candidates = candidates;
                self.relaxation_step = relaxation_step;
            }
            StageUpdate::FallbackCandidates(candidates) => {
                self.ledger.record(FallbackReason::MapsRoutesFailed);
                self.candidates = candidates;
            }
            StageUpdate::Features(features) => self.features = features,
            StageUpdate::Ranking { status, scores } => {
                self.ranker_status = status;
                if status == StageStatus::Ok {
                    self.use_tool(Tool::Ranker);
                }
                self.scores = scores;
            }
            StageUpdate::FallbackRanking(scores) => {
                self.ledger.record(FallbackReason::RankerFailed);
                self.scores = scores;
            }
            StageUpdate::Selected(selected) => {
                if selected.replaced {
                    self.ledger.record(FallbackReason::InvalidRouteDetected);
                }
                self.selected = Some(selected);
            }
            StageUpdate::Sampled(sampled) => self.sampled = sampled,
            StageUpdate::Postprocessed { places, text } => {
                self.places_status = places.status;
                if places.status == StageStatus::Ok {
                    self.use_tool(Tool::Places);
                }
                self.spots = places.spots;
                if text.generated {
                    self.use_tool(Tool::TextGen);
                } else {
                    self.ledger.record(FallbackReason::VertexLlmFailed);
                }
                self.title = text.title;
                self.summary = text.summary;
            }
            StageUpdate::Waypoints(waypoints) => self.nav_waypoints = waypoints,
            StageUpdate::Quality(quality) => self.quality = Some(quality),
            StageUpdate::FallbackDetails(details) => self.fallback_details = details,
        }
    }

    pub fn plan_names(&self) -> Vec<String> {
        self.plan.iter().map(|s| s.as_str().to_string()).collect()
    }

    pub fn debug_info(&self) -> DebugInfo {
        DebugInfo {
            routes_api_status: self.routes_status,
            ranker_status: self.ranker_status,
            places_status: self.places_status,
            candidates: self
                .candidates
                .iter()
                .take(DEBUG_CANDIDATES)
                .map(|c| DebugCandidate {
                    route_id: c.route_id.clone(),
                    distance_km: c.distance_km,
                    score: self.scores.get(&c.route_id),
                    is_fallback: c.is_fallback,
                })
                .collect(),
            scores: self.scores.sorted_desc(),
            latency_ms: self.latency_ms.clone(),
        }
    }
}
