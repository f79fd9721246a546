use crate::models::score::RouteScore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// External collaborator that contributed to a response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    MapsRoutes,
    Places,
    Ranker,
    #[serde(rename = "vertex_llm")]
    TextGen,
}

/// Outcome of a stage that talks to an external service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ok,
    Empty,
    Error,
    #[default]
    Skipped,
}

pub type RoutesStatus = StageStatus;
pub type RankerStatus = StageStatus;
pub type PlacesStatus = StageStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    MapsRoutesFailed,
    RankerFailed,
    VertexLlmFailed,
    InvalidRouteDetected,
}

impl FallbackReason {
    pub fn code(&self) -> &'static str {
        match self {
            FallbackReason::MapsRoutesFailed => "maps_routes_failed",
            FallbackReason::RankerFailed => "ranker_failed",
            FallbackReason::VertexLlmFailed => "vertex_llm_failed",
            FallbackReason::InvalidRouteDetected => "invalid_route_detected",
        }
    }

    /// User-facing explanation of the degradation.
    pub fn detail(&self) -> FallbackDetail {
        let (description, impact) = match self {
            FallbackReason::MapsRoutesFailed => (
                "The route generation service was unavailable.",
                "A simplified route was generated. Its distance matches your target, but the path may differ from the actual streets.",
            ),
            FallbackReason::RankerFailed => (
                "The route ranking service was unavailable.",
                "Routes were not optimised. Distance and time are close to your target, but this may not be the best route.",
            ),
            FallbackReason::VertexLlmFailed => (
                "The route description could not be generated.",
                "A template description is shown. The route itself was generated normally.",
            ),
            FallbackReason::InvalidRouteDetected => (
                "The generated route was invalid.",
                "A simplified route was generated. Its distance matches your target, but the path may differ from the actual streets.",
            ),
        };
        FallbackDetail {
            reason: self.code().to_string(),
            description: description.to_string(),
            impact: impact.to_string(),
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Append-only ordered set of fallback reasons for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FallbackLedger {
    reasons: Vec<FallbackReason>,
}

impl FallbackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, reason: FallbackReason) {
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }

    pub fn contains(&self, reason: FallbackReason) -> bool {
        self.reasons.contains(&reason)
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FallbackReason> {
        self.reasons.iter()
    }

    /// Comma-joined codes, `None` when nothing degraded.
    pub fn joined(&self) -> Option<String> {
        if self.reasons.is_empty() {
            return None;
        }
        Some(
            self.reasons
                .iter()
                .map(|r| r.code())
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FallbackDetail {
    pub reason: String,
    pub description: String,
    pub impact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteQuality {
    pub is_fallback: bool,
    pub distance_match: f64,
    pub distance_error_km: f64,
    pub quality_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebugCandidate {
    pub route_id: String,
    pub distance_km: f64,
    pub score: Option<f64>,
    pub is_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebugInfo {
    pub routes_api_status: RoutesStatus,
    pub ranker_status: RankerStatus,
    pub places_status: PlacesStatus,
    pub candidates: Vec<DebugCandidate>,
    pub scores: Vec<RouteScore>,
    pub latency_ms: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteMeta {
    pub fallback_used: bool,
    pub tools_used: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fallback_reason: Option<String>,
    pub fallback_details: Vec<FallbackDetail>,
    pub route_quality: RouteQuality,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub plan: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub debug: Option<DebugInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_is_an_ordered_set() {
        let mut ledger = FallbackLedger::new();
        ledger.record(FallbackReason::RankerFailed);
        ledger.record(FallbackReason::MapsRoutesFailed);
        ledger.record(FallbackReason::RankerFailed);

        assert_eq!(
            ledger.joined().as_deref(),
            Some("ranker_failed,maps_routes_failed")
        );
        assert!(FallbackLedger::new().joined().is_none());
    }

    #[test]
    fn tools_serialize_to_wire_names() {
        let json = serde_json::to_string(&[Tool::MapsRoutes, Tool::TextGen]).unwrap();
        assert_eq!(json, r#"["maps_routes","vertex_llm"]"#);
    }

    #[test]
    fn every_reason_has_a_detail() {
        for reason in [
            FallbackReason::MapsRoutesFailed,
            FallbackReason::RankerFailed,
            FallbackReason::VertexLlmFailed,
            FallbackReason::InvalidRouteDetected,
        ] {
            let detail = reason.detail();
            assert_eq!(detail.reason, reason.code());
            assert!(!detail.description.is_empty());
            assert!(!detail.impact.is_empty());
        }
    }
}
