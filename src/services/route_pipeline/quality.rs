use super::candidates::distance_error_ratio;
use crate::constants::{
    DISTANCE_MATCH_FULL_RATIO, DISTANCE_MATCH_ZERO_RATIO, QUALITY_DISTANCE_MATCH_WEIGHT,
    QUALITY_MIN_TOOLS, QUALITY_NON_FALLBACK_WEIGHT, QUALITY_TOOLS_WEIGHT,
};
use crate::models::{FallbackDetail, FallbackLedger, RouteCandidate, RouteQuality, Tool};
use std::collections::HashSet;

/// 1.0 up to a 10% error, 0.0 from 50%, linear in between.
pub fn distance_match(error_ratio: f64) -> f64 {
    if error_ratio <= DISTANCE_MATCH_FULL_RATIO {
        1.0
    } else if error_ratio >= DISTANCE_MATCH_ZERO_RATIO {
        0.0
    } else {
        1.0 - (error_ratio - DISTANCE_MATCH_FULL_RATIO)
            / (DISTANCE_MATCH_ZERO_RATIO - DISTANCE_MATCH_FULL_RATIO)
    }
}

pub fn is_fallback_used(ledger: &FallbackLedger, selected: &RouteCandidate) -> bool {
    !ledger.is_empty() || selected.is_fallback
}

pub fn compute_quality(
    selected: &RouteCandidate,
    target_km: f64,
    ledger: &FallbackLedger,
    tools_used: &[Tool],
) -> RouteQuality {
    let distance_error_km = (selected.distance_km - target_km).abs();
    let matched = distance_match(distance_error_ratio(selected.distance_km, target_km));
    let is_fallback = selected.is_fallback || is_fallback_used(ledger, selected);
    let distinct_tools = tools_used.iter().collect::<HashSet<_>>().len();

    let mut score = QUALITY_DISTANCE_MATCH_WEIGHT * matched;
    if !is_fallback {
        score += QUALITY_NON_FALLBACK_WEIGHT;
    }
    if distinct_tools >= QUALITY_MIN_TOOLS {
        score += QUALITY_TOOLS_WEIGHT;
    }

    RouteQuality {
        is_fallback,
        distance_match: matched,
        distance_error_km,
        quality_score: score.clamp(0.0, 1.0),
    }
}

/// User-facing explanation for each recorded reason, in ledger order.
pub fn fallback_details(ledger: &FallbackLedger) -> Vec<FallbackDetail> {
    ledger.iter().map(|reason| reason.detail()).collect()
}
