use super::candidates::{distance_error_ratio, heuristic_score};
use super::fallback::build_fallback_candidate;
use crate::constants::RANKER_REPRESENTATIVES;
use crate::models::features::FeatureVector;
use crate::models::{RequestContext, RouteCandidate, RouteScore, Scores, SelectedRoute, Theme};
use crate::services::ranker::RankRoute;
use std::collections::HashMap;

/// The first candidates in generation order, paired with their features, for the ranker.
pub fn representatives(
    candidates: &[RouteCandidate],
    features: &HashMap<String, FeatureVector>,
) -> Vec<RankRoute> {
    candidates
        .iter()
        .take(RANKER_REPRESENTATIVES)
        .map(|c| RankRoute {
            route_id: c.route_id.clone(),
            features: features.get(&c.route_id).cloned().unwrap_or_default(),
        })
        .collect()
}

/// Heuristic score for every candidate, not only the representatives.
pub fn heuristic_scores(
    candidates: &[RouteCandidate],
    features: &HashMap<String, FeatureVector>,
    target_km: f64,
) -> Scores {
    candidates
        .iter()
        .map(|c| {
            let score = match features.get(&c.route_id) {
                Some(f) => heuristic_score(
                    f.distance_error_ratio,
                    f.turn_count as usize,
                    f.elevation_gain_m,
                ),
                None => heuristic_score(
                    distance_error_ratio(c.distance_km, target_km),
                    0,
                    c.elevation_gain_m,
                ),
            };
            RouteScore {
                route_id: c.route_id.clone(),
                score,
            }
        })
        .collect()
}

/// Highest score among candidates of the requested theme (all candidates when none match).
/// Ties keep generation order; with no scores at all the first candidate wins.
pub fn choose_best_route<'a>(
    candidates: &'a [RouteCandidate],
    scores: &Scores,
    theme: Theme,
) -> Option<&'a RouteCandidate> {
    let themed: Vec<&RouteCandidate> = candidates.iter().filter(|c| c.theme == theme).collect();
    let pool: Vec<&RouteCandidate> = if themed.is_empty() {
        candidates.iter().collect()
    } else {
        themed
    };

    let mut best: Option<(&RouteCandidate, f64)> = None;
    for candidate in pool.iter().copied() {
        if let Some(score) = scores.get(&candidate.route_id) {
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((candidate, score));
            }
        }
    }
    best.map(|(c, _)| c).or_else(|| pool.first().copied())
}

/// Pick the winner and swap it for a synthetic route if it turns out to be degenerate.
pub fn select_route(
    candidates: &[RouteCandidate],
    scores: &Scores,
    ctx: &RequestContext,
) -> Option<SelectedRoute> {
    let rank_map = scores.rank_map();
    let chosen = choose_best_route(candidates, scores, ctx.theme)?;

    if chosen.is_valid() {
        return Some(SelectedRoute {
            candidate: chosen.clone(),
            best_score: scores.get(&chosen.route_id),
            shown_rank: rank_map.get(&chosen.route_id).copied(),
            replaced: false,
        });
    }

    tracing::warn!(
        request_id = %ctx.request_id,
        route_id = %chosen.route_id,
        "Selected route is invalid ({:.3}km), substituting fallback",
        chosen.distance_km
    );
    Some(SelectedRoute {
        candidate: build_fallback_candidate(ctx).with_fresh_id(),
        best_score: None,
        shown_rank: None,
        replaced: true,
    })
}
