use super::proposals::{build_proposals, Proposal, ProposalRng};
use crate::config::PipelineConfig;
use crate::constants::{
    HEURISTIC_ELEVATION_WEIGHT, HEURISTIC_TURN_WEIGHT, MIN_ADJUSTED_TARGET_KM,
    MIN_VALID_DISTANCE_KM, SHORT_DISTANCE_ERROR_RATIO_CAP,
};
use crate::models::route::is_degenerate_polyline;
use crate::models::{RawCandidate, RequestContext};
use crate::services::directions::{DirectionsError, DirectionsProvider, ProviderRoute};
use crate::services::{geometry, polyline};
use std::sync::Arc;
use thiserror::Error;

/// Provider-backed candidates from the first attempt that produced any.
#[derive(Debug, Clone)]
pub struct GeneratedCandidates {
    pub candidates: Vec<RawCandidate>,
    /// Zero-based index of the attempt that produced them.
    pub relaxation_step: u32,
    /// Internal target used for that attempt.
    pub target_km: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum GenerationFailure {
    /// Every attempt finished without a usable candidate.
    #[error("no candidate after {attempts} attempts ({filtered_out} filtered out)")]
    Empty { attempts: u32, filtered_out: usize },

    #[error("directions provider unavailable: {0}")]
    Unavailable(String),
}

/// `|distance - target| / target`, or 1.0 when the target is not positive.
pub fn distance_error_ratio(distance_km: f64, target_km: f64) -> f64 {
    if target_km <= 0.0 {
        return 1.0;
    }
    (distance_km - target_km).abs() / target_km
}

/// Provider-independent score: distance match first, fewer turns and less climbing second.
pub fn heuristic_score(distance_error_ratio: f64, turn_count: usize, elevation_gain_m: f64) -> f64 {
    let score = (1.0 - distance_error_ratio.min(1.0))
        + HEURISTIC_TURN_WEIGHT / (1.0 + turn_count as f64)
        + HEURISTIC_ELEVATION_WEIGHT / (1.0 + elevation_gain_m.max(0.0));
    score.max(0.0)
}

pub fn within_distance_tolerance(distance_km: f64, target_km: f64, max_ratio: f64) -> bool {
    distance_error_ratio(distance_km, target_km) <= max_ratio
}

/// Asks the directions provider to route diversified geometric proposals.
pub struct CandidateGenerator {
    directions: Arc<dyn DirectionsProvider>,
    config: PipelineConfig,
}

impl CandidateGenerator {
    pub fn new(directions: Arc<dyn DirectionsProvider>, config: PipelineConfig) -> Self {
        Self { directions, config }
    }

    fn is_short(&self, target_km: f64) -> bool {
        target_km <= self.config.short_distance_max_km
    }

    /// Accepted distance error; short targets are held to a tighter bound.
    pub fn max_error_ratio(&self, target_km: f64) -> f64 {
        if self.is_short(target_km) {
            self.config
                .distance_error_ratio_max
                .min(SHORT_DISTANCE_ERROR_RATIO_CAP)
        } else {
            self.config.distance_error_ratio_max
        }
    }

    /// First-attempt target. Short routes tend to come back long, so they start lower.
    pub fn initial_target(&self, target_km: f64) -> f64 {
        let ratio = self.config.short_distance_target_ratio;
        if self.is_short(target_km) && (0.5..1.0).contains(&ratio) {
            (target_km * ratio).max(MIN_ADJUSTED_TARGET_KM)
        } else {
            target_km
        }
    }

    pub async fn generate(
        &self,
        ctx: &RequestContext,
        rng: &mut ProposalRng,
    ) -> Result<GeneratedCandidates, GenerationFailure> {
        let original_km = ctx.distance_km;
        let max_ratio = self.max_error_ratio(original_km);
        let attempts = self.config.distance_retry_max as u32 + 1;
        let min_routes = self.config.min_routes.max(1);
        let mut target_km = self.initial_target(original_km);
        let mut filtered_out = 0;

        if target_km != original_km {
            tracing::info!(
                request_id = %ctx.request_id,
                "Short target pre-adjusted from {:.3}km to {:.3}km",
                original_km,
                target_km
            );
        }

        for attempt in 1..=attempts {
            let proposals = build_proposals(ctx, target_km, self.config.max_routes.max(1), rng);
            let mut accepted: Vec<RawCandidate> = Vec::new();
            let mut best_score: Option<f64> = None;
            let mut closest: Option<(f64, f64)> = None;

            for (idx, proposal) in proposals.iter().enumerate() {
                let route = match self.fetch(ctx, proposal, target_km).await {
                    Ok(Some(route)) => route,
                    Ok(None) => {
                        tracing::debug!(
                            request_id = %ctx.request_id,
                            idx,
                            shape = proposal.shape.as_str(),
                            "Directions returned no route"
                        );
                        continue;
                    }
                    Err(DirectionsError::NotConfigured) => {
                        return Err(GenerationFailure::Unavailable(
                            DirectionsError::NotConfigured.to_string(),
                        ));
                    }
                    Err(e @ DirectionsError::Rejected { .. }) => {
                        tracing::warn!(
                            request_id = %ctx.request_id,
                            attempt,
                            "Aborting attempt: {}",
                            e
                        );
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(request_id = %ctx.request_id, idx, "Skipping proposal: {}", e);
                        continue;
                    }
                };

                if route.distance_km <= MIN_VALID_DISTANCE_KM || is_degenerate_polyline(&route.polyline)
                {
                    filtered_out += 1;
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        idx,
                        "Invalid route: {:.3}km, polyline {:?}",
                        route.distance_km,
                        route.polyline.chars().take(20).collect::<String>()
                    );
                    continue;
                }

                let ratio = distance_error_ratio(route.distance_km, original_km);
                if closest.map_or(true, |(best_ratio, _)| ratio < best_ratio) {
                    closest = Some((ratio, route.distance_km));
                }
                if !within_distance_tolerance(route.distance_km, original_km, max_ratio) {
                    filtered_out += 1;
                    tracing::info!(
                        request_id = %ctx.request_id,
                        idx,
                        attempt,
                        "Filtered route: error ratio {:.3} > {:.3} ({:.3}km for {:.3}km)",
                        ratio,
                        max_ratio,
                        route.distance_km,
                        original_km
                    );
                    continue;
                }

                let turns = geometry::count_turns(&polyline::decode(&route.polyline));
                let score = heuristic_score(ratio, turns, route.elevation_gain_m);
                best_score = Some(best_score.map_or(score, |b: f64| b.max(score)));
                accepted.push(RawCandidate {
                    polyline: route.polyline,
                    distance_km: route.distance_km,
                    duration_min: route.duration_min,
                    theme: ctx.theme,
                    is_fallback: false,
                    has_stairs: route.has_stairs,
                    elevation_gain_m: route.elevation_gain_m,
                });

                let best = best_score.unwrap_or(0.0);
                if accepted.len() >= min_routes && best >= self.config.score_threshold {
                    tracing::info!(
                        request_id = %ctx.request_id,
                        "Early exit with {} candidates, best score {:.3}",
                        accepted.len(),
                        best
                    );
                    break;
                }
            }

            if !accepted.is_empty() {
                tracing::info!(
                    request_id = %ctx.request_id,
                    attempt,
                    "Generated {} candidates",
                    accepted.len()
                );
                return Ok(GeneratedCandidates {
                    candidates: accepted,
                    relaxation_step: attempt - 1,
                    target_km,
                });
            }

            if attempt < attempts {
                if let Some((_, closest_km)) = closest.filter(|_| self.is_short(original_km)) {
                    if closest_km > 0.0 {
                        let adjusted = (target_km * target_km / closest_km)
                            .clamp(MIN_ADJUSTED_TARGET_KM, original_km.max(MIN_ADJUSTED_TARGET_KM));
                        tracing::info!(
                            request_id = %ctx.request_id,
                            attempt,
                            "Target adjusted from {:.3}km to {:.3}km (closest {:.3}km)",
                            target_km,
                            adjusted,
                            closest_km
                        );
                        target_km = adjusted;
                    }
                }
                tracing::info!(
                    request_id = %ctx.request_id,
                    "Retrying generation, {} filtered so far (attempt {}/{})",
                    filtered_out,
                    attempt,
                    attempts
                );
            }
        }

        Err(GenerationFailure::Empty {
            attempts,
            filtered_out,
        })
    }

    async fn fetch(
        &self,
        ctx: &RequestContext,
        proposal: &Proposal,
        target_km: f64,
    ) -> Result<Option<ProviderRoute>, DirectionsError> {
        let request = proposal.to_request(ctx.start, ctx.round_trip, target_km);
        match tokio::time::timeout(
            self.config.directions_timeout(),
            self.directions.compute_route(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DirectionsError::Upstream(format!(
                "timed out after {}ms",
                self.config.directions_timeout_ms
            ))),
        }
    }
}
