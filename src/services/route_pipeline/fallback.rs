use crate::constants::{FALLBACK_POINT_OFFSET_DEG, FALLBACK_POLYLINE_LITERAL, WALKING_SPEED_KMH};
use crate::models::{Coordinates, RawCandidate, RequestContext};
use crate::services::polyline;

/// Walking time at the default pace, in minutes.
pub fn estimate_duration_min(distance_km: f64) -> f64 {
    distance_km.max(0.0) / WALKING_SPEED_KMH * 60.0
}

/// Nudge by the fallback offset, away from the bound it would cross.
fn offset_inward(value: f64, bound: f64) -> f64 {
    if value + FALLBACK_POINT_OFFSET_DEG > bound {
        value - FALLBACK_POINT_OFFSET_DEG
    } else {
        value + FALLBACK_POINT_OFFSET_DEG
    }
}

/// Synthetic two-point candidate that keeps the pipeline alive when no real route exists.
///
/// The distance is pinned to the requested target, so distance matching scores it as exact.
pub fn build_fallback_candidate(ctx: &RequestContext) -> RawCandidate {
    let start = ctx.start;
    let second = match ctx.end {
        Some(end) if !ctx.round_trip => end,
        _ => Coordinates {
            lat: offset_inward(start.lat, 90.0),
            lng: offset_inward(start.lng, 180.0),
        },
    };

    let encoded = match polyline::encode(&[start, second]) {
        Ok(encoded) if !encoded.trim().is_empty() => encoded,
        Ok(_) => FALLBACK_POLYLINE_LITERAL.to_string(),
        Err(e) => {
            tracing::warn!(
                request_id = %ctx.request_id,
                "Fallback polyline encoding failed, using literal: {}",
                e
            );
            FALLBACK_POLYLINE_LITERAL.to_string()
        }
    };

    RawCandidate {
        polyline: encoded,
        distance_km: ctx.distance_km,
        duration_min: Some(estimate_duration_min(ctx.distance_km)),
        theme: ctx.theme,
        is_fallback: true,
        has_stairs: false,
        elevation_gain_m: 0.0,
    }
}
