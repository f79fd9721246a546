use super::fallback::estimate_duration_min;
use crate::constants::ROUND_TRIP_FIT_MAX_M;
use crate::models::features::FeatureVector;
use crate::models::{Coordinates, RequestContext, RouteCandidate, Theme};
use crate::services::geometry;

/// Signals derived from places found around a candidate. All zero when the search failed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoiSignals {
    pub spot_type_diversity: f64,
    pub poi_density: f64,
    pub park_poi_ratio: f64,
    pub detour_over_ratio: f64,
}

/// How far a spot may sit from the path before it counts as a detour.
pub fn detour_allowance_m(target_km: f64) -> f64 {
    if target_km <= 3.0 {
        150.0
    } else if target_km <= 6.0 {
        250.0
    } else if target_km <= 10.0 {
        400.0
    } else {
        600.0
    }
}

/// Flatten one candidate and its context into ranker inputs.
pub fn compute_features(
    candidate: &RouteCandidate,
    path: &[Coordinates],
    ctx: &RequestContext,
    relaxation_step: u32,
    rank_in_theme: u32,
    poi: &PoiSignals,
) -> FeatureVector {
    let distance_km = candidate.distance_km.max(0.0);
    let safe_distance = distance_km.max(1e-6);

    let turn_count = geometry::count_turns(path) as u32;
    let loop_closure_m = match (path.first(), path.last()) {
        (Some(first), Some(last)) if ctx.round_trip && path.len() >= 2 => first.distance_m(last),
        _ => 0.0,
    };
    let diagonal_km = geometry::bbox_diagonal_km(path);
    let path_length_ratio = if diagonal_km > 0.0 {
        geometry::path_length_km(path) / diagonal_km
    } else {
        0.0
    };
    let round_trip_fit = ctx.round_trip && path.len() >= 2 && loop_closure_m <= ROUND_TRIP_FIT_MAX_M;

    FeatureVector {
        distance_km,
        duration_min: candidate
            .duration_min
            .unwrap_or_else(|| estimate_duration_min(distance_km)),
        loop_closure_m,
        bbox_area_km2: geometry::bbox_area_km2(path),
        path_length_ratio,
        turn_count,
        turn_density: turn_count as f64 / safe_distance,
        distance_error_ratio: (distance_km - ctx.distance_km).abs() / ctx.distance_km.max(1e-6),
        round_trip_req: ctx.round_trip as u8,
        round_trip_fit: round_trip_fit as u8,
        relaxation_step,
        candidate_rank_in_theme: rank_in_theme,
        theme_exercise: (ctx.theme == Theme::Exercise) as u8,
        theme_think: (ctx.theme == Theme::Think) as u8,
        theme_refresh: (ctx.theme == Theme::Refresh) as u8,
        theme_nature: (ctx.theme == Theme::Nature) as u8,
        has_stairs: candidate.has_stairs as u8,
        elevation_gain_m: candidate.elevation_gain_m,
        elevation_density_m_per_km: candidate.elevation_gain_m / (distance_km * 1000.0).max(1.0),
        poi_density: poi.poi_density,
        park_poi_ratio: poi.park_poi_ratio,
        spot_type_diversity: poi.spot_type_diversity,
        detour_over_ratio: poi.detour_over_ratio,
        detour_allowance_m: detour_allowance_m(ctx.distance_km),
        is_fallback: candidate.is_fallback as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(theme: Theme, round_trip: bool) -> RequestContext {
        RequestContext {
            request_id: "r".into(),
            theme,
            distance_km: 2.0,
            start: Coordinates::new(35.0, 139.0).unwrap(),
            end: None,
            round_trip,
            debug: false,
        }
    }

    fn candidate(distance_km: f64) -> RouteCandidate {
        RouteCandidate {
            route_id: "a".into(),
            polyline: "ignored".into(),
            distance_km,
            duration_min: None,
            theme: Theme::Think,
            is_fallback: false,
            has_stairs: true,
            elevation_gain_m: 30.0,
        }
    }

    fn square() -> Vec<Coordinates> {
        vec![
            Coordinates { lat: 35.0, lng: 139.0 },
            Coordinates { lat: 35.005, lng: 139.0 },
            Coordinates { lat: 35.005, lng: 139.006 },
            Coordinates { lat: 35.0, lng: 139.006 },
            Coordinates { lat: 35.0, lng: 139.0 },
        ]
    }

    #[test]
    fn allowance_scales_with_target() {
        assert_eq!(detour_allowance_m(3.0), 150.0);
        assert_eq!(detour_allowance_m(5.0), 250.0);
        assert_eq!(detour_allowance_m(10.0), 400.0);
        assert_eq!(detour_allowance_m(12.0), 600.0);
    }

    #[test]
    fn closed_square_fits_round_trip() {
        let f = compute_features(&candidate(2.2), &square(), &ctx(Theme::Think, true), 1, 2, &PoiSignals::default());
        assert_eq!(f.round_trip_req, 1);
        assert_eq!(f.round_trip_fit, 1);
        assert!(f.loop_closure_m < 1.0);
        assert_eq!(f.turn_count, 3);
        assert!((f.turn_density - 3.0 / 2.2).abs() < 1e-9);
        assert!((f.distance_error_ratio - 0.1).abs() < 1e-9);
        assert_eq!(f.relaxation_step, 1);
        assert_eq!(f.candidate_rank_in_theme, 2);
        assert!(f.path_length_ratio > 1.0);
        assert!(f.bbox_area_km2 > 0.0);
    }

    #[test]
    fn exactly_one_theme_flag() {
        for theme in Theme::ALL {
            let f = compute_features(&candidate(2.0), &[], &ctx(theme, false), 0, 1, &PoiSignals::default());
            assert_eq!(f.theme_exercise + f.theme_think + f.theme_refresh + f.theme_nature, 1);
        }
    }

    #[test]
    fn elevation_density_and_defaults() {
        let f = compute_features(&candidate(2.0), &[], &ctx(Theme::Nature, false), 0, 1, &PoiSignals::default());
        assert!((f.elevation_density_m_per_km - 0.015).abs() < 1e-9);
        assert_eq!(f.has_stairs, 1);
        assert_eq!(f.round_trip_fit, 0);
        assert_eq!(f.detour_allowance_m, 150.0);
        assert!((f.duration_min - 25.0).abs() < 1e-9);
        assert_eq!(f.poi_density, 0.0);
    }
}
