use crate::constants::{
    ANCHOR_THRESHOLD_M, FALLBACK_POLYLINE_LITERAL, MAX_NAV_WAYPOINTS, MIN_WAYPOINT_SEPARATION_M,
    SAMPLE_RATIOS, SIMPLIFY_EPSILON_M, WAYPOINT_DEDUP_DECIMALS,
};
use crate::models::route::is_degenerate_polyline;
use crate::models::{Coordinates, RequestContext};
use crate::services::{geometry, polyline};
use std::collections::HashSet;

/// Decoded geometry of the selected route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampledRoute {
    pub path: Vec<Coordinates>,
    /// Centres for the place search; never empty.
    pub sample_points: Vec<Coordinates>,
    /// Set when anchoring changed the path and it had to be re-encoded.
    pub reencoded: Option<String>,
}

/// Prepend the start when the path begins elsewhere; for round trips also append it
/// when the path does not come back. Returns whether anything was added.
pub fn anchor_path(
    path: &mut Vec<Coordinates>,
    start: Coordinates,
    round_trip: bool,
) -> bool {
    let Some(first) = path.first() else {
        return false;
    };
    let mut changed = false;
    if first.distance_m(&start) > ANCHOR_THRESHOLD_M {
        path.insert(0, start);
        changed = true;
    }
    if round_trip {
        if let Some(last) = path.last() {
            if last.distance_m(&start) > ANCHOR_THRESHOLD_M {
                path.push(start);
                changed = true;
            }
        }
    }
    changed
}

pub fn sample_route(encoded: &str, ctx: &RequestContext) -> SampledRoute {
    // The literal carries no real geometry; anchoring it would pull in (0, 0).
    let mut path = if is_degenerate_polyline(encoded) || encoded == FALLBACK_POLYLINE_LITERAL {
        Vec::new()
    } else {
        polyline::decode(encoded)
    };

    let mut reencoded = None;
    if anchor_path(&mut path, ctx.start, ctx.round_trip) {
        match polyline::encode(&path) {
            Ok(encoded) => reencoded = Some(encoded),
            Err(e) => {
                tracing::warn!(request_id = %ctx.request_id, "Re-encoding anchored path failed: {}", e);
            }
        }
    }

    let mut sample_points = geometry::sample_points(&path, &SAMPLE_RATIOS);
    if sample_points.is_empty() {
        sample_points.push(ctx.start);
    }

    SampledRoute {
        path,
        sample_points,
        reencoded,
    }
}

fn dedup_key(point: &Coordinates) -> (i64, i64) {
    point.rounded_key(WAYPOINT_DEDUP_DECIMALS)
}

/// Drop points within `threshold_m` of the previously kept one.
fn drop_nearby(points: Vec<Coordinates>, threshold_m: f64) -> Vec<Coordinates> {
    let mut kept: Vec<Coordinates> = Vec::with_capacity(points.len());
    for point in points {
        match kept.last() {
            Some(prev) if prev.distance_m(&point) <= threshold_m => {}
            _ => kept.push(point),
        }
    }
    kept
}

/// Bounded, ordered navigation waypoints starting at the request's start point.
pub fn build_nav_waypoints(
    path: &[Coordinates],
    sample_points: &[Coordinates],
    ctx: &RequestContext,
) -> Vec<Coordinates> {
    let picked = if path.is_empty() {
        sample_points.iter().take(MAX_NAV_WAYPOINTS).copied().collect()
    } else {
        let simplified = geometry::simplify_douglas_peucker(path, SIMPLIFY_EPSILON_M);
        geometry::pick_waypoints(&simplified, MAX_NAV_WAYPOINTS)
    };

    // `picked` is already capped; dedup only shrinks it.
    let mut seen = HashSet::new();
    let mut waypoints: Vec<Coordinates> = picked
        .iter()
        .filter(|p| seen.insert(dedup_key(p)))
        .copied()
        .collect();

    let start_key = dedup_key(&ctx.start);
    waypoints.retain(|p| dedup_key(p) != start_key);
    waypoints.insert(0, ctx.start);
    waypoints.truncate(MAX_NAV_WAYPOINTS);

    let mut waypoints = drop_nearby(waypoints, MIN_WAYPOINT_SEPARATION_M);

    if ctx.round_trip {
        if let (Some(first), Some(last)) = (waypoints.first().copied(), waypoints.last().copied()) {
            if first.distance_m(&last) > MIN_WAYPOINT_SEPARATION_M {
                if waypoints.len() < MAX_NAV_WAYPOINTS {
                    waypoints.push(first);
                } else if let Some(slot) = waypoints.last_mut() {
                    *slot = first;
                }
            }
        }
    }
    waypoints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Theme;

    fn ctx(round_trip: bool) -> RequestContext {
        RequestContext {
            request_id: "r".into(),
            theme: Theme::Exercise,
            distance_km: 3.0,
            start: Coordinates { lat: 35.0, lng: 139.0 },
            end: None,
            round_trip,
            debug: false,
        }
    }

    /// A zigzag that Douglas–Peucker cannot flatten, ending back at the start.
    fn zigzag_loop(points: usize) -> Vec<Coordinates> {
        let mut path: Vec<Coordinates> = (0..points)
            .map(|i| Coordinates {
                lat: 35.0 + i as f64 * 0.001,
                lng: 139.0 + if i % 2 == 0 { 0.0 } else { 0.002 },
            })
            .collect();
        path.push(Coordinates { lat: 35.0, lng: 139.0 });
        path
    }

    #[test]
    fn anchoring_adds_start_and_closure() {
        let mut path = vec![
            Coordinates { lat: 35.001, lng: 139.0 },
            Coordinates { lat: 35.002, lng: 139.0 },
        ];
        assert!(anchor_path(&mut path, ctx(true).start, true));
        assert_eq!(path.len(), 4);
        assert_eq!(path[0], ctx(true).start);
        assert_eq!(path[3], ctx(true).start);

        let mut close = vec![Coordinates { lat: 35.0001, lng: 139.0 }];
        assert!(!anchor_path(&mut close, ctx(false).start, false));
        assert!(!anchor_path(&mut Vec::new(), ctx(true).start, true));
    }

    #[test]
    fn sample_route_reencodes_anchored_path() {
        let path = vec![
            Coordinates { lat: 35.001, lng: 139.0 },
            Coordinates { lat: 35.002, lng: 139.001 },
            Coordinates { lat: 35.0, lng: 139.0 },
        ];
        let encoded = polyline::encode(&path).unwrap();
        let sampled = sample_route(&encoded, &ctx(true));
        assert_eq!(sampled.path.len(), 4);
        let reencoded = sampled.reencoded.expect("path was anchored");
        assert_eq!(polyline::decode(&reencoded).len(), 4);
        assert!(!sampled.sample_points.is_empty());
    }

    #[test]
    fn literal_fallback_is_not_anchored() {
        let sampled = sample_route(FALLBACK_POLYLINE_LITERAL, &ctx(true));
        assert!(sampled.path.is_empty());
        assert!(sampled.reencoded.is_none());
        assert_eq!(sampled.sample_points, vec![ctx(true).start]);
    }

    #[test]
    fn placeholder_polyline_samples_start() {
        let sampled = sample_route("xxxx", &ctx(true));
        assert!(sampled.path.is_empty());
        assert_eq!(sampled.sample_points, vec![ctx(true).start]);
        assert!(sampled.reencoded.is_none());
    }

    #[test]
    fn waypoints_are_capped_start_first_and_closed() {
        let path = zigzag_loop(40);
        let waypoints = build_nav_waypoints(&path, &[], &ctx(true));
        assert!(waypoints.len() <= MAX_NAV_WAYPOINTS);
        assert_eq!(waypoints[0], ctx(true).start);
        let last = waypoints.last().unwrap();
        assert!(waypoints[0].distance_m(last) <= MIN_WAYPOINT_SEPARATION_M);
        for pair in waypoints.windows(2) {
            assert!(pair[0].distance_m(&pair[1]) > MIN_WAYPOINT_SEPARATION_M || pair[1] == waypoints[0]);
        }
    }

    #[test]
    fn one_way_keeps_start_first_without_closure() {
        let path: Vec<Coordinates> = (0..5)
            .map(|i| Coordinates { lat: 35.0 + i as f64 * 0.002, lng: 139.0 + (i % 2) as f64 * 0.002 })
            .collect();
        let waypoints = build_nav_waypoints(&path, &[], &ctx(false));
        assert_eq!(waypoints[0], ctx(false).start);
        assert_eq!(*waypoints.last().unwrap(), path[4]);
    }

    #[test]
    fn inserted_start_is_recapped() {
        // Ten picked points plus the start make eleven before the cap applies.
        let path: Vec<Coordinates> = (1..=40)
            .map(|i| Coordinates {
                lat: 35.0 + i as f64 * 0.001,
                lng: 139.0 + if i % 2 == 0 { 0.0 } else { 0.002 },
            })
            .collect();
        let waypoints = build_nav_waypoints(&path, &[], &ctx(false));
        assert_eq!(waypoints.len(), MAX_NAV_WAYPOINTS);
        assert_eq!(waypoints[0], ctx(false).start);
        assert_eq!(waypoints[1], path[0]);
    }

    #[test]
    fn empty_path_uses_sample_points() {
        let samples = vec![Coordinates { lat: 35.0, lng: 139.0 }];
        let waypoints = build_nav_waypoints(&[], &samples, &ctx(true));
        assert_eq!(waypoints, vec![ctx(true).start]);
    }
}
