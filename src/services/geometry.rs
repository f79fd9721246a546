use crate::constants::{TURN_ANGLE_THRESHOLD_DEG, TURN_MIN_SEGMENT_M};
use crate::models::coordinates::EARTH_RADIUS_KM;
use crate::models::Coordinates;
use std::collections::HashSet;

const METERS_PER_DEGREE: f64 = EARTH_RADIUS_KM * 1000.0 * std::f64::consts::PI / 180.0;

/// Haversine distance in meters.
pub fn haversine_m(a: &Coordinates, b: &Coordinates) -> f64 {
    a.distance_m(b)
}

/// Representative points at `floor(ratio * (n - 1))`, de-duplicated in order.
pub fn sample_points(points: &[Coordinates], ratios: &[f64]) -> Vec<Coordinates> {
    match points.len() {
        0 => return Vec::new(),
        1 => return vec![points[0]],
        2 => return vec![points[0], points[1]],
        _ => {}
    }

    let last = points.len() - 1;
    let mut seen = HashSet::new();
    let mut sampled = Vec::with_capacity(ratios.len());
    for ratio in ratios {
        let idx = ((ratio.clamp(0.0, 1.0) * last as f64).floor() as usize).min(last);
        if seen.insert(idx) {
            sampled.push(points[idx]);
        }
    }
    sampled
}

/// Distance from `point` to the segment `a`-`b`, using a flat-earth projection
/// centred on the segment's midpoint latitude.
pub fn point_to_segment_m(point: &Coordinates, a: &Coordinates, b: &Coordinates) -> f64 {
    let mid_lat = ((a.lat + b.lat) / 2.0).to_radians();
    let x_scale = mid_lat.cos() * METERS_PER_DEGREE;
    let project = |c: &Coordinates| ((c.lng - a.lng) * x_scale, (c.lat - a.lat) * METERS_PER_DEGREE);

    let (bx, by) = project(b);
    let (px, py) = project(point);
    let len_sq = bx * bx + by * by;
    if len_sq < 1e-9 {
        return haversine_m(point, a);
    }

    let t = ((px * bx + py * by) / len_sq).clamp(0.0, 1.0);
    let closest = Coordinates {
        lat: a.lat + t * (b.lat - a.lat),
        lng: a.lng + t * (b.lng - a.lng),
    };
    haversine_m(point, &closest)
}

/// Minimum distance from `point` to any segment of `path`.
/// An empty path yields infinity, a single point path the distance to that point.
pub fn distance_to_path_m(path: &[Coordinates], point: &Coordinates) -> f64 {
    match path {
        [] => f64::INFINITY,
        [only] => haversine_m(point, only),
        _ => path
            .windows(2)
            .map(|w| point_to_segment_m(point, &w[0], &w[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Douglas–Peucker simplification with epsilon in meters. Always keeps both endpoints.
pub fn simplify_douglas_peucker(points: &[Coordinates], epsilon_m: f64) -> Vec<Coordinates> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    let mut stack = vec![(0usize, points.len() - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let mut max_dist = 0.0;
        let mut max_idx = start;
        for idx in (start + 1)..end {
            let dist = point_to_segment_m(&points[idx], &points[start], &points[end]);
            if dist > max_dist {
                max_dist = dist;
                max_idx = idx;
            }
        }
        if max_dist > epsilon_m {
            keep[max_idx] = true;
            stack.push((start, max_idx));
            stack.push((max_idx, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// Down-sample to `max_points` evenly spaced points, first and last included.
pub fn pick_waypoints(points: &[Coordinates], max_points: usize) -> Vec<Coordinates> {
    let n = points.len();
    if n <= max_points {
        return points.to_vec();
    }
    match max_points {
        0 => return Vec::new(),
        1 => return vec![points[0]],
        _ => {}
    }

    let step = (n - 1) as f64 / (max_points - 1) as f64;
    let mut picked = Vec::with_capacity(max_points);
    let mut last_idx = None;
    for i in 0..max_points {
        let idx = ((i as f64 * step).round() as usize).min(n - 1);
        if last_idx != Some(idx) {
            picked.push(points[idx]);
            last_idx = Some(idx);
        }
    }
    picked
}

/// Total path length in kilometers.
pub fn path_length_km(points: &[Coordinates]) -> f64 {
    points.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
}

/// Number of heading changes above the turn threshold. Very short segments are merged
/// into the next one so coordinate noise does not count as turning.
pub fn count_turns(points: &[Coordinates]) -> usize {
    let mut bearings = Vec::new();
    let mut anchor = match points.first() {
        Some(p) => *p,
        None => return 0,
    };
    for point in &points[1..] {
        if haversine_m(&anchor, point) >= TURN_MIN_SEGMENT_M {
            bearings.push(anchor.bearing_to(point));
            anchor = *point;
        }
    }

    bearings
        .windows(2)
        .filter(|w| {
            let diff = (w[1] - w[0] + 540.0) % 360.0 - 180.0;
            diff.abs() > TURN_ANGLE_THRESHOLD_DEG
        })
        .count()
}

/// Bounding box as (south-west, north-east).
pub fn bounding_box(points: &[Coordinates]) -> Option<(Coordinates, Coordinates)> {
    let first = points.first()?;
    let (mut min_lat, mut max_lat, mut min_lng, mut max_lng) =
        (first.lat, first.lat, first.lng, first.lng);
    for p in &points[1..] {
        min_lat = min_lat.min(p.lat);
        max_lat = max_lat.max(p.lat);
        min_lng = min_lng.min(p.lng);
        max_lng = max_lng.max(p.lng);
    }
    Some((
        Coordinates {
            lat: min_lat,
            lng: min_lng,
        },
        Coordinates {
            lat: max_lat,
            lng: max_lng,
        },
    ))
}

/// Approximate bounding box area in km².
pub fn bbox_area_km2(points: &[Coordinates]) -> f64 {
    let Some((sw, ne)) = bounding_box(points) else {
        return 0.0;
    };
    let height = sw.distance_to(&Coordinates {
        lat: ne.lat,
        lng: sw.lng,
    });
    let mid_lat = (sw.lat + ne.lat) / 2.0;
    let width = Coordinates {
        lat: mid_lat,
        lng: sw.lng,
    }
    .distance_to(&Coordinates {
        lat: mid_lat,
        lng: ne.lng,
    });
    height * width
}

/// Bounding box diagonal in km.
pub fn bbox_diagonal_km(points: &[Coordinates]) -> f64 {
    bounding_box(points)
        .map(|(sw, ne)| sw.distance_to(&ne))
        .unwrap_or(0.0)
}
