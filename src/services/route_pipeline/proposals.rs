use crate::constants::{
    HEADING_JITTER_DEG, LOOP_RADIUS_JITTER, PROPOSAL_SIGNATURE_DECIMALS, ROAD_DETOUR_FACTOR,
};
use crate::models::{Coordinates, RequestContext};
use crate::services::directions::DirectionsRequest;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::collections::HashSet;

/// Lateral amplitude of zigzag offsets, as a fraction of the outbound leg.
const ZIGZAG_LATERAL_RATIO: f64 = 0.15;
/// Number of lateral offsets in a zigzag proposal.
const ZIGZAG_POINTS: usize = 4;
/// Detour scales tried for one-way routes that are shorter than the target.
const DETOUR_SCALES: [f64; 3] = [1.0, 0.75, 1.25];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Loop,
    Triangle,
    OutAndBack,
    Zigzag,
    Direct,
    Detour,
    Radial,
}

impl Shape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Loop => "loop",
            Shape::Triangle => "triangle",
            Shape::OutAndBack => "out_and_back",
            Shape::Zigzag => "zigzag",
            Shape::Direct => "direct",
            Shape::Detour => "detour",
            Shape::Radial => "radial",
        }
    }
}

const ROUND_TRIP_SHAPES: [Shape; 4] = [Shape::Loop, Shape::Triangle, Shape::OutAndBack, Shape::Zigzag];

/// Geometric guess handed to the directions provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub shape: Shape,
    pub intermediates: Vec<Coordinates>,
    pub destination: Coordinates,
}

impl Proposal {
    pub fn to_request(
        &self,
        origin: Coordinates,
        round_trip: bool,
        target_km: f64,
    ) -> DirectionsRequest {
        DirectionsRequest {
            origin,
            destination: self.destination,
            intermediates: self.intermediates.clone(),
            round_trip,
            target_km,
        }
    }

    fn signature(&self) -> Vec<(i64, i64)> {
        self.intermediates
            .iter()
            .chain(std::iter::once(&self.destination))
            .map(|c| c.rounded_key(PROPOSAL_SIGNATURE_DECIMALS))
            .collect()
    }
}

/// The `draw`-th jitter value for a request seed, uniform in `[0, 1)`.
///
/// Stateless so any stage can replay a draw from the seed alone (SplitMix64 mixing).
pub fn jitter_draw(seed: u64, draw: usize) -> f64 {
    let mut z = seed.wrapping_add((draw as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^= z >> 31;
    // Top 53 bits fill the mantissa exactly, so 1.0 is unreachable.
    (z >> 11) as f64 / (1u64 << 53) as f64
}

/// Per-request source of jitter and shuffling. Same seed, same proposals.
pub struct ProposalRng {
    seed: u64,
    draws: usize,
    shuffler: StdRng,
}

impl ProposalRng {
    pub fn new(seed: u64) -> Self {
        ProposalRng {
            seed,
            draws: 0,
            shuffler: StdRng::seed_from_u64(seed),
        }
    }

    pub fn unit(&mut self) -> f64 {
        self.draws += 1;
        jitter_draw(self.seed, self.draws)
    }

    /// Uniform in `[-range, range)`.
    pub fn symmetric(&mut self, range: f64) -> f64 {
        self.unit() * range * 2.0 - range
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.shuffler);
    }

    /// Index in `0..len`; `len` must be non-zero.
    pub fn pick(&mut self, len: usize) -> usize {
        ((self.unit() * len as f64) as usize).min(len.saturating_sub(1))
    }
}

/// Build up to `max` distinct proposals for one generation attempt.
pub fn build_proposals(
    ctx: &RequestContext,
    target_km: f64,
    max: usize,
    rng: &mut ProposalRng,
) -> Vec<Proposal> {
    if max == 0 {
        return Vec::new();
    }
    let proposals = match (ctx.round_trip, ctx.end) {
        (true, _) => round_trip_proposals(ctx.start, target_km, max, rng),
        (false, Some(end)) => one_way_proposals(ctx.start, end, target_km, max, rng),
        (false, None) => radial_proposals(ctx.start, target_km, max, rng),
    };
    dedupe(proposals, max)
}

fn dedupe(proposals: Vec<Proposal>, max: usize) -> Vec<Proposal> {
    let mut seen = HashSet::new();
    proposals
        .into_iter()
        .filter(|p| seen.insert(p.signature()))
        .take(max)
        .collect()
}

/// Headings spread evenly over the compass, rotated and jittered, in shuffled order.
fn headings(count: usize, rng: &mut ProposalRng) -> Vec<f64> {
    let rotation = rng.unit() * 360.0;
    let step = 360.0 / count.max(1) as f64;
    let mut out: Vec<f64> = (0..count)
        .map(|i| normalize_bearing(rotation + step * i as f64 + rng.symmetric(HEADING_JITTER_DEG)))
        .collect();
    rng.shuffle(&mut out);
    out
}

fn normalize_bearing(deg: f64) -> f64 {
    deg.rem_euclid(360.0)
}

fn round_trip_proposals(
    start: Coordinates,
    target_km: f64,
    max: usize,
    rng: &mut ProposalRng,
) -> Vec<Proposal> {
    // Straight-line budget; the walking network adds the rest
    let perimeter_km = target_km / ROAD_DETOUR_FACTOR;

    let mut shapes = ROUND_TRIP_SHAPES.to_vec();
    rng.shuffle(&mut shapes);
    let rounds = max.div_ceil(shapes.len()).max(1);
    let heading_set = headings(rounds * shapes.len(), rng);

    let mut proposals = Vec::with_capacity(heading_set.len());
    for (i, heading) in heading_set.into_iter().enumerate() {
        let shape = shapes[i % shapes.len()];
        let built = match shape {
            Shape::Loop => loop_shape(start, perimeter_km, heading, rng),
            Shape::Triangle => triangle_shape(start, perimeter_km, heading, rng),
            Shape::OutAndBack => out_and_back_shape(start, perimeter_km, heading, rng),
            _ => zigzag_shape(start, perimeter_km, heading, rng),
        };
        match built {
            Ok(intermediates) if !intermediates.is_empty() => proposals.push(Proposal {
                shape,
                intermediates,
                destination: start,
            }),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(shape = shape.as_str(), "Skipping proposal: {}", e);
            }
        }
    }
    proposals
}

/// Circle through the start, four waypoints at 90° offsets around its centre.
fn loop_shape(
    start: Coordinates,
    perimeter_km: f64,
    heading: f64,
    rng: &mut ProposalRng,
) -> Result<Vec<Coordinates>, String> {
    let radius_km = perimeter_km / std::f64::consts::TAU;
    let center = start.destination(heading, radius_km)?;
    // The start sits at heading + 180 on the circle; walk around from there
    [225.0, 315.0, 45.0, 135.0]
        .iter()
        .map(|offset| {
            let r = radius_km * (1.0 + rng.symmetric(LOOP_RADIUS_JITTER));
            center.destination(normalize_bearing(heading + offset), r)
        })
        .collect()
}

fn triangle_shape(
    start: Coordinates,
    perimeter_km: f64,
    heading: f64,
    rng: &mut ProposalRng,
) -> Result<Vec<Coordinates>, String> {
    let side_km = perimeter_km / 3.0;
    let spread = 30.0 + rng.symmetric(HEADING_JITTER_DEG / 2.0);
    let first = start.destination(
        normalize_bearing(heading - spread),
        side_km * (1.0 + rng.symmetric(LOOP_RADIUS_JITTER)),
    )?;
    let second = start.destination(
        normalize_bearing(heading + spread),
        side_km * (1.0 + rng.symmetric(LOOP_RADIUS_JITTER)),
    )?;
    Ok(vec![first, second])
}

fn out_and_back_shape(
    start: Coordinates,
    perimeter_km: f64,
    heading: f64,
    rng: &mut ProposalRng,
) -> Result<Vec<Coordinates>, String> {
    let leg_km = perimeter_km / 2.0;
    let near = start.destination(heading, leg_km * (0.5 + rng.symmetric(0.1)))?;
    let far = start.destination(
        normalize_bearing(heading + rng.symmetric(HEADING_JITTER_DEG / 4.0)),
        leg_km,
    )?;
    Ok(vec![near, far])
}

fn zigzag_shape(
    start: Coordinates,
    perimeter_km: f64,
    heading: f64,
    rng: &mut ProposalRng,
) -> Result<Vec<Coordinates>, String> {
    let leg_km = perimeter_km / 2.0;
    let lateral_km = leg_km * ZIGZAG_LATERAL_RATIO * (1.0 + rng.symmetric(LOOP_RADIUS_JITTER));
    (1..=ZIGZAG_POINTS)
        .map(|i| {
            let along = start.destination(heading, leg_km * i as f64 / ZIGZAG_POINTS as f64)?;
            let side = if i % 2 == 0 { 90.0 } else { -90.0 };
            along.destination(normalize_bearing(heading + side), lateral_km)
        })
        .collect()
}

fn one_way_proposals(
    start: Coordinates,
    end: Coordinates,
    target_km: f64,
    max: usize,
    rng: &mut ProposalRng,
) -> Vec<Proposal> {
    let direct_km = start.distance_to(&end);
    let budget_km = target_km / ROAD_DETOUR_FACTOR;
    let direct = Proposal {
        shape: Shape::Direct,
        intermediates: Vec::new(),
        destination: end,
    };
    if direct_km >= budget_km {
        return vec![direct];
    }

    // Pad with one lateral waypoint off the midpoint: 2 * hypot(d/2, x) = budget
    let half_direct = direct_km / 2.0;
    let half_budget = budget_km / 2.0;
    let lateral_km = (half_budget * half_budget - half_direct * half_direct).sqrt();
    let bearing = start.bearing_to(&end);
    let Ok(midpoint) = start.destination(bearing, half_direct) else {
        return vec![direct];
    };

    let mut sides = [90.0, -90.0];
    rng.shuffle(&mut sides);
    let mut proposals = Vec::new();
    for scale in DETOUR_SCALES {
        for side in sides {
            let heading = normalize_bearing(bearing + side + rng.symmetric(HEADING_JITTER_DEG));
            if let Ok(waypoint) = midpoint.destination(heading, lateral_km * scale) {
                proposals.push(Proposal {
                    shape: Shape::Detour,
                    intermediates: vec![waypoint],
                    destination: end,
                });
            }
        }
    }
    proposals.truncate(max.saturating_sub(1).max(1));
    proposals.push(direct);
    proposals
}

fn radial_proposals(
    start: Coordinates,
    target_km: f64,
    max: usize,
    rng: &mut ProposalRng,
) -> Vec<Proposal> {
    let reach_km = target_km / ROAD_DETOUR_FACTOR;
    headings(max, rng)
        .into_iter()
        .filter_map(|heading| start.destination(heading, reach_km).ok())
        .map(|destination| Proposal {
            shape: Shape::Radial,
            intermediates: Vec::new(),
            destination,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Theme;

    fn ctx(round_trip: bool, end: Option<Coordinates>) -> RequestContext {
        RequestContext {
            request_id: "r".to_string(),
            theme: Theme::Nature,
            distance_km: 3.0,
            start: Coordinates::new(35.0, 139.0).unwrap(),
            end,
            round_trip,
            debug: false,
        }
    }

    #[test]
    fn jitter_draws_are_half_open_and_replayable() {
        for i in 0..100 {
            let v = jitter_draw(42, i);
            assert!((0.0..1.0).contains(&v));
            assert_eq!(v, jitter_draw(42, i));
        }
    }

    #[test]
    fn round_trip_proposals_are_capped_and_distinct() {
        let mut rng = ProposalRng::new(7);
        let proposals = build_proposals(&ctx(true, None), 3.0, 5, &mut rng);
        assert_eq!(proposals.len(), 5);

        let signatures: HashSet<_> = proposals.iter().map(|p| p.signature()).collect();
        assert_eq!(signatures.len(), proposals.len());

        let start = Coordinates::new(35.0, 139.0).unwrap();
        for p in &proposals {
            assert_eq!(p.destination, start);
            assert!(!p.intermediates.is_empty());
        }
    }

    #[test]
    fn round_trip_uses_several_shape_families() {
        let mut rng = ProposalRng::new(11);
        let proposals = build_proposals(&ctx(true, None), 4.0, 8, &mut rng);
        let shapes: HashSet<_> = proposals.iter().map(|p| p.shape).collect();
        assert_eq!(shapes.len(), 4);
    }

    #[test]
    fn same_seed_same_proposals() {
        let a = build_proposals(&ctx(true, None), 3.0, 5, &mut ProposalRng::new(99));
        let b = build_proposals(&ctx(true, None), 3.0, 5, &mut ProposalRng::new(99));
        assert_eq!(a, b);
    }

    #[test]
    fn loop_waypoints_stay_near_target_radius() {
        let start = Coordinates::new(35.0, 139.0).unwrap();
        let mut rng = ProposalRng::new(3);
        let points = loop_shape(start, 2.0, 0.0, &mut rng).unwrap();
        let diameter = 2.0 / std::f64::consts::TAU * 2.0;
        for p in points {
            assert!(start.distance_to(&p) <= diameter * (1.0 + LOOP_RADIUS_JITTER) + 1e-6);
        }
    }

    #[test]
    fn one_way_far_end_goes_direct() {
        let end = Coordinates::new(35.05, 139.05).unwrap();
        let mut rng = ProposalRng::new(1);
        let proposals = build_proposals(&ctx(false, Some(end)), 1.0, 5, &mut rng);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].shape, Shape::Direct);
        assert_eq!(proposals[0].destination, end);
    }

    #[test]
    fn one_way_short_end_adds_detours() {
        let end = Coordinates::new(35.002, 139.0).unwrap();
        let mut rng = ProposalRng::new(1);
        let proposals = build_proposals(&ctx(false, Some(end)), 3.0, 5, &mut rng);
        assert_eq!(proposals.len(), 5);
        assert!(proposals.iter().filter(|p| p.shape == Shape::Detour).count() >= 4);
        assert!(proposals.iter().all(|p| p.destination == end));
    }

    #[test]
    fn one_way_without_end_radiates() {
        let mut rng = ProposalRng::new(5);
        let proposals = build_proposals(&ctx(false, None), 2.0, 4, &mut rng);
        assert_eq!(proposals.len(), 4);
        assert!(proposals.iter().all(|p| p.shape == Shape::Radial));
    }

    #[test]
    fn zero_max_builds_nothing() {
        let mut rng = ProposalRng::new(5);
        assert!(build_proposals(&ctx(true, None), 2.0, 0, &mut rng).is_empty());
    }
}
