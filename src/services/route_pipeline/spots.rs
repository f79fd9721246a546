use super::features::{detour_allowance_m, PoiSignals};
use super::proposals::jitter_draw;
use crate::config::PipelineConfig;
use crate::constants::{
    MAX_SPOTS, MIN_SPOTS_PER_TIER, SAMPLE_RATIOS, SPOT_MAX_DISTANCE_M,
    SPOT_MAX_DISTANCE_M_FALLBACK, SPOT_MAX_DISTANCE_M_RELAXED,
};
use crate::error::{AppError, Result};
use crate::models::{Coordinates, Place, RequestContext, Theme};
use crate::services::geometry;
use crate::services::places::{classic_types, hidden_keywords, PlaceSearch, PlacesProvider};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const PARK_TYPES: &[&str] = &["park", "garden", "nature_reserve", "wood"];
const UNKNOWN_TYPE: &str = "unknown";

/// Places found around a route: every de-duplicated hit, plus the type-diverse selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedPlaces {
    pub merged: Vec<Place>,
    pub selected: Vec<Place>,
}

struct Phase {
    name: &'static str,
    keyword: Option<String>,
    included_types: Vec<String>,
    allow_unfiltered_fallback: bool,
}

/// Runs the two-phase place search and filters results against the route.
pub struct SpotCollector {
    places: Arc<dyn PlacesProvider>,
    config: PipelineConfig,
}

impl SpotCollector {
    pub fn new(places: Arc<dyn PlacesProvider>, config: PipelineConfig) -> Self {
        Self { places, config }
    }

    fn is_blocked(&self, place: &Place) -> bool {
        let name = place.name.to_lowercase();
        self.config
            .name_blocklist
            .iter()
            .any(|blocked| !blocked.is_empty() && name.contains(&blocked.to_lowercase()))
            || self
                .config
                .type_blocklist
                .iter()
                .any(|blocked| blocked.eq_ignore_ascii_case(&place.place_type))
    }

    /// Hidden-gem keyword search first, then the theme's classic types.
    /// Stops as soon as `MAX_SPOTS` distinct places are known.
    pub async fn collect(
        &self,
        request_id: &str,
        theme: Theme,
        sample_points: &[Coordinates],
        seed: u64,
    ) -> Result<CollectedPlaces> {
        let keywords = hidden_keywords(theme);
        let keyword = (!keywords.is_empty()).then(|| {
            let idx = (jitter_draw(seed, 0) * keywords.len() as f64) as usize;
            keywords[idx.min(keywords.len() - 1)].to_string()
        });
        let phases = [
            Phase {
                name: "hidden",
                keyword,
                included_types: Vec::new(),
                allow_unfiltered_fallback: false,
            },
            Phase {
                name: "classic",
                keyword: None,
                included_types: classic_types(theme).iter().map(|t| t.to_string()).collect(),
                allow_unfiltered_fallback: true,
            },
        ];

        let points = match self.config.places_sample_points_max {
            0 => sample_points,
            max => &sample_points[..sample_points.len().min(max)],
        };

        let mut merged: Vec<Place> = Vec::new();
        let mut seen = HashSet::new();
        'phases: for phase in &phases {
            for center in points {
                if merged.len() >= MAX_SPOTS {
                    break 'phases;
                }
                let query = PlaceSearch {
                    center: *center,
                    radius_m: self.config.places_radius_m,
                    max_results: self.config.places_max_results,
                    included_types: phase.included_types.clone(),
                    keyword: phase.keyword.clone(),
                    theme,
                    allow_unfiltered_fallback: phase.allow_unfiltered_fallback,
                };
                let found = self.search(&query).await?;
                tracing::debug!(
                    request_id,
                    phase = phase.name,
                    "Found {} places at ({:.6}, {:.6})",
                    found.len(),
                    center.lat,
                    center.lng
                );

                for place in found {
                    if merged.len() >= MAX_SPOTS {
                        break;
                    }
                    if self.is_blocked(&place) || !seen.insert(place.dedup_key()) {
                        continue;
                    }
                    merged.push(place);
                }
            }
        }

        let selected = select_unique_types(&merged, MAX_SPOTS);
        Ok(CollectedPlaces { merged, selected })
    }

    async fn search(&self, query: &PlaceSearch) -> Result<Vec<Place>> {
        match tokio::time::timeout(self.config.places_timeout(), self.places.search(query)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::PlacesApi(format!(
                "timed out after {}ms",
                self.config.places_timeout_ms
            ))),
        }
    }

    /// POI signals for one candidate path. Search failures degrade to zeros.
    pub async fn signals_for(
        &self,
        ctx: &RequestContext,
        path: &[Coordinates],
        distance_km: f64,
        seed: u64,
    ) -> PoiSignals {
        let mut centers = geometry::sample_points(path, &SAMPLE_RATIOS);
        if centers.is_empty() {
            centers.push(ctx.start);
        }
        match self.collect(&ctx.request_id, ctx.theme, &centers, seed).await {
            Ok(collected) => poi_signals(&collected.merged, path, distance_km, ctx.distance_km),
            Err(e) => {
                tracing::warn!(request_id = %ctx.request_id, "Place signals unavailable: {}", e);
                PoiSignals::default()
            }
        }
    }
}

fn type_of(place: &Place) -> &str {
    if place.place_type.trim().is_empty() {
        UNKNOWN_TYPE
    } else {
        &place.place_type
    }
}

/// One place per distinct type first, then fill the remaining slots in order.
pub fn select_unique_types(places: &[Place], max_spots: usize) -> Vec<Place> {
    let mut selected: Vec<Place> = Vec::with_capacity(max_spots);
    let mut used_types = HashSet::new();
    let mut taken = vec![false; places.len()];

    for (i, place) in places.iter().enumerate() {
        if selected.len() >= max_spots {
            break;
        }
        if used_types.insert(type_of(place)) {
            selected.push(place.clone());
            taken[i] = true;
        }
    }
    for (i, place) in places.iter().enumerate() {
        if selected.len() >= max_spots {
            break;
        }
        if !taken[i] {
            selected.push(place.clone());
        }
    }
    selected
}

/// Places within `max_distance_m` of the path, nearest first.
/// Without a path nothing can be measured, so the input is only truncated.
pub fn filter_by_route_distance(
    places: &[Place],
    path: &[Coordinates],
    max_distance_m: f64,
    max_spots: usize,
) -> Vec<Place> {
    if places.is_empty() || path.is_empty() {
        return places.iter().take(max_spots).cloned().collect();
    }

    let mut scored: Vec<(f64, &Place)> = places
        .iter()
        .map(|p| (geometry::distance_to_path_m(path, &p.coordinates()), p))
        .filter(|(d, _)| *d <= max_distance_m)
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
    scored
        .into_iter()
        .take(max_spots)
        .map(|(_, p)| p.clone())
        .collect()
}

/// Progressive relaxation: the selection at the tight threshold, then the merged set at
/// wider thresholds, until a tier yields enough spots.
pub fn spots_along_route(collected: &CollectedPlaces, path: &[Coordinates]) -> Vec<Place> {
    if path.is_empty() {
        return collected.selected.clone();
    }

    let mut spots = filter_by_route_distance(&collected.selected, path, SPOT_MAX_DISTANCE_M, MAX_SPOTS);
    for threshold in [SPOT_MAX_DISTANCE_M_RELAXED, SPOT_MAX_DISTANCE_M_FALLBACK] {
        if spots.len() >= MIN_SPOTS_PER_TIER {
            break;
        }
        spots = filter_by_route_distance(&collected.merged, path, threshold, MAX_SPOTS);
    }
    spots
}

/// 1 - (share of the most common type). Zero for empty or single-type sets.
pub fn spot_type_diversity(places: &[Place]) -> f64 {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for place in places.iter().filter(|p| !p.place_type.trim().is_empty()) {
        *counts.entry(place.place_type.as_str()).or_default() += 1;
    }
    let total: usize = counts.values().sum();
    match counts.values().max() {
        Some(max) if total > 0 => (1.0 - *max as f64 / total as f64).max(0.0),
        _ => 0.0,
    }
}

pub fn poi_signals(
    places: &[Place],
    path: &[Coordinates],
    distance_km: f64,
    target_km: f64,
) -> PoiSignals {
    if places.is_empty() {
        return PoiSignals::default();
    }

    let parks = places
        .iter()
        .filter(|p| PARK_TYPES.contains(&p.place_type.as_str()))
        .count();

    let allowance_m = detour_allowance_m(target_km);
    let detour_over_ratio = if path.is_empty() {
        0.0
    } else {
        let total: f64 = places
            .iter()
            .map(|p| {
                let detour_m = geometry::distance_to_path_m(path, &p.coordinates());
                (detour_m - allowance_m).max(0.0) / allowance_m
            })
            .sum();
        total / places.len() as f64
    };

    PoiSignals {
        spot_type_diversity: spot_type_diversity(places),
        poi_density: places.len() as f64 / distance_km.max(1e-6),
        park_poi_ratio: parks as f64 / places.len() as f64,
        detour_over_ratio,
    }
}
