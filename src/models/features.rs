use serde::{Deserialize, Serialize};

/// Flat numeric scoring inputs for one candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    pub distance_km: f64,
    pub duration_min: f64,
    pub loop_closure_m: f64,
    pub bbox_area_km2: f64,
    pub path_length_ratio: f64,
    pub turn_count: u32,
    pub turn_density: f64,
    pub distance_error_ratio: f64,
    pub round_trip_req: u8,
    pub round_trip_fit: u8,
    pub relaxation_step: u32,
    pub candidate_rank_in_theme: u32,
    pub theme_exercise: u8,
    pub theme_think: u8,
    pub theme_refresh: u8,
    pub theme_nature: u8,
    pub has_stairs: u8,
    pub elevation_gain_m: f64,
    pub elevation_density_m_per_km: f64,
    pub poi_density: f64,
    pub park_poi_ratio: f64,
    pub spot_type_diversity: f64,
    pub detour_over_ratio: f64,
    pub detour_allowance_m: f64,
    pub is_fallback: u8,
}
