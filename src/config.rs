use crate::constants::*;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
const DEFAULT_TEXT_GEN_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TEXT_GEN_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_NAME_BLOCKLIST: &str = "7-Eleven,FamilyMart,Lawson,McDonald's,Starbucks,Subway";
const DEFAULT_TYPE_BLOCKLIST: &str = "convenience,fast_food,fuel,parking";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Analytics sink; without it rows are only traced.
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub mapbox_api_key: Option<String>,
    pub mapbox_base_url: Option<String>,
    pub overpass_url: String,
    pub ranker_url: Option<String>,
    pub ranker_token: Option<String>,
    pub text_gen_base_url: String,
    pub text_gen_api_key: Option<String>,
    pub text_gen_model: String,
    pub response_cache_enabled: bool,
    pub response_cache_ttl: u64,
    pub response_cache_max_entries: u64,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on proposals sent to the directions provider per attempt.
    pub max_routes: usize,

    /// Valid candidates required before early exit is considered.
    pub min_routes: usize,

    /// Best heuristic score that allows early exit once `min_routes` is met.
    pub score_threshold: f64,

    /// Permits shared by concurrent outbound calls within one request.
    pub concurrency: usize,

    /// Maximum |distance - target| / target accepted from the provider.
    pub distance_error_ratio_max: f64,

    /// Additional attempts after the first when every candidate is filtered out.
    pub distance_retry_max: usize,

    /// First-attempt target multiplier for short routes.
    pub short_distance_target_ratio: f64,

    /// Targets at or below this are "short".
    pub short_distance_max_km: f64,

    pub places_radius_m: f64,
    pub places_max_results: usize,
    pub places_sample_points_max: usize,

    /// Run place searches per candidate to derive POI features.
    pub poi_features_enabled: bool,

    pub name_blocklist: Vec<String>,
    pub type_blocklist: Vec<String>,

    pub features_version: String,
    pub ranker_version: String,

    pub directions_timeout_ms: u64,
    pub places_timeout_ms: u64,
    pub ranker_timeout_ms: u64,
    pub text_gen_timeout_ms: u64,

    /// Fixes proposal jitter and shuffling; random per request when unset.
    pub fixed_seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_routes: 5,
            min_routes: 2,
            score_threshold: 0.6,
            concurrency: 2,
            distance_error_ratio_max: 0.3,
            distance_retry_max: 1,
            short_distance_target_ratio: 0.7,
            short_distance_max_km: 3.0,
            places_radius_m: 300.0,
            places_max_results: 2,
            places_sample_points_max: 1,
            poi_features_enabled: true,
            name_blocklist: split_list(DEFAULT_NAME_BLOCKLIST),
            type_blocklist: split_list(DEFAULT_TYPE_BLOCKLIST),
            features_version: "v1".to_string(),
            ranker_version: "v1".to_string(),
            directions_timeout_ms: DEFAULT_DIRECTIONS_TIMEOUT_MS,
            places_timeout_ms: DEFAULT_PLACES_TIMEOUT_MS,
            ranker_timeout_ms: DEFAULT_RANKER_TIMEOUT_MS,
            text_gen_timeout_ms: DEFAULT_TEXT_GEN_TIMEOUT_MS,
            fixed_seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let config = Self {
            max_routes: env_or("MAX_ROUTES", defaults.max_routes)?,
            min_routes: env_or("MIN_ROUTES", defaults.min_routes)?,
            score_threshold: env_or("ROUTE_SCORE_THRESHOLD", defaults.score_threshold)?,
            concurrency: env_or("PIPELINE_CONCURRENCY", defaults.concurrency)?,
            distance_error_ratio_max: env_or(
                "ROUTE_DISTANCE_ERROR_RATIO_MAX",
                defaults.distance_error_ratio_max,
            )?,
            distance_retry_max: env_or("ROUTE_DISTANCE_RETRY_MAX", defaults.distance_retry_max)?,
            short_distance_target_ratio: env_or(
                "SHORT_DISTANCE_TARGET_RATIO",
                defaults.short_distance_target_ratio,
            )?,
            short_distance_max_km: env_or("SHORT_DISTANCE_MAX_KM", defaults.short_distance_max_km)?,
            places_radius_m: env_or("PLACES_RADIUS_M", defaults.places_radius_m)?,
            places_max_results: env_or("PLACES_MAX_RESULTS", defaults.places_max_results)?,
            places_sample_points_max: env_or(
                "PLACES_SAMPLE_POINTS_MAX",
                defaults.places_sample_points_max,
            )?,
            poi_features_enabled: env_or("POI_FEATURES_ENABLED", defaults.poi_features_enabled)?,
            name_blocklist: env::var("PLACES_NAME_BLOCKLIST")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.name_blocklist),
            type_blocklist: env::var("PLACES_TYPE_BLOCKLIST")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.type_blocklist),
            features_version: env::var("FEATURES_VERSION").unwrap_or(defaults.features_version),
            ranker_version: env::var("RANKER_VERSION").unwrap_or(defaults.ranker_version),
            directions_timeout_ms: env_or("DIRECTIONS_TIMEOUT_MS", defaults.directions_timeout_ms)?,
            places_timeout_ms: env_or("PLACES_TIMEOUT_MS", defaults.places_timeout_ms)?,
            ranker_timeout_ms: env_or("RANKER_TIMEOUT_MS", defaults.ranker_timeout_ms)?,
            text_gen_timeout_ms: env_or("TEXT_GEN_TIMEOUT_MS", defaults.text_gen_timeout_ms)?,
            fixed_seed: match env::var("PIPELINE_SEED") {
                Ok(v) => Some(v.parse().map_err(|_| "Invalid PIPELINE_SEED")?),
                Err(_) => None,
            },
        };

        if config.max_routes == 0 {
            return Err("MAX_ROUTES must be at least 1".to_string());
        }
        if config.concurrency == 0 {
            return Err("PIPELINE_CONCURRENCY must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&config.short_distance_target_ratio) {
            return Err("SHORT_DISTANCE_TARGET_RATIO must be between 0 and 1".to_string());
        }

        Ok(config)
    }

    pub fn directions_timeout(&self) -> Duration {
        Duration::from_millis(self.directions_timeout_ms)
    }

    pub fn places_timeout(&self) -> Duration {
        Duration::from_millis(self.places_timeout_ms)
    }

    pub fn ranker_timeout(&self) -> Duration {
        Duration::from_millis(self.ranker_timeout_ms)
    }

    pub fn text_gen_timeout(&self) -> Duration {
        Duration::from_millis(self.text_gen_timeout_ms)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_PORT.to_string())
                .parse()
                .map_err(|_| "Invalid PORT")?,
            database_url: non_empty_var("DATABASE_URL"),
            redis_url: non_empty_var("REDIS_URL"),
            mapbox_api_key: non_empty_var("MAPBOX_API_KEY"),
            mapbox_base_url: non_empty_var("MAPBOX_BASE_URL"),
            overpass_url: env::var("OVERPASS_URL")
                .unwrap_or_else(|_| DEFAULT_OVERPASS_URL.to_string()),
            ranker_url: non_empty_var("RANKER_URL"),
            ranker_token: non_empty_var("RANKER_TOKEN"),
            text_gen_base_url: env::var("TEXT_GEN_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_TEXT_GEN_BASE_URL.to_string()),
            text_gen_api_key: non_empty_var("TEXT_GEN_API_KEY"),
            text_gen_model: env::var("TEXT_GEN_MODEL")
                .unwrap_or_else(|_| DEFAULT_TEXT_GEN_MODEL.to_string()),
            response_cache_enabled: env_or("RESPONSE_CACHE_ENABLED", true)?,
            response_cache_ttl: env_or("RESPONSE_CACHE_TTL", DEFAULT_RESPONSE_CACHE_TTL_SECONDS)?,
            response_cache_max_entries: env_or(
                "RESPONSE_CACHE_MAX_ENTRIES",
                DEFAULT_RESPONSE_CACHE_MAX_ENTRIES,
            )?,
            pipeline: PipelineConfig::from_env()?,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr + ToString,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| format!("Invalid {}", key))
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
