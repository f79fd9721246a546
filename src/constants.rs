//! Stable application-wide constants.
//!
//! Values here are structural invariants, algorithm coefficients, and default
//! fallbacks for env-var-based configuration. They should rarely change.
//! Tuning knobs that benefit from runtime experimentation live in
//! [`PipelineConfig`](crate::config::PipelineConfig) instead.

// --- Server defaults (used when HOST / PORT env vars are absent) ---

/// Default bind address for the HTTP server.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default port for the HTTP server.
pub const DEFAULT_PORT: &str = "3000";

// --- Response cache defaults ---

/// Default response cache TTL in seconds. Overridden by `RESPONSE_CACHE_TTL`.
pub const DEFAULT_RESPONSE_CACHE_TTL_SECONDS: u64 = 120;
/// Default maximum number of cached responses. Overridden by `RESPONSE_CACHE_MAX_ENTRIES`.
pub const DEFAULT_RESPONSE_CACHE_MAX_ENTRIES: u64 = 256;
/// Decimal places kept for start/end coordinates in the cache fingerprint (~1 m).
pub const CACHE_COORD_DECIMALS: u32 = 5;
/// Decimal places kept for the target distance in the cache fingerprint.
pub const CACHE_DISTANCE_DECIMALS: u32 = 1;

// --- External call timeouts (milliseconds) ---

pub const DEFAULT_DIRECTIONS_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PLACES_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RANKER_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_TEXT_GEN_TIMEOUT_MS: u64 = 8_000;

// --- Candidate validity ---

/// Candidates at or below this distance are treated as degenerate.
pub const MIN_VALID_DISTANCE_KM: f64 = 0.01;
/// Placeholder polyline meaning "no geometry".
pub const POLYLINE_PLACEHOLDER: &str = "xxxx";
/// Known degenerate token: a single point encoding with no usable path.
pub const POLYLINE_DEGENERATE_TOKEN: &str = "~oia@";
/// Minimal valid two-point encoding used when synthesizing geometry fails.
/// Decodes to (0, 0) -> (0.0001, 0.0001).
pub const FALLBACK_POLYLINE_LITERAL: &str = "??SS";
/// Offset (degrees) of the synthetic second point for round-trip fallbacks.
pub const FALLBACK_POINT_OFFSET_DEG: f64 = 0.0001;

// --- Candidate generation geometry ---

/// Walking network detour factor: a proposal's straight-line perimeter is
/// sized at `target / ROAD_DETOUR_FACTOR` so the routed distance lands near target.
pub const ROAD_DETOUR_FACTOR: f64 = 1.25;
/// Radius jitter range for loop proposals (±15%).
pub const LOOP_RADIUS_JITTER: f64 = 0.15;
/// Heading jitter applied to every proposal family (±20°).
pub const HEADING_JITTER_DEG: f64 = 20.0;
/// Rounding (decimal places) of the waypoint signature used to de-duplicate proposals.
pub const PROPOSAL_SIGNATURE_DECIMALS: u32 = 4;
/// Lower clamp for any adjusted internal target distance.
pub const MIN_ADJUSTED_TARGET_KM: f64 = 0.5;
/// Short targets never tolerate more than this distance error ratio.
pub const SHORT_DISTANCE_ERROR_RATIO_CAP: f64 = 0.2;

// --- Heuristic score coefficients ---

pub const HEURISTIC_TURN_WEIGHT: f64 = 0.1;
pub const HEURISTIC_ELEVATION_WEIGHT: f64 = 0.05;

// --- Feature computation ---

/// A bearing change above this between consecutive segments counts as a turn.
pub const TURN_ANGLE_THRESHOLD_DEG: f64 = 45.0;
/// Segments shorter than this are ignored when counting turns (GPS jitter).
pub const TURN_MIN_SEGMENT_M: f64 = 5.0;
/// Loop closure distance under which a round trip "fits".
pub const ROUND_TRIP_FIT_MAX_M: f64 = 100.0;
/// Number of representative candidates sent to the ranker.
pub const RANKER_REPRESENTATIVES: usize = 5;

// --- Waypoint builder ---

/// Start/end anchoring threshold.
pub const ANCHOR_THRESHOLD_M: f64 = 30.0;
/// Douglas–Peucker epsilon.
pub const SIMPLIFY_EPSILON_M: f64 = 20.0;
/// Maximum number of navigation waypoints in a response.
pub const MAX_NAV_WAYPOINTS: usize = 10;
/// Minimum separation between consecutive navigation waypoints.
pub const MIN_WAYPOINT_SEPARATION_M: f64 = 10.0;
/// Decimal places used to de-duplicate navigation waypoints.
pub const WAYPOINT_DEDUP_DECIMALS: u32 = 6;
/// Ratios along the decoded path used to sample POI search centres.
pub const SAMPLE_RATIOS: [f64; 3] = [0.25, 0.5, 0.75];

// --- Places ---

/// Route-distance thresholds tried in order when filtering spots.
pub const SPOT_MAX_DISTANCE_M: f64 = 30.0;
pub const SPOT_MAX_DISTANCE_M_RELAXED: f64 = 60.0;
pub const SPOT_MAX_DISTANCE_M_FALLBACK: f64 = 120.0;
/// A relaxation tier is accepted only when it yields at least this many spots.
pub const MIN_SPOTS_PER_TIER: usize = 3;
/// Maximum number of spots attached to a response.
pub const MAX_SPOTS: usize = 5;

// --- Quality ---

pub const DISTANCE_MATCH_FULL_RATIO: f64 = 0.1;
pub const DISTANCE_MATCH_ZERO_RATIO: f64 = 0.5;
pub const QUALITY_NON_FALLBACK_WEIGHT: f64 = 0.3;
pub const QUALITY_DISTANCE_MATCH_WEIGHT: f64 = 0.4;
pub const QUALITY_TOOLS_WEIGHT: f64 = 0.3;
/// Distinct tools needed for the tool-usage bonus.
pub const QUALITY_MIN_TOOLS: usize = 3;

// --- Text ---

/// Walking pace used to estimate duration when the provider reports none.
pub const WALKING_SPEED_KMH: f64 = 4.8;
pub const MIN_TITLE_CHARS: usize = 4;
pub const MIN_DESCRIPTION_CHARS: usize = 60;
