use crate::constants::{MIN_VALID_DISTANCE_KM, POLYLINE_DEGENERATE_TOKEN, POLYLINE_PLACEHOLDER};
use crate::models::meta::RouteMeta;
use crate::models::{Coordinates, Spot, Theme};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// True for encodings that carry no usable path.
pub fn is_degenerate_polyline(polyline: &str) -> bool {
    let trimmed = polyline.trim();
    trimmed.is_empty() || trimmed == POLYLINE_PLACEHOLDER || trimmed == POLYLINE_DEGENERATE_TOKEN
}

/// A route before it has been given an id.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidate {
    pub polyline: String,
    pub distance_km: f64,
    pub duration_min: Option<f64>,
    pub theme: Theme,
    pub is_fallback: bool,
    pub has_stairs: bool,
    pub elevation_gain_m: f64,
}

impl RawCandidate {
    pub fn into_candidate(self, route_id: String) -> RouteCandidate {
        RouteCandidate {
            route_id,
            polyline: self.polyline,
            distance_km: self.distance_km,
            duration_min: self.duration_min,
            theme: self.theme,
            is_fallback: self.is_fallback,
            has_stairs: self.has_stairs,
            elevation_gain_m: self.elevation_gain_m.max(0.0),
        }
    }

    pub fn with_fresh_id(self) -> RouteCandidate {
        self.into_candidate(Uuid::new_v4().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteCandidate {
    pub route_id: String,
    pub polyline: String,
    pub distance_km: f64,
    pub duration_min: Option<f64>,
    pub theme: Theme,
    pub is_fallback: bool,
    pub has_stairs: bool,
    pub elevation_gain_m: f64,
}

impl RouteCandidate {
    pub fn is_valid(&self) -> bool {
        self.distance_km > MIN_VALID_DISTANCE_KM && !is_degenerate_polyline(&self.polyline)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedRoute {
    pub candidate: RouteCandidate,
    pub best_score: Option<f64>,
    /// 1-based rank among scored candidates.
    pub shown_rank: Option<usize>,
    /// Set when post-hoc validation swapped in a fallback.
    pub replaced: bool,
}

fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_round_trip() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRouteRequest {
    #[serde(default = "new_request_id")]
    pub request_id: String,
    pub theme: Theme,
    pub distance_km: f64,
    pub start_location: Coordinates,
    #[serde(default)]
    pub end_location: Option<Coordinates>,
    #[serde(default = "default_round_trip")]
    pub round_trip: bool,
    #[serde(default)]
    pub debug: bool,
}

impl GenerateRouteRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.request_id.trim().is_empty() {
            return Err("request_id must not be empty".to_string());
        }
        if !self.distance_km.is_finite() || self.distance_km <= 0.0 {
            return Err("distance_km must be greater than 0".to_string());
        }
        self.start_location
            .validate()
            .map_err(|e| format!("start_location: {}", e))?;
        if let Some(end) = &self.end_location {
            end.validate().map_err(|e| format!("end_location: {}", e))?;
        }
        if !self.round_trip && self.end_location.is_none() {
            return Err("end_location is required when round_trip is false".to_string());
        }
        Ok(())
    }
}

/// Immutable per-request inputs threaded through every pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub request_id: String,
    pub theme: Theme,
    pub distance_km: f64,
    pub start: Coordinates,
    /// Ignored for round trips.
    pub end: Option<Coordinates>,
    pub round_trip: bool,
    pub debug: bool,
}

impl From<&GenerateRouteRequest> for RequestContext {
    fn from(request: &GenerateRouteRequest) -> Self {
        RequestContext {
            request_id: request.request_id.clone(),
            theme: request.theme,
            distance_km: request.distance_km,
            start: request.start_location,
            end: if request.round_trip {
                None
            } else {
                request.end_location
            },
            round_trip: request.round_trip,
            debug: request.debug,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteOut {
    pub route_id: String,
    pub polyline: String,
    pub distance_km: f64,
    pub duration_min: u32,
    pub title: String,
    pub summary: String,
    pub nav_waypoints: Vec<Coordinates>,
    pub spots: Vec<Spot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateRouteResponse {
    pub request_id: String,
    pub route: RouteOut,
    pub meta: RouteMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub request_id: String,
    pub route_id: String,
    pub rating: i32,
}

impl FeedbackRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.request_id.trim().is_empty() || self.route_id.trim().is_empty() {
            return Err("request_id and route_id are required".to_string());
        }
        if !(1..=5).contains(&self.rating) {
            return Err(format!("rating must be between 1 and 5, got {}", self.rating));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub request_id: String,
    pub route_id: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(round_trip: bool, end: Option<Coordinates>) -> GenerateRouteRequest {
        GenerateRouteRequest {
            request_id: "req-1".to_string(),
            theme: Theme::Nature,
            distance_km: 2.0,
            start_location: Coordinates::new(35.0, 139.0).unwrap(),
            end_location: end,
            round_trip,
            debug: false,
        }
    }

    #[test]
    fn one_way_requires_end_location() {
        assert!(request(false, None).validate().is_err());
        let end = Coordinates::new(35.01, 139.01).unwrap();
        assert!(request(false, Some(end)).validate().is_ok());
        assert!(request(true, None).validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_distance_and_bad_coordinates() {
        let mut req = request(true, None);
        req.distance_km = 0.0;
        assert!(req.validate().is_err());

        let mut req = request(true, None);
        req.start_location = Coordinates { lat: 95.0, lng: 0.0 };
        assert!(req.validate().unwrap_err().contains("start_location"));
    }

    #[test]
    fn context_drops_end_for_round_trips() {
        let end = Coordinates::new(35.01, 139.01).unwrap();
        let ctx = RequestContext::from(&request(true, Some(end)));
        assert!(ctx.end.is_none());
        let ctx = RequestContext::from(&request(false, Some(end)));
        assert_eq!(ctx.end, Some(end));
    }

    #[test]
    fn request_defaults_fill_optional_fields() {
        let req: GenerateRouteRequest = serde_json::from_value(json!({
            "theme": "think",
            "distance_km": 3.0,
            "start_location": {"lat": 35.0, "lng": 139.0}
        }))
        .unwrap();
        assert!(req.round_trip);
        assert!(!req.debug);
        assert!(!req.request_id.is_empty());
    }

    #[test]
    fn candidate_validity() {
        let raw = RawCandidate {
            polyline: "xxxx".to_string(),
            distance_km: 2.0,
            duration_min: None,
            theme: Theme::Nature,
            is_fallback: false,
            has_stairs: false,
            elevation_gain_m: -3.0,
        };
        let candidate = raw.clone().with_fresh_id();
        assert!(!candidate.is_valid());
        assert_eq!(candidate.elevation_gain_m, 0.0);

        let mut ok = raw.into_candidate("r1".to_string());
        ok.polyline = "_p~iF~ps|U_ulLnnqC".to_string();
        assert!(ok.is_valid());
        ok.distance_km = 0.01;
        assert!(!ok.is_valid());
    }

    #[test]
    fn feedback_rating_range() {
        let mut fb = FeedbackRequest {
            request_id: "r".into(),
            route_id: "x".into(),
            rating: 5,
        };
        assert!(fb.validate().is_ok());
        fb.rating = 0;
        assert!(fb.validate().is_err());
        fb.rating = 6;
        assert!(fb.validate().is_err());
    }
}
