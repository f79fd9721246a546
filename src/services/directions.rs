use crate::error::AppError;
use crate::models::Coordinates;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const MAPBOX_DIRECTIONS_BASE_URL: &str = "https://api.mapbox.com/directions/v5/mapbox";
const WALKING_PROFILE: &str = "walking";
/// Mapbox accepts at most 25 coordinates per request.
const MAX_COORDINATES: usize = 25;

/// One routing request: origin, optional intermediates, destination.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionsRequest {
    pub origin: Coordinates,
    pub destination: Coordinates,
    pub intermediates: Vec<Coordinates>,
    pub round_trip: bool,
    /// Distance the geometry was sized for. Only logged; the provider never sees it.
    pub target_km: f64,
}

impl DirectionsRequest {
    /// Every coordinate in travel order.
    pub fn coordinates(&self) -> Vec<Coordinates> {
        let mut coords = Vec::with_capacity(self.intermediates.len() + 2);
        coords.push(self.origin);
        coords.extend(self.intermediates.iter().copied());
        coords.push(self.destination);
        coords
    }
}

/// Walking route as reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRoute {
    pub polyline: String,
    pub distance_km: f64,
    pub duration_min: Option<f64>,
    pub has_stairs: bool,
    pub elevation_gain_m: f64,
}

#[derive(Debug, Error)]
pub enum DirectionsError {
    /// The provider considers the request malformed; retrying other shapes is pointless.
    #[error("directions request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("directions provider is not configured")]
    NotConfigured,

    #[error("directions request failed: {0}")]
    Upstream(String),
}

impl From<DirectionsError> for AppError {
    fn from(err: DirectionsError) -> Self {
        AppError::DirectionsApi(err.to_string())
    }
}

#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    /// `Ok(None)` means the provider found no route for this request.
    async fn compute_route(
        &self,
        request: &DirectionsRequest,
    ) -> Result<Option<ProviderRoute>, DirectionsError>;
}

/// How the client authenticates with the directions API.
#[derive(Clone, Debug)]
pub enum AuthMode {
    /// Send `access_token` query param (direct Mapbox).
    DirectToken,
    /// Proxy mode: send `Authorization: Bearer` header.
    BearerHeader,
}

#[derive(Clone)]
pub struct MapboxClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    auth_mode: AuthMode,
    timeout: Duration,
}

impl MapboxClient {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        MapboxClient {
            client: Client::new(),
            api_key,
            base_url: MAPBOX_DIRECTIONS_BASE_URL.to_string(),
            auth_mode: AuthMode::DirectToken,
            timeout,
        }
    }

    pub fn with_config(
        api_key: Option<String>,
        base_url: String,
        auth_mode: AuthMode,
        timeout: Duration,
    ) -> Self {
        MapboxClient {
            client: Client::new(),
            api_key,
            base_url,
            auth_mode,
            timeout,
        }
    }

    fn request_url(&self, coordinates: &[Coordinates]) -> String {
        // Format coordinates as "lng,lat;lng,lat;..."
        let coordinates_str = coordinates
            .iter()
            .map(|c| format!("{:.6},{:.6}", c.lng, c.lat))
            .collect::<Vec<_>>()
            .join(";");

        format!("{}/{}/{}", self.base_url, WALKING_PROFILE, coordinates_str)
    }
}

/// Statuses the provider uses for requests it cannot parse.
fn is_malformed_request(status: StatusCode) -> bool {
    status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY
}

#[async_trait]
impl DirectionsProvider for MapboxClient {
    async fn compute_route(
        &self,
        request: &DirectionsRequest,
    ) -> Result<Option<ProviderRoute>, DirectionsError> {
        let api_key = self.api_key.as_deref().ok_or(DirectionsError::NotConfigured)?;

        let coordinates = request.coordinates();
        if coordinates.len() > MAX_COORDINATES {
            return Err(DirectionsError::Rejected {
                status: StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
                message: format!("{} coordinates exceed the provider limit", coordinates.len()),
            });
        }

        let url = self.request_url(&coordinates);
        tracing::debug!(
            waypoints = coordinates.len(),
            round_trip = request.round_trip,
            target_km = request.target_km,
            "Directions request: {} coordinates",
            coordinates.len()
        );

        let mut builder = self
            .client
            .get(&url)
            .query(&[
                ("geometries", "polyline"),
                ("overview", "full"),
                ("steps", "false"),
            ])
            .timeout(self.timeout);

        match self.auth_mode {
            AuthMode::DirectToken => {
                builder = builder.query(&[("access_token", api_key)]);
            }
            AuthMode::BearerHeader => {
                builder = builder.bearer_auth(api_key);
            }
        }

        let response = builder
            .send()
            .await
            .map_err(|e| DirectionsError::Upstream(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!(
                status = %status,
                waypoints = coordinates.len(),
                "Directions HTTP error {}: {}",
                status, error_text
            );
            if is_malformed_request(status) {
                return Err(DirectionsError::Rejected {
                    status: status.as_u16(),
                    message: error_text,
                });
            }
            return Err(DirectionsError::Upstream(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let directions: MapboxDirectionsApiResponse = response
            .json()
            .await
            .map_err(|e| DirectionsError::Upstream(format!("Failed to parse response: {}", e)))?;

        Ok(directions.into_route())
    }
}

// Mapbox API response types

#[derive(Debug, Deserialize)]
struct MapboxDirectionsApiResponse {
    #[serde(default)]
    routes: Vec<MapboxRoute>,
    code: String,
}

#[derive(Debug, Deserialize)]
struct MapboxRoute {
    distance: f64, // meters
    duration: f64, // seconds
    /// Encoded polyline (precision 5) when requested with `geometries=polyline`
    geometry: String,
}

impl MapboxDirectionsApiResponse {
    fn into_route(self) -> Option<ProviderRoute> {
        if self.code != "Ok" {
            tracing::debug!(code = %self.code, "Directions returned no route");
            return None;
        }
        let route = self.routes.into_iter().next()?;
        tracing::debug!(
            distance_km = %format!("{:.2}", route.distance / 1000.0),
            duration_min = %format!("{:.0}", route.duration / 60.0),
            "Directions response: {:.2}km, {:.0}min",
            route.distance / 1000.0, route.duration / 60.0
        );
        Some(ProviderRoute {
            polyline: route.geometry,
            distance_km: route.distance / 1000.0,
            duration_min: (route.duration > 0.0).then_some(route.duration / 60.0),
            // The walking profile exposes neither stairs nor elevation
            has_stairs: false,
            elevation_gain_m: 0.0,
        })
    }
}
