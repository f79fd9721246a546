use crate::error::{AppError, Result};
use crate::models::{Coordinates, Place, Theme};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Server-side Overpass timeout, kept below the client timeout.
const OVERPASS_QUERY_TIMEOUT_SECONDS: u64 = 8;

/// Tag keys that identify a walkable point of interest, in precedence order.
const TYPE_KEYS: &[&str] = &["leisure", "tourism", "natural", "historic", "amenity"];

/// One place search around a centre point.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceSearch {
    pub center: Coordinates,
    pub radius_m: f64,
    pub max_results: usize,
    /// `key=value` tag filters; empty means any walkable feature.
    pub included_types: Vec<String>,
    pub keyword: Option<String>,
    pub theme: Theme,
    /// Retry without type filters when the filtered search finds nothing.
    pub allow_unfiltered_fallback: bool,
}

#[async_trait]
pub trait PlacesProvider: Send + Sync {
    async fn search(&self, query: &PlaceSearch) -> Result<Vec<Place>>;
}

/// Classic place types per theme, as OSM `key=value` tags.
pub fn classic_types(theme: Theme) -> &'static [&'static str] {
    match theme {
        Theme::Exercise => &[
            "leisure=park",
            "leisure=sports_centre",
            "leisure=track",
            "leisure=pitch",
            "leisure=fitness_station",
        ],
        Theme::Think => &[
            "amenity=library",
            "amenity=place_of_worship",
            "tourism=museum",
            "leisure=garden",
            "amenity=cafe",
        ],
        Theme::Refresh => &[
            "amenity=cafe",
            "tourism=viewpoint",
            "leisure=garden",
            "amenity=marketplace",
            "tourism=artwork",
        ],
        Theme::Nature => &[
            "leisure=park",
            "leisure=garden",
            "leisure=nature_reserve",
            "natural=water",
            "natural=wood",
        ],
    }
}

/// Narrow "hidden gem" name keywords per theme.
pub fn hidden_keywords(theme: Theme) -> &'static [&'static str] {
    match theme {
        Theme::Exercise => &["stairs", "hill", "trail", "steps"],
        Theme::Think => &["shrine", "temple", "reading", "quiet"],
        Theme::Refresh => &["bakery", "tea", "terrace", "riverside"],
        Theme::Nature => &["pond", "grove", "brook", "meadow"],
    }
}

#[derive(Clone)]
pub struct OverpassClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl OverpassClient {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        OverpassClient {
            client: Client::new(),
            endpoint,
            timeout,
        }
    }

    fn build_query(&self, query: &PlaceSearch, with_types: bool) -> String {
        let mut parts = vec![format!(
            "[out:json][timeout:{}];(",
            OVERPASS_QUERY_TIMEOUT_SECONDS
        )];
        let around = format!(
            "(around:{:.0},{},{})",
            query.radius_m, query.center.lat, query.center.lng
        );
        let name_filter = match query.keyword.as_deref().map(sanitize_keyword) {
            Some(kw) if !kw.is_empty() => format!(r#"["name"~"{}",i]"#, kw),
            _ => r#"["name"]"#.to_string(),
        };

        let typed: Vec<(&str, &str)> = if with_types {
            query
                .included_types
                .iter()
                .filter_map(|t| t.split_once('='))
                .collect()
        } else {
            Vec::new()
        };

        if typed.is_empty() {
            parts.push(format!(
                r#"nwr[~"^({})$"~"."]{}{};"#,
                TYPE_KEYS.join("|"),
                name_filter,
                around
            ));
        } else {
            for (key, value) in typed {
                parts.push(format!(
                    r#"nwr["{}"="{}"]{}{};"#,
                    key, value, name_filter, around
                ));
            }
        }

        parts.push(format!(");out center {};", query.max_results.max(1)));
        parts.join("\n")
    }

    async fn execute(&self, overpass_query: String) -> Result<Vec<Place>> {
        tracing::debug!("Overpass query: {}", overpass_query);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(format!("data={}", urlencoding::encode(&overpass_query)))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::PlacesApi("Request timed out".to_string())
                } else {
                    AppError::PlacesApi(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::PlacesApi(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let api_response: OverpassResponse = response
            .json()
            .await
            .map_err(|e| AppError::PlacesApi(format!("Failed to parse response: {}", e)))?;

        Ok(convert_elements(api_response.elements))
    }
}

#[async_trait]
impl PlacesProvider for OverpassClient {
    async fn search(&self, query: &PlaceSearch) -> Result<Vec<Place>> {
        let places = self.execute(self.build_query(query, true)).await?;
        if !places.is_empty() || !query.allow_unfiltered_fallback || query.included_types.is_empty()
        {
            return Ok(places);
        }

        tracing::debug!(
            theme = %query.theme,
            "Filtered place search empty, retrying without type filter"
        );
        self.execute(self.build_query(query, false)).await
    }
}

/// Keep keywords safe inside an Overpass regex literal.
fn sanitize_keyword(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string()
}

fn convert_elements(elements: Vec<OverpassElement>) -> Vec<Place> {
    elements
        .into_iter()
        .filter_map(|elem| {
            let (lat, lon) = match (elem.lat, elem.lon, &elem.center) {
                (Some(lat), Some(lon), _) => (lat, lon),
                (_, _, Some(center)) => (center.lat, center.lon),
                _ => return None,
            };
            let coords = Coordinates::new(lat, lon).ok()?;
            let name = elem.tags.get("name")?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let place_type = TYPE_KEYS
                .iter()
                .find_map(|key| elem.tags.get(*key))
                .cloned()
                .unwrap_or_else(|| "point_of_interest".to_string());

            Some(Place {
                name,
                place_type,
                place_id: Some(format!("osm:{}/{}", elem.element_type, elem.id)),
                lat: coords.lat,
                lng: coords.lng,
            })
        })
        .collect()
}

// Overpass API response types

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    element_type: String,
    id: i64,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search(types: Vec<&str>, keyword: Option<&str>) -> PlaceSearch {
        PlaceSearch {
            center: Coordinates::new(35.0, 139.0).unwrap(),
            radius_m: 300.0,
            max_results: 2,
            included_types: types.into_iter().map(str::to_string).collect(),
            keyword: keyword.map(str::to_string),
            theme: Theme::Nature,
            allow_unfiltered_fallback: true,
        }
    }

    fn client() -> OverpassClient {
        OverpassClient::new("http://localhost/api".to_string(), Duration::from_secs(1))
    }

    #[test]
    fn test_build_typed_query() {
        let query = client().build_query(&search(vec!["leisure=park"], None), true);
        assert!(query.contains("[out:json]"));
        assert!(query.contains(r#"nwr["leisure"="park"]["name"](around:300,35,139);"#));
        assert!(query.contains("out center 2;"));
    }

    #[test]
    fn test_build_keyword_query_without_types() {
        let query = client().build_query(&search(vec![], Some("pond\"];")), true);
        assert!(query.contains(r#"["name"~"pond",i]"#));
        assert!(query.contains("leisure|tourism|natural|historic|amenity"));
    }

    #[test]
    fn test_unfiltered_query_drops_types() {
        let query = client().build_query(&search(vec!["leisure=park"], None), false);
        assert!(!query.contains(r#""leisure"="park""#));
    }

    #[test]
    fn test_convert_elements() {
        let parsed: OverpassResponse = serde_json::from_str(
            r#"{"elements":[
                {"type":"node","id":1,"lat":35.0,"lon":139.0,"tags":{"name":"Pond","natural":"water"}},
                {"type":"way","id":2,"center":{"lat":35.001,"lon":139.001},"tags":{"name":"Grove Park","leisure":"park"}},
                {"type":"node","id":3,"lat":35.0,"lon":139.0,"tags":{"leisure":"park"}}
            ]}"#,
        )
        .unwrap();
        let places = convert_elements(parsed.elements);
        assert_eq!(places.len(), 2);
        assert_eq!(places[0].place_type, "water");
        assert_eq!(places[1].place_id.as_deref(), Some("osm:way/2"));
        assert_eq!(places[1].place_type, "park");
    }

    #[test]
    fn every_theme_has_types_and_keywords() {
        for theme in Theme::ALL {
            assert!(!classic_types(theme).is_empty());
            assert!(!hidden_keywords(theme).is_empty());
            assert!(classic_types(theme).iter().all(|t| t.contains('=')));
        }
    }
}
