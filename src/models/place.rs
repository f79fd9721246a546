use crate::models::Coordinates;
use serde::{Deserialize, Serialize};

/// A point of interest returned by the places provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Place {
    pub name: String,
    /// Provider type tag, e.g. `park` or `nature_reserve`.
    #[serde(rename = "type")]
    pub place_type: String,
    pub place_id: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

impl Place {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lng: self.lng,
        }
    }

    /// Identity used to merge results from several searches.
    pub fn dedup_key(&self) -> String {
        if let Some(id) = self.place_id.as_deref().filter(|id| !id.is_empty()) {
            return format!("id:{}", id);
        }
        if !self.name.trim().is_empty() {
            return format!("name:{}", self.name.trim().to_lowercase());
        }
        let (lat, lng) = self.coordinates().rounded_key(5);
        format!("pos:{}:{}", lat, lng)
    }
}

/// Spot as presented in a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Spot {
    pub name: String,
    #[serde(rename = "type")]
    pub spot_type: String,
    pub lat: f64,
    pub lng: f64,
}

impl From<&Place> for Spot {
    fn from(place: &Place) -> Self {
        Spot {
            name: place.name.clone(),
            spot_type: humanize_place_type(&place.place_type),
            lat: place.lat,
            lng: place.lng,
        }
    }
}

/// `nature_reserve` -> `nature reserve`
pub fn humanize_place_type(raw: &str) -> String {
    raw.split(['_', '-'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
