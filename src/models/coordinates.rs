use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Result<Self, String> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(format!(
                "Invalid latitude: {} (must be between -90 and 90)",
                lat
            ));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(format!(
                "Invalid longitude: {} (must be between -180 and 180)",
                lng
            ));
        }
        Ok(Coordinates { lat, lng })
    }

    /// Re-run range validation on a value that came in through serde.
    pub fn validate(&self) -> Result<(), String> {
        Coordinates::new(self.lat, self.lng).map(|_| ())
    }

    /// Calculate distance between two coordinates using Haversine formula
    /// Returns distance in kilometers
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        let lat1_rad = self.lat.to_radians();
        let lat2_rad = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lng = (other.lng - self.lng).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }

    /// Haversine distance in meters.
    pub fn distance_m(&self, other: &Coordinates) -> f64 {
        self.distance_to(other) * 1000.0
    }

    /// Initial great-circle bearing towards `other`, degrees in [0, 360).
    pub fn bearing_to(&self, other: &Coordinates) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let delta_lng = (other.lng - self.lng).to_radians();

        let y = delta_lng.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lng.cos();
        (y.atan2(x).to_degrees() + 360.0) % 360.0
    }

    /// Point reached by travelling `distance_km` along `bearing_deg` on a sphere.
    /// Fails when the result leaves the valid coordinate range.
    pub fn destination(&self, bearing_deg: f64, distance_km: f64) -> Result<Coordinates, String> {
        let angular = distance_km / EARTH_RADIUS_KM;
        let bearing = bearing_deg.to_radians();
        let lat1 = self.lat.to_radians();
        let lng1 = self.lng.to_radians();

        let lat2 =
            (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lng2 = lng1
            + (bearing.sin() * angular.sin() * lat1.cos())
                .atan2(angular.cos() - lat1.sin() * lat2.sin());

        // Normalise longitude to [-180, 180]
        let lng_deg = (lng2.to_degrees() + 540.0) % 360.0 - 180.0;
        Coordinates::new(lat2.to_degrees(), lng_deg)
    }

    /// Round coordinates to specified decimal places for caching
    pub fn round(&self, decimal_places: u32) -> Self {
        let multiplier = 10_f64.powi(decimal_places as i32);
        Coordinates {
            lat: (self.lat * multiplier).round() / multiplier,
            lng: (self.lng * multiplier).round() / multiplier,
        }
    }

    /// Integer key of the rounded coordinate, usable in hash sets.
    pub fn rounded_key(&self, decimal_places: u32) -> (i64, i64) {
        let multiplier = 10_f64.powi(decimal_places as i32);
        (
            (self.lat * multiplier).round() as i64,
            (self.lng * multiplier).round() as i64,
        )
    }
}
