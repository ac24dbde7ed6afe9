use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{AppError, AppResult};

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
const METERS_PER_DEGREE_LATITUDE: f64 = EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinates {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        (-180.0..=180.0).contains(&self.longitude) && (-90.0..=90.0).contains(&self.latitude)
    }

    /// Great-circle distance using the haversine formula.
    pub fn distance_meters(&self, other: &Coordinates) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lng = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }

    /// Axis-aligned box that contains every point within `radius_meters`.
    pub fn bounding_box(&self, radius_meters: f64) -> BoundingBox {
        let d_lat = radius_meters / METERS_PER_DEGREE_LATITUDE;
        let angular = radius_meters / EARTH_RADIUS_METERS;
        let ratio = angular.sin() / self.latitude.to_radians().cos().abs();
        let d_lng = if ratio >= 1.0 || !ratio.is_finite() {
            180.0
        } else {
            ratio.asin().to_degrees()
        };
        BoundingBox {
            min_latitude: (self.latitude - d_lat).max(-90.0),
            max_latitude: (self.latitude + d_lat).min(90.0),
            min_longitude: self.longitude - d_lng,
            max_longitude: self.longitude + d_lng,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolves a city name, `Ok(None)` when the provider has no match.
    async fn geocode_city(&self, city: &str) -> AppResult<Option<Coordinates>>;
}

#[derive(Debug, Deserialize)]
struct OpenCageResponse {
    results: Vec<OpenCageResult>,
}

#[derive(Debug, Deserialize)]
struct OpenCageResult {
    geometry: OpenCageGeometry,
}

#[derive(Debug, Deserialize)]
struct OpenCageGeometry {
    lat: f64,
    lng: f64,
}

/// Forward geocoding through the OpenCage API.
pub struct OpenCageGeocoder {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenCageGeocoder {
    pub fn new(api_key: Option<String>) -> anyhow::Result<Self> {
        Self::with_base_url(api_key, "https://api.opencagedata.com".into())
    }

    pub fn with_base_url(api_key: Option<String>, base_url: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }
}

#[async_trait]
impl Geocoder for OpenCageGeocoder {
    async fn geocode_city(&self, city: &str) -> AppResult<Option<Coordinates>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("OPENCAGE_API_KEY is not set")))?;

        let url = format!("{}/geocode/v1/json", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", city), ("key", api_key), ("limit", "1")])
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("geocoding request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "geocoding API returned status {}",
                response.status()
            )));
        }

        let body: OpenCageResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid geocoding response: {e}")))?;

        let coordinates = body
            .results
            .into_iter()
            .next()
            .map(|r| Coordinates::new(r.geometry.lng, r.geometry.lat));
        if coordinates.is_none() {
            tracing::debug!(city, "no geocoding results");
        }
        Ok(coordinates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_between_known_cities() {
        let paris = Coordinates::new(2.3522, 48.8566);
        let london = Coordinates::new(-0.1276, 51.5072);
        let km = paris.distance_meters(&london) / 1000.0;
        assert!((330.0..350.0).contains(&km), "got {km}");
        assert!(paris.distance_meters(&paris) < 1e-6);
    }

    #[test]
    fn bounding_box_contains_radius() {
        let center = Coordinates::new(-7.5898, 33.5731);
        let bbox = center.bounding_box(20_000.0);
        let north = Coordinates::new(center.longitude, bbox.max_latitude);
        let east = Coordinates::new(bbox.max_longitude, center.latitude);
        assert!(center.distance_meters(&north) >= 19_900.0);
        assert!(center.distance_meters(&east) >= 19_900.0);
    }

    #[test]
    fn validates_coordinate_ranges() {
        assert!(Coordinates::new(10.0, 45.0).is_valid());
        assert!(!Coordinates::new(190.0, 45.0).is_valid());
        assert!(!Coordinates::new(10.0, -95.0).is_valid());
    }
}
