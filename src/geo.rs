//! Geographic primitives.

use crate::config::{validate_coordinate, validate_radius};
use crate::constants::geo::{KM_PER_DEG_LAT, KM_PER_DEG_LON};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting out-of-range values.
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        validate_coordinate(lat, lon)?;
        Ok(Self { lat, lon })
    }

    /// Coordinate from a GeoJSON position (`[lon, lat]`).
    pub const fn from_geojson(position: [f64; 2]) -> Self {
        Self {
            lat: position[1],
            lon: position[0],
        }
    }

    /// GeoJSON position (`[lon, lat]`).
    pub const fn to_geojson(self) -> [f64; 2] {
        [self.lon, self.lat]
    }

    /// Short label used for marker tooltips.
    pub fn short_label(self) -> String {
        format!("{:.3}, {:.3}", self.lat, self.lon)
    }
}

/// Axis-aligned search area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Western edge.
    pub min_lon: f64,
    /// Southern edge.
    pub min_lat: f64,
    /// Eastern edge.
    pub max_lon: f64,
    /// Northern edge.
    pub max_lat: f64,
}

impl BoundingBox {
    /// Approximate box of `radius_km` around `center`.
    ///
    /// Degrees per kilometer use a spherical approximation; longitude spacing
    /// shrinks with `cos(lat)`.
    pub fn around(center: Coordinate, radius_km: f64) -> Result<Self> {
        validate_radius(radius_km)?;

        let lat_offset = radius_km / KM_PER_DEG_LAT;
        // Clamp cos(lat) so the poles do not divide by zero.
        let cos_lat = center.lat.to_radians().cos().abs().max(1e-6);
        let lon_offset = radius_km / (KM_PER_DEG_LON * cos_lat);

        Ok(Self {
            min_lon: center.lon - lon_offset,
            min_lat: center.lat - lat_offset,
            max_lon: center.lon + lon_offset,
            max_lat: center.lat + lat_offset,
        })
    }

    /// Query-string form `min_lon,min_lat,max_lon,max_lat`.
    pub fn to_query(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }

    /// Whether the point lies inside the box (edges inclusive).
    pub fn contains(&self, point: Coordinate) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lon..=self.max_lon).contains(&point.lon)
    }
}
