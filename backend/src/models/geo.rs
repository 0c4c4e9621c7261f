//! Geographic value types shared by the geometry, propagation and service layers.

use serde::{Deserialize, Serialize};

/// A latitude or longitude scalar expressed in degrees.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coordinate(pub f64);

impl Coordinate {
    pub fn new(degrees: f64) -> Self {
        Self(degrees)
    }

    pub fn from_radians(radians: f64) -> Self {
        Self(radians.to_degrees())
    }

    pub fn degrees(self) -> f64 {
        self.0
    }

    pub fn radians(self) -> f64 {
        self.0.to_radians()
    }
}

impl From<f64> for Coordinate {
    fn from(v: f64) -> Self {
        Self(v)
    }
}

/// Paired latitude/longitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLong {
    pub lat: f64,
    pub lon: f64,
}

impl LatLong {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn latitude(&self) -> Coordinate {
        Coordinate(self.lat)
    }

    pub fn longitude(&self) -> Coordinate {
        Coordinate(self.lon)
    }

    /// True when latitude is within [-90, 90] and longitude within [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Geodetic position of a satellite projected on the ground, with its altitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubSatellitePoint {
    pub lat: f64,
    pub lon: f64,
    pub altitude_km: f64,
}

impl SubSatellitePoint {
    pub fn ground(&self) -> LatLong {
        LatLong::new(self.lat, self.lon)
    }
}

/// Axis-aligned latitude/longitude box used for region queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    pub fn contains(&self, point: LatLong) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lon >= self.min_lon
            && point.lon <= self.max_lon
    }

    /// Smallest box enclosing every point of `points`, or `None` for an empty ring.
    pub fn enclosing(points: &[LatLong]) -> Option<Self> {
        let first = points.first()?;
        let init = Self::new(first.lat, first.lon, first.lat, first.lon);
        Some(points.iter().skip(1).fold(init, |acc, p| Self {
            min_lat: acc.min_lat.min(p.lat),
            min_lon: acc.min_lon.min(p.lon),
            max_lat: acc.max_lat.max(p.lat),
            max_lon: acc.max_lon.max(p.lon),
        }))
    }
}
