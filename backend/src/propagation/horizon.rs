//! Horizon footprint and adaptive sampling step.

use chrono::{DateTime, Duration, Utc};

use super::{OrbitPropagator, PropagationError};
use crate::algorithms::geodesy::{haversine_distance_km, EARTH_GM, EARTH_RADIUS_KM, EARTH_RADIUS_M};
use crate::algorithms::polygon::{latitude_extent, point_in_polygon_wrapped};
use crate::models::{LatLong, SubSatellitePoint, Tle};

/// Vertex count of the horizon ring.
pub const HORIZON_VERTICES: usize = 36;

/// Smallest `cos(lat)` used when widening longitudes, keeps polar rings finite.
const MIN_COS_LAT: f64 = 0.01;

/// Ground footprint visible from a satellite at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonRegion {
    pub sub_point: SubSatellitePoint,
    pub radius_km: f64,
    pub vertices: Vec<LatLong>,
}

impl HorizonRegion {
    /// Footprint radius as an arc on the Earth's surface, in degrees.
    pub fn angular_radius_deg(&self) -> f64 {
        (self.radius_km / EARTH_RADIUS_KM).to_degrees()
    }

    /// Whether the footprint reaches over a pole. The ring then no longer
    /// bounds it: the far side of the pole lies outside every vertex.
    pub fn covers_pole(&self) -> bool {
        self.sub_point.lat.abs() + self.angular_radius_deg() >= 90.0
    }

    /// Latitude band spanned by the footprint, extended to the pole when
    /// the footprint covers it.
    pub fn latitude_band(&self) -> Option<(f64, f64)> {
        let (min_lat, max_lat) = latitude_extent(&self.vertices)?;
        if !self.covers_pole() {
            return Some((min_lat, max_lat));
        }
        if self.sub_point.lat >= 0.0 {
            Some((min_lat, 90.0))
        } else {
            Some((-90.0, max_lat))
        }
    }

    /// Whether `point` may see the satellite. Accepts points inside the ring
    /// or within the great-circle horizon distance of the sub-satellite point,
    /// so the answer never misses a point of the true footprint.
    pub fn contains(&self, point: LatLong) -> bool {
        if point_in_polygon_wrapped(point, &self.vertices) {
            return true;
        }
        let centre = self.sub_point.ground();
        haversine_distance_km(centre.lat, centre.lon, point.lat, point.lon) <= self.radius_km
    }
}

/// Flat-Earth horizon distance `sqrt(2 * R * h)` in km.
pub fn horizon_distance_km(altitude_km: f64) -> f64 {
    (2.0 * EARTH_RADIUS_KM * altitude_km.max(0.0)).sqrt()
}

/// Approximate the satellite footprint at `at` as a 36-vertex circle.
///
/// The circle over-approximates the true footprint and is only used to prune
/// candidate tiles before exact elevation checks.
pub fn compute_horizon_region(
    propagator: &dyn OrbitPropagator,
    tle: &Tle,
    at: DateTime<Utc>,
) -> Result<HorizonRegion, PropagationError> {
    let sub_point = propagator.propagate(tle, at)?;
    Ok(horizon_region_around(sub_point))
}

/// Horizon ring around an already propagated sub-satellite point.
pub fn horizon_region_around(sub_point: SubSatellitePoint) -> HorizonRegion {
    let radius_km = horizon_distance_km(sub_point.altitude_km);
    let angular_radius = (radius_km / EARTH_RADIUS_KM).to_degrees();
    let lon_scale = sub_point.lat.to_radians().cos().abs().max(MIN_COS_LAT);

    let vertices = (0..HORIZON_VERTICES)
        .map(|i| {
            let angle = i as f64 * std::f64::consts::TAU / HORIZON_VERTICES as f64;
            let lat = (sub_point.lat + angular_radius * angle.sin()).clamp(-90.0, 90.0);
            let lon = sub_point.lon + angular_radius * angle.cos() / lon_scale;
            LatLong::new(lat, lon)
        })
        .collect();

    HorizonRegion {
        sub_point,
        radius_km,
        vertices,
    }
}

fn sampling_fraction(altitude_km: f64) -> f64 {
    if altitude_km < 200.0 {
        0.01
    } else if altitude_km < 3578.0 {
        0.05
    } else {
        0.1
    }
}

/// Time step keeping the angular sampling error bounded for a tile.
///
/// Circular orbital velocity `sqrt(GM / (R + h))` gives the time needed to
/// cross `tile_radius_m`; the step is a fraction of it that grows with
/// altitude. Never shorter than one second.
pub fn optimal_time_step(altitude_km: f64, tile_radius_m: f64) -> Duration {
    let velocity = (EARTH_GM / (EARTH_RADIUS_M + altitude_km.max(0.0) * 1000.0)).sqrt();
    let time_over_tile = tile_radius_m.max(0.0) / velocity;
    let seconds = (time_over_tile * sampling_fraction(altitude_km)).floor() as i64;
    Duration::seconds(seconds.max(1))
}
