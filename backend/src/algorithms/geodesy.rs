//! Spherical-Earth geodesy primitives.
//!
//! Every function here is pure and deterministic. Positions are expressed in
//! degrees and kilometers; the Earth is a sphere of radius [`EARTH_RADIUS_KM`].

use crate::models::LatLong;

/// Mean Earth radius used for distances and Cartesian projection (km).
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// WGS-84 equatorial radius used for polygon construction (m).
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Equatorial circumference used to size slippy-map tiles (m).
pub const EARTH_CIRCUMFERENCE_M: f64 = 40_075_016.686;

/// Standard gravitational parameter of the Earth (m^3/s^2).
pub const EARTH_GM: f64 = 3.986e14;

/// Component-wise tolerance under which a satellite is treated as directly overhead.
pub const OVERHEAD_EPSILON: f64 = 1e-6;

/// Slack added to the tile radius by [`intersects`] (km).
pub const INTERSECTION_MARGIN_KM: f64 = 0.01;

type Vec3 = [f64; 3];

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn normalize(v: Vec3) -> Vec3 {
    let norm = dot(v, v).sqrt();
    if norm == 0.0 {
        return v;
    }
    [v[0] / norm, v[1] / norm, v[2] / norm]
}

/// Project a geodetic position onto Earth-centred Cartesian axes (km).
///
/// # Arguments
/// * `lat` - Latitude in degrees
/// * `lon` - Longitude in degrees
/// * `altitude_km` - Height above the sphere, 0 for ground points
pub fn to_cartesian(lat: f64, lon: f64, altitude_km: f64) -> Vec3 {
    let r = EARTH_RADIUS_KM + altitude_km;
    let (lat, lon) = (lat.to_radians(), lon.to_radians());
    [
        r * lat.cos() * lon.cos(),
        r * lat.cos() * lon.sin(),
        r * lat.sin(),
    ]
}

/// Great-circle surface distance between two points (km).
pub fn haversine_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Haversine distance with the altitude difference folded in by Pythagoras (km).
pub fn haversine_distance_3d_km(a: LatLong, alt_a_km: f64, b: LatLong, alt_b_km: f64) -> f64 {
    let surface = haversine_distance_km(a.lat, a.lon, b.lat, b.lon);
    let d_alt = alt_b_km - alt_a_km;
    (surface * surface + d_alt * d_alt).sqrt()
}

/// Elevation of a satellite above the local horizon of a ground point, in degrees.
///
/// The angle between the ground-to-satellite direction and the ground nadir is
/// 180 for a satellite overhead and 90 on the horizon; elevation is that angle
/// minus 90, clamped to `[0, 90]`. Satellites below the horizon report 0.
///
/// # Arguments
/// * `ground` - Observer position (altitude 0)
/// * `satellite` - Sub-satellite point
/// * `satellite_alt_km` - Satellite altitude above the sphere
pub fn elevation_angle_degrees(ground: LatLong, satellite: LatLong, satellite_alt_km: f64) -> f64 {
    let ground_xyz = to_cartesian(ground.lat, ground.lon, 0.0);
    let sat_xyz = to_cartesian(satellite.lat, satellite.lon, satellite_alt_km);

    let line_of_sight = normalize(sub(sat_xyz, ground_xyz));
    let nadir = normalize([-ground_xyz[0], -ground_xyz[1], -ground_xyz[2]]);

    let overhead = (0..3).all(|i| (line_of_sight[i] + nadir[i]).abs() < OVERHEAD_EPSILON);
    if overhead {
        return 90.0;
    }

    let cos_angle = dot(line_of_sight, nadir).clamp(-1.0, 1.0);
    let angle_from_nadir = cos_angle.acos().to_degrees();
    (angle_from_nadir - 90.0).clamp(0.0, 90.0)
}

/// Whether the sub-satellite point lies within `tile_radius_km` of the tile centre.
pub fn intersects(tile_center: LatLong, sub_satellite: LatLong, tile_radius_km: f64) -> bool {
    let distance = haversine_distance_km(
        sub_satellite.lat,
        sub_satellite.lon,
        tile_center.lat,
        tile_center.lon,
    );
    distance <= tile_radius_km + INTERSECTION_MARGIN_KM
}
