//! Polygon helpers: regular rings around a centre and point containment.

use std::f64::consts::PI;

use super::geodesy::EARTH_RADIUS_M;
use crate::models::{BoundingBox, LatLong};

/// Regular `nb_faces`-vertex ring approximating a circle of `radius_m` meters.
///
/// Offsets are computed on a local tangent plane, so the ring degrades close
/// to the poles where `cos(lat)` vanishes.
pub fn regular_polygon(center: LatLong, radius_m: f64, nb_faces: usize) -> Vec<LatLong> {
    let lat = center.lat.to_radians();
    let lon = center.lon.to_radians();
    let step = 2.0 * PI / nb_faces as f64;

    (0..nb_faces)
        .map(|i| {
            let angle = step * i as f64;
            let d_lat = radius_m * angle.cos() / EARTH_RADIUS_M;
            let d_lon = radius_m * angle.sin() / (EARTH_RADIUS_M * lat.cos());
            LatLong::new((lat + d_lat).to_degrees(), (lon + d_lon).to_degrees())
        })
        .collect()
}

/// Ray-casting containment test, latitude on the Y axis and longitude on X.
pub fn point_in_polygon(point: LatLong, ring: &[LatLong]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (a, b) = (ring[i], ring[j]);
        if (a.lat > point.lat) != (b.lat > point.lat) {
            let x_cross = (b.lon - a.lon) * (point.lat - a.lat) / (b.lat - a.lat) + a.lon;
            if point.lon < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Containment test tolerant to rings that spill over the antimeridian.
///
/// Rings built around a centre near ±180 carry longitudes beyond that range;
/// the point is also tested shifted by ±360 degrees.
pub fn point_in_polygon_wrapped(point: LatLong, ring: &[LatLong]) -> bool {
    [0.0, 360.0, -360.0]
        .iter()
        .any(|shift| point_in_polygon(LatLong::new(point.lat, point.lon + shift), ring))
}

/// Latitude extent of a ring, used to prune whole latitude bands at once.
pub fn latitude_extent(ring: &[LatLong]) -> Option<(f64, f64)> {
    BoundingBox::enclosing(ring).map(|b| (b.min_lat, b.max_lat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::geodesy::haversine_distance_km;

    fn square() -> Vec<LatLong> {
        vec![
            LatLong::new(-1.0, -1.0),
            LatLong::new(-1.0, 1.0),
            LatLong::new(1.0, 1.0),
            LatLong::new(1.0, -1.0),
        ]
    }

    #[test]
    fn test_regular_polygon_vertex_count_and_radius() {
        let center = LatLong::new(10.0, 20.0);
        let ring = regular_polygon(center, 50_000.0, 6);
        assert_eq!(ring.len(), 6);
        for v in &ring {
            let d = haversine_distance_km(center.lat, center.lon, v.lat, v.lon);
            assert!((d - 50.0).abs() < 1.0, "vertex at {} km", d);
        }
    }

    #[test]
    fn test_point_in_polygon() {
        assert!(point_in_polygon(LatLong::new(0.0, 0.0), &square()));
        assert!(!point_in_polygon(LatLong::new(2.0, 0.0), &square()));
        assert!(!point_in_polygon(LatLong::new(0.0, 0.0), &square()[..2]));
    }

    #[test]
    fn test_point_in_polygon_across_antimeridian() {
        let ring = regular_polygon(LatLong::new(0.0, 179.0), 500_000.0, 36);
        assert!(!point_in_polygon(LatLong::new(0.0, -179.5), &ring));
        assert!(point_in_polygon_wrapped(LatLong::new(0.0, -179.5), &ring));
    }

    #[test]
    fn test_latitude_extent() {
        assert_eq!(latitude_extent(&square()), Some((-1.0, 1.0)));
        assert_eq!(latitude_extent(&[]), None);
    }
}
