//! Helpers shared by the integration test suites.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};

use satvis_rust::algorithms::regular_polygon;
use satvis_rust::models::{quadkey, LatLong, SubSatellitePoint, Tile, Tle};
use satvis_rust::propagation::{OrbitPropagator, PropagationError};

/// ISS elements with an epoch of 2020-12-09 13:09 UTC.
pub const ISS_LINE1: &str =
    "1 25544U 98067A   20344.54791435  .00001234  00000-0  29746-4 0  9993";
pub const ISS_LINE2: &str =
    "2 25544  51.6456 212.9669 0001235 341.2074 106.3520 15.48921140255673";

pub fn iss_tle() -> Tle {
    Tle::from_lines(ISS_LINE1, ISS_LINE2).expect("ISS fixture must parse")
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

/// Placeholder TLE for fake propagators, which ignore the lines.
pub fn fake_tle(norad_id: &str) -> Tle {
    Tle::new(norad_id, format!("1 {}U fake", norad_id), format!("2 {} fake", norad_id), t0())
}

/// Ground track along the equator moving one degree east per minute from
/// longitude -30 at [`t0`], at 500 km.
pub struct EquatorTrack;

impl OrbitPropagator for EquatorTrack {
    fn propagate(&self, _: &Tle, at: DateTime<Utc>) -> Result<SubSatellitePoint, PropagationError> {
        let minutes = (at - t0()).num_seconds() as f64 / 60.0;
        Ok(SubSatellitePoint {
            lat: 0.0,
            lon: -30.0 + minutes,
            altitude_km: 500.0,
        })
    }
}

/// Zoom-6 hexagonal tile of 300 km radius.
pub fn tile(lat: f64, lon: f64) -> Tile {
    Tile {
        quadkey: quadkey(6, lat, lon),
        zoom_level: 6,
        center_lat: lat,
        center_lon: lon,
        nb_faces: 6,
        radius_m: 300_000.0,
        vertices: regular_polygon(LatLong::new(lat, lon), 300_000.0, 6),
    }
}

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// This is panic-safe (restores variables on unwind) and also serializes access to
/// process-global env vars to avoid flaky tests when Rust runs tests in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().expect("ENV_LOCK poisoned");
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}
