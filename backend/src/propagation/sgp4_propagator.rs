//! SGP4-backed [`OrbitPropagator`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use parking_lot::RwLock;

use super::{OrbitPropagator, PropagationError};
use crate::models::{SubSatellitePoint, Tle};

const WGS84_A_KM: f64 = 6378.137;
const WGS84_F: f64 = 1.0 / 298.257_223_563;

struct ParsedElements {
    elements: sgp4::Elements,
    constants: sgp4::Constants,
}

/// Propagator backed by the `sgp4` crate.
///
/// Parsing elements and deriving constants is the expensive part of a call, so
/// each distinct TLE is initialised once and reused by every later instant.
#[derive(Default)]
pub struct Sgp4Propagator {
    parsed: RwLock<HashMap<(String, String), Arc<ParsedElements>>>,
}

impl Sgp4Propagator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct TLEs initialised so far.
    pub fn cached_elements(&self) -> usize {
        self.parsed.read().len()
    }

    fn parsed(&self, tle: &Tle) -> Result<Arc<ParsedElements>, PropagationError> {
        let key = (tle.line1.clone(), tle.line2.clone());
        if let Some(parsed) = self.parsed.read().get(&key) {
            return Ok(Arc::clone(parsed));
        }

        let invalid = |message: String| PropagationError::InvalidElements {
            norad_id: tle.norad_id.to_string(),
            message,
        };
        let elements = sgp4::Elements::from_tle(None, tle.line1.as_bytes(), tle.line2.as_bytes())
            .map_err(|e| invalid(format!("{:?}", e)))?;
        let constants =
            sgp4::Constants::from_elements(&elements).map_err(|e| invalid(format!("{:?}", e)))?;
        debug!("Initialised SGP4 constants for {}", tle.norad_id);

        let parsed = Arc::new(ParsedElements {
            elements,
            constants,
        });
        self.parsed.write().insert(key, Arc::clone(&parsed));
        Ok(parsed)
    }
}

impl OrbitPropagator for Sgp4Propagator {
    fn propagate(&self, tle: &Tle, at: DateTime<Utc>) -> Result<SubSatellitePoint, PropagationError> {
        let parsed = self.parsed(tle)?;
        let integration = |message: String| PropagationError::Integration {
            norad_id: tle.norad_id.to_string(),
            at,
            message,
        };

        let naive = at.naive_utc();
        let minutes = parsed
            .elements
            .datetime_to_minutes_since_epoch(&naive)
            .map_err(|e| integration(format!("{:?}", e)))?;
        let prediction = parsed
            .constants
            .propagate(minutes)
            .map_err(|e| integration(format!("{:?}", e)))?;

        let gmst = sgp4::iau_epoch_to_sidereal_time(sgp4::julian_years_since_j2000(&naive));
        let ecef = teme_to_ecef(prediction.position, gmst);
        let (lat, lon, altitude_km) =
            ecef_to_geodetic(ecef).ok_or_else(|| PropagationError::Geodetic {
                norad_id: tle.norad_id.to_string(),
            })?;

        Ok(SubSatellitePoint {
            lat,
            lon,
            altitude_km,
        })
    }
}

/// Rotate a TEME position into the Earth-fixed frame by the sidereal angle.
fn teme_to_ecef(position: [f64; 3], gmst_rad: f64) -> [f64; 3] {
    let (sin_t, cos_t) = gmst_rad.sin_cos();
    [
        cos_t * position[0] + sin_t * position[1],
        -sin_t * position[0] + cos_t * position[1],
        position[2],
    ]
}

/// Bowring's closed form ECEF to WGS-84 geodetic conversion (degrees, km).
fn ecef_to_geodetic(position: [f64; 3]) -> Option<(f64, f64, f64)> {
    let [x, y, z] = position;
    if !(x.is_finite() && y.is_finite() && z.is_finite()) {
        return None;
    }
    let a = WGS84_A_KM;
    let b = a * (1.0 - WGS84_F);
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let ep2 = (a * a - b * b) / (b * b);
    let p = (x * x + y * y).sqrt();
    if p < 1e-8 {
        return None;
    }

    let theta = (z * a).atan2(p * b);
    let (sin_theta, cos_theta) = theta.sin_cos();
    let lat = (z + ep2 * b * sin_theta.powi(3)).atan2(p - e2 * a * cos_theta.powi(3));
    let lon = y.atan2(x);
    let sin_lat = lat.sin();
    let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let alt = p / lat.cos() - n;
    Some((lat.to_degrees(), lon.to_degrees(), alt))
}
