//! AOS/LOS search for one satellite over one tile.
//!
//! ```text
//!  SearchingAos ──(in view, elevation > 0)──▶ AosFound ──▶ SearchingLos ──(out of view)──▶ LosFound
//!       │                                                       │
//!       └──────────────(window ends)──────────▶ WindowExhausted ◀┘
//! ```
//!
//! Instants are visited in increasing order. An instant whose propagation
//! fails is logged and skipped, the scan carries on with the next one.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};

use crate::algorithms::geodesy::{elevation_angle_degrees, intersects};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{advance, LatLong, SubSatellitePoint, TimeWindow, Tle};
use crate::propagation::OrbitPropagator;

/// Above this altitude a satellite is treated as permanently in view of a
/// tile once acquired.
pub const ALWAYS_VISIBLE_ALTITUDE_KM: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    SearchingAos,
    AosFound,
    SearchingLos,
    LosFound,
    WindowExhausted,
}

/// Ground target of a scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileTarget {
    pub center: LatLong,
    pub radius_km: f64,
}

impl TileTarget {
    pub fn new(center: LatLong, radius_km: f64) -> Self {
        Self { center, radius_km }
    }
}

/// Result of an AOS search.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VisibilityWindow {
    pub aos: Option<DateTime<Utc>>,
    pub max_elevation: Option<f64>,
}

/// Result of a full AOS then LOS scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassOutcome {
    /// `LosFound`, `WindowExhausted`, or `AosFound` for always-visible satellites.
    pub state: ScanState,
    pub aos: Option<DateTime<Utc>>,
    /// `None` without AOS and for always-visible satellites; the window end
    /// when the satellite is still in view at the end.
    pub los: Option<DateTime<Utc>>,
    /// Highest elevation seen while in view.
    pub max_elevation: Option<f64>,
    pub always_visible: bool,
}

impl PassOutcome {
    fn empty() -> Self {
        Self {
            state: ScanState::WindowExhausted,
            aos: None,
            los: None,
            max_elevation: None,
            always_visible: false,
        }
    }
}

/// Visibility scanner over an injected propagator.
#[derive(Clone)]
pub struct VisibilityEngine {
    propagator: Arc<dyn OrbitPropagator>,
}

impl VisibilityEngine {
    pub fn new(propagator: Arc<dyn OrbitPropagator>) -> Self {
        Self { propagator }
    }

    pub fn propagator(&self) -> &Arc<dyn OrbitPropagator> {
        &self.propagator
    }

    /// Find the first instant of `window` where the satellite is over the tile
    /// and above its horizon.
    ///
    /// # Arguments
    /// * `tle` - Elements of the satellite
    /// * `target` - Tile centre and radius
    /// * `window` - Half-open interval `[start, end)` stepped by `step`
    /// * `step` - Sampling interval, must be positive
    /// * `previous_max` - Running maximum elevation carried by the caller
    ///
    /// # Returns
    /// The AOS and `max(previous_max, elevation at AOS)`. Without AOS the
    /// window has `aos = None` and `previous_max` is returned unchanged.
    pub fn compute_visibility_window(
        &self,
        tle: &Tle,
        target: TileTarget,
        window: &TimeWindow,
        step: Duration,
        previous_max: Option<f64>,
    ) -> ServiceResult<VisibilityWindow> {
        check_step(step)?;
        let mut t = window.start;
        while t < window.end {
            if let Some(point) = self.sample(tle, t) {
                let elevation = elevation_angle_degrees(target.center, point.ground(), point.altitude_km);
                if intersects(target.center, point.ground(), target.radius_km) && elevation > 0.0 {
                    debug!(
                        "AOS of {} over ({:.3}, {:.3}) at {} elevation {:.2}",
                        tle.norad_id, target.center.lat, target.center.lon, t, elevation
                    );
                    return Ok(VisibilityWindow {
                        aos: Some(t),
                        max_elevation: Some(previous_max.map_or(elevation, |m| m.max(elevation))),
                    });
                }
            }
            t = advance(t, step, window.end);
        }
        Ok(VisibilityWindow {
            aos: None,
            max_elevation: previous_max,
        })
    }

    /// Find the loss of signal following `aos`.
    ///
    /// # Returns
    /// * `aos` itself when the satellite flies above [`ALWAYS_VISIBLE_ALTITUDE_KM`]
    /// * the first instant where the sub-satellite point leaves the tile
    /// * `end` when the satellite stays over the tile until the window closes
    pub fn compute_los(
        &self,
        tle: &Tle,
        target: TileTarget,
        aos: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> ServiceResult<DateTime<Utc>> {
        check_step(step)?;
        let mut t = aos;
        while t < end {
            if let Some(point) = self.sample(tle, t) {
                if point.altitude_km > ALWAYS_VISIBLE_ALTITUDE_KM {
                    return Ok(aos);
                }
                if !intersects(target.center, point.ground(), target.radius_km) {
                    return Ok(t);
                }
            }
            t = advance(t, step, end);
        }
        Ok(end)
    }

    /// Scan `window` for one pass: AOS, LOS and the peak elevation in between.
    pub fn scan_pass(
        &self,
        tle: &Tle,
        target: TileTarget,
        window: &TimeWindow,
        step: Duration,
    ) -> ServiceResult<PassOutcome> {
        check_step(step)?;
        let mut outcome = PassOutcome::empty();
        let mut state = ScanState::SearchingAos;
        let mut t = window.start;

        while t < window.end {
            let Some(point) = self.sample(tle, t) else {
                t = advance(t, step, window.end);
                continue;
            };
            let in_view = intersects(target.center, point.ground(), target.radius_km);
            let elevation = elevation_angle_degrees(target.center, point.ground(), point.altitude_km);

            match state {
                ScanState::SearchingAos => {
                    if in_view && elevation > 0.0 {
                        outcome.aos = Some(t);
                        outcome.max_elevation = Some(elevation);
                        state = ScanState::AosFound;
                        if point.altitude_km > ALWAYS_VISIBLE_ALTITUDE_KM {
                            outcome.always_visible = true;
                            break;
                        }
                    }
                }
                ScanState::AosFound | ScanState::SearchingLos => {
                    if point.altitude_km > ALWAYS_VISIBLE_ALTITUDE_KM {
                        outcome.always_visible = true;
                        break;
                    }
                    if !in_view {
                        outcome.los = Some(t);
                        state = ScanState::LosFound;
                        break;
                    }
                    outcome.max_elevation = outcome.max_elevation.map(|m| m.max(elevation));
                    state = ScanState::SearchingLos;
                }
                ScanState::LosFound | ScanState::WindowExhausted => break,
            }
            t = advance(t, step, window.end);
        }

        outcome.state = match state {
            ScanState::SearchingAos => ScanState::WindowExhausted,
            ScanState::AosFound | ScanState::SearchingLos if outcome.always_visible => {
                ScanState::AosFound
            }
            ScanState::AosFound | ScanState::SearchingLos => {
                outcome.los = Some(window.end);
                ScanState::WindowExhausted
            }
            terminal => terminal,
        };
        Ok(outcome)
    }

    fn sample(&self, tle: &Tle, at: DateTime<Utc>) -> Option<SubSatellitePoint> {
        match self.propagator.propagate(tle, at) {
            Ok(point) => Some(point),
            Err(e) => {
                warn!("Skipping {} at {}: {}", tle.norad_id, at, e);
                None
            }
        }
    }
}

fn check_step(step: Duration) -> ServiceResult<()> {
    if step <= Duration::zero() {
        return Err(ServiceError::validation(format!(
            "Scan step must be positive, got {}s",
            step.num_seconds()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::PropagationError;
    use chrono::TimeZone;

    /// Ground track moving east along a parallel at one degree per minute.
    struct EastwardTrack {
        start: DateTime<Utc>,
        lat: f64,
        altitude_km: f64,
        fail_at: Option<DateTime<Utc>>,
    }

    impl OrbitPropagator for EastwardTrack {
        fn propagate(&self, tle: &Tle, at: DateTime<Utc>) -> Result<SubSatellitePoint, PropagationError> {
            if Some(at) == self.fail_at {
                return Err(PropagationError::Geodetic {
                    norad_id: tle.norad_id.to_string(),
                });
            }
            let minutes = (at - self.start).num_seconds() as f64 / 60.0;
            Ok(SubSatellitePoint {
                lat: self.lat,
                lon: -30.0 + minutes,
                altitude_km: self.altitude_km,
            })
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn engine(lat: f64, altitude_km: f64) -> VisibilityEngine {
        VisibilityEngine::new(Arc::new(EastwardTrack {
            start: t0(),
            lat,
            altitude_km,
            fail_at: None,
        }))
    }

    fn tle() -> Tle {
        Tle::new("99999", "1", "2", t0())
    }

    fn hour() -> TimeWindow {
        TimeWindow::new(t0(), t0() + Duration::hours(1)).unwrap()
    }

    #[test]
    fn test_polar_tile_never_sees_equatorial_track() {
        let target = TileTarget::new(LatLong::new(89.0, 0.0), 50.0);
        let window = engine(0.0, 500.0)
            .compute_visibility_window(&tle(), target, &hour(), Duration::seconds(30), Some(-1.0))
            .unwrap();
        assert_eq!(window.aos, None);
        assert_eq!(window.max_elevation, Some(-1.0));
    }

    #[test]
    fn test_aos_on_track_crossing() {
        let target = TileTarget::new(LatLong::new(0.0, 0.0), 300.0);
        let window = engine(0.0, 500.0)
            .compute_visibility_window(&tle(), target, &hour(), Duration::seconds(60), None)
            .unwrap();
        // 300 km is about 2.7 degrees of longitude, reached at minute 28
        assert_eq!(window.aos, Some(t0() + Duration::minutes(28)));
        assert!(window.max_elevation.unwrap() > 0.0);
    }

    #[test]
    fn test_los_and_pass() {
        let eng = engine(0.0, 500.0);
        let target = TileTarget::new(LatLong::new(0.0, 0.0), 300.0);
        let aos = t0() + Duration::minutes(28);
        let los = eng
            .compute_los(&tle(), target, aos, t0() + Duration::hours(1), Duration::seconds(60))
            .unwrap();
        assert_eq!(los, t0() + Duration::minutes(33));

        let pass = eng
            .scan_pass(&tle(), target, &hour(), Duration::seconds(60))
            .unwrap();
        assert_eq!(pass.state, ScanState::LosFound);
        assert_eq!(pass.aos, Some(aos));
        assert_eq!(pass.los, Some(los));
        assert!(pass.max_elevation.unwrap() > 80.0);
    }

    #[test]
    fn test_los_defaults_to_window_end() {
        let target = TileTarget::new(LatLong::new(0.0, 0.0), 20_000.0);
        let end = t0() + Duration::minutes(10);
        let los = engine(0.0, 500.0)
            .compute_los(&tle(), target, t0(), end, Duration::seconds(60))
            .unwrap();
        assert_eq!(los, end);
    }

    #[test]
    fn test_high_orbit_is_always_visible() {
        let target = TileTarget::new(LatLong::new(0.0, -30.0), 5000.0);
        let eng = engine(0.0, 35_786.0);
        let los = eng
            .compute_los(&tle(), target, t0(), t0() + Duration::hours(1), Duration::seconds(60))
            .unwrap();
        assert_eq!(los, t0());

        let pass = eng
            .scan_pass(&tle(), target, &hour(), Duration::seconds(60))
            .unwrap();
        assert!(pass.always_visible);
        assert_eq!(pass.state, ScanState::AosFound);
        assert_eq!(pass.los, None);
    }

    #[test]
    fn test_propagation_failure_is_skipped() {
        let eng = VisibilityEngine::new(Arc::new(EastwardTrack {
            start: t0(),
            lat: 0.0,
            altitude_km: 500.0,
            fail_at: Some(t0() + Duration::minutes(28)),
        }));
        let target = TileTarget::new(LatLong::new(0.0, 0.0), 300.0);
        let window = eng
            .compute_visibility_window(&tle(), target, &hour(), Duration::seconds(60), None)
            .unwrap();
        assert_eq!(window.aos, Some(t0() + Duration::minutes(29)));
    }

    #[test]
    fn test_non_positive_step_is_rejected() {
        let target = TileTarget::new(LatLong::new(0.0, 0.0), 300.0);
        assert!(matches!(
            engine(0.0, 500.0).scan_pass(&tle(), target, &hour(), Duration::zero()),
            Err(ServiceError::Validation(_))
        ));
    }
}
