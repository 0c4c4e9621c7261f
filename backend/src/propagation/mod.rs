//! Orbit propagation adapter.
//!
//! The numerical integrator is hidden behind [`OrbitPropagator`]; the rest of
//! the crate only sees sub-satellite points. [`Sgp4Propagator`] is the
//! production implementation, tests inject deterministic ground tracks.

pub mod horizon;
pub mod sgp4_propagator;

use chrono::{DateTime, Utc};

use crate::models::{SubSatellitePoint, Tle};

pub use horizon::{compute_horizon_region, optimal_time_step, HORIZON_VERTICES};
pub use sgp4_propagator::Sgp4Propagator;

/// Failure of the integrator at one instant. Callers skip the instant.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PropagationError {
    #[error("Invalid orbital elements for {norad_id}: {message}")]
    InvalidElements { norad_id: String, message: String },

    #[error("Propagation of {norad_id} failed at {at}: {message}")]
    Integration {
        norad_id: String,
        at: DateTime<Utc>,
        message: String,
    },

    #[error("Could not convert position of {norad_id} to geodetic coordinates")]
    Geodetic { norad_id: String },
}

/// Sub-satellite position of a TLE at a civil instant.
pub trait OrbitPropagator: Send + Sync {
    /// Propagate `tle` to `at`.
    ///
    /// # Returns
    /// * `Ok(SubSatellitePoint)` - geodetic latitude/longitude (degrees) and altitude (km)
    /// * `Err(PropagationError)` - integrator failure, recoverable by the caller
    fn propagate(&self, tle: &Tle, at: DateTime<Utc>) -> Result<SubSatellitePoint, PropagationError>;
}
