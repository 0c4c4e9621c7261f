//! Wire types of the real-time visibility channel.
//!
//! Field names follow the camelCase JSON used on the message bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geo::LatLong;
use super::tle::NoradId;
use crate::error::{ServiceError, ServiceResult};

/// Location update published by a client on the request channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityRequest {
    pub uid: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Search radius around the location, in meters.
    pub radius: f64,
    #[serde(default)]
    pub horizon: Option<f64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl VisibilityRequest {
    pub fn location(&self) -> LatLong {
        LatLong::new(self.latitude, self.longitude)
    }

    pub fn validate(&self) -> ServiceResult<()> {
        if self.uid.trim().is_empty() {
            return Err(ServiceError::validation("Request uid is empty"));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ServiceError::validation(format!(
                "Latitude {} out of range [-90, 90]",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ServiceError::validation(format!(
                "Longitude {} out of range [-180, 180]",
                self.longitude
            )));
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(ServiceError::validation(format!(
                "Radius must be positive, got {}",
                self.radius
            )));
        }
        if self.end_time < self.start_time {
            return Err(ServiceError::validation("Request endTime is before startTime"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    pub horizon: f64,
    pub uid: String,
}

/// One satellite visible from the requester's location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityRecord {
    #[serde(rename = "satelliteID")]
    pub satellite_id: NoradId,
    pub satellite_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub tle_line1: String,
    pub tle_line2: String,
    pub user_location: UserLocation,
    #[serde(rename = "userUID")]
    pub user_uid: String,
}
