use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tle::NoradId;

/// Descriptive metadata of a tracked object, upserted by NORAD ID.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Satellite {
    pub norad_id: NoradId,
    pub name: String,
    pub object_type: Option<String>,
    pub category: Option<String>,
    pub launch_date: Option<DateTime<Utc>>,
    pub decay_date: Option<DateTime<Utc>>,
    pub period_minutes: Option<f64>,
    pub inclination_deg: Option<f64>,
    pub apogee_km: Option<f64>,
    pub perigee_km: Option<f64>,
}

impl Satellite {
    pub fn new(norad_id: impl Into<NoradId>, name: impl Into<String>) -> Self {
        Self {
            norad_id: norad_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn is_decayed(&self, at: DateTime<Utc>) -> bool {
        self.decay_date.is_some_and(|d| d <= at)
    }
}
