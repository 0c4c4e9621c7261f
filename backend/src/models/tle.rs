//! Two-line element sets.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::define_key_type;
use crate::error::{ServiceError, ServiceResult};

define_key_type!(NoradId);

/// Orbital elements of one satellite at a reference epoch.
///
/// A newer epoch supersedes an older set for the same NORAD ID; sets are
/// replaced, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tle {
    pub norad_id: NoradId,
    pub line1: String,
    pub line2: String,
    pub epoch: DateTime<Utc>,
}

impl Tle {
    pub fn new(
        norad_id: impl Into<NoradId>,
        line1: impl Into<String>,
        line2: impl Into<String>,
        epoch: DateTime<Utc>,
    ) -> Self {
        Self {
            norad_id: norad_id.into(),
            line1: line1.into(),
            line2: line2.into(),
            epoch,
        }
    }

    /// Build a TLE from its two lines, reading the NORAD ID (columns 3-7) and
    /// the epoch (columns 19-32) from line 1.
    pub fn from_lines(line1: &str, line2: &str) -> ServiceResult<Self> {
        let line1 = line1.trim_end();
        let line2 = line2.trim_end();
        let norad = line1
            .get(2..7)
            .map(|s| s.trim().trim_start_matches('0'))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServiceError::validation("TLE line 1 has no NORAD ID"))?;
        let epoch = parse_tle_epoch(line1)?;
        let tle = Self::new(norad, line1, line2, epoch);
        tle.validate()?;
        Ok(tle)
    }

    /// Check the invariants every stored TLE must satisfy.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.norad_id.is_blank() {
            return Err(ServiceError::validation("TLE has an empty NORAD ID"));
        }
        if self.line1.trim().is_empty() || self.line2.trim().is_empty() {
            return Err(ServiceError::validation(format!(
                "TLE {} has an empty line",
                self.norad_id
            )));
        }
        if self.epoch == DateTime::<Utc>::UNIX_EPOCH {
            return Err(ServiceError::validation(format!(
                "TLE {} has a zero epoch",
                self.norad_id
            )));
        }
        Ok(())
    }
}

/// Parse the epoch field (`YYDDD.DDDDDDDD`) of TLE line 1.
///
/// Two-digit years from 57 onwards belong to the 1900s.
pub fn parse_tle_epoch(line1: &str) -> ServiceResult<DateTime<Utc>> {
    let field = line1
        .get(18..32)
        .ok_or_else(|| ServiceError::validation("TLE line 1 is too short to hold an epoch"))?
        .trim();

    let invalid = || ServiceError::validation(format!("Invalid TLE epoch field '{}'", field));

    if field.len() < 5 {
        return Err(invalid());
    }
    let (yy, rest) = field.split_at(2);
    let yy: i32 = yy.parse().map_err(|_| invalid())?;
    let day_of_year: f64 = rest.parse().map_err(|_| invalid())?;
    if !(1.0..367.0).contains(&day_of_year) {
        return Err(invalid());
    }

    let year = if yy >= 57 { 1900 + yy } else { 2000 + yy };
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(invalid)?;

    let micros = ((day_of_year - 1.0) * 86_400_000_000.0).round() as i64;
    let naive = jan1
        .checked_add_signed(Duration::microseconds(micros))
        .ok_or_else(invalid)?;
    Ok(naive.and_utc())
}
