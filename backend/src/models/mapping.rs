use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tile::TileId;
use super::tle::NoradId;
use crate::error::{ServiceError, ServiceResult};

/// A closed-open scan interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> ServiceResult<Self> {
        if end < start {
            return Err(ServiceError::validation(format!(
                "Window end {} is before start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Window of `minutes` starting at `start`. Periods beyond the calendar
    /// range are a validation error.
    pub fn starting_at(start: DateTime<Utc>, minutes: i64) -> ServiceResult<Self> {
        let end = Duration::try_minutes(minutes)
            .and_then(|period| start.checked_add_signed(period))
            .ok_or_else(|| {
                ServiceError::validation(format!("A period of {} minutes is out of range", minutes))
            })?;
        Self::new(start, end)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Next sample instant after `t`, never past `end`.
pub fn advance(t: DateTime<Utc>, step: Duration, end: DateTime<Utc>) -> DateTime<Utc> {
    t.checked_add_signed(step).map_or(end, |next| next.min(end))
}

/// One visibility pass of a satellite over a tile.
///
/// `max_elevation` is only set when an AOS was found, and `los` is never
/// before `aos`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileSatelliteMapping {
    pub id: Uuid,
    pub norad_id: NoradId,
    pub tile_id: TileId,
    pub aos: DateTime<Utc>,
    pub los: Option<DateTime<Utc>>,
    pub max_elevation: Option<f64>,
}

impl TileSatelliteMapping {
    pub fn new(
        norad_id: NoradId,
        tile_id: TileId,
        aos: DateTime<Utc>,
        los: Option<DateTime<Utc>>,
        max_elevation: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            norad_id,
            tile_id,
            aos,
            los,
            max_elevation,
        }
    }

    pub fn overlaps(&self, window: &TimeWindow) -> bool {
        let los = self.los.unwrap_or(self.aos);
        self.aos < window.end && los >= window.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_rejects_inverted_bounds() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(TimeWindow::new(start, start - Duration::seconds(1)).is_err());
        assert!(TimeWindow::new(start, start).is_ok());
        assert_eq!(
            TimeWindow::starting_at(start, 90).unwrap().duration(),
            Duration::minutes(90)
        );
    }

    #[test]
    fn test_window_rejects_out_of_range_periods() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            TimeWindow::starting_at(start, i64::MAX),
            Err(ServiceError::Validation(_))
        ));
        assert!(TimeWindow::starting_at(start, 600_000_000_000).is_err());
    }

    #[test]
    fn test_advance_stops_at_end() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = start + Duration::minutes(5);
        assert_eq!(advance(start, Duration::minutes(2), end), start + Duration::minutes(2));
        assert_eq!(advance(start, Duration::minutes(7), end), end);
        assert_eq!(advance(start, Duration::try_days(100_000_000).unwrap(), end), end);
    }

    #[test]
    fn test_mapping_overlaps_window() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mapping = TileSatelliteMapping::new(
            "25544".into(),
            "3-0.000000-0.000000".into(),
            t0 + Duration::minutes(10),
            Some(t0 + Duration::minutes(20)),
            Some(45.0),
        );
        assert!(mapping.overlaps(&TimeWindow::starting_at(t0, 15).unwrap()));
        assert!(!mapping.overlaps(&TimeWindow::starting_at(t0, 5).unwrap()));
    }
}
