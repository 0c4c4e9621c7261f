//! TLE catalogue source.
//!
//! [`CelestrakClient`] downloads a CelesTrak group in three-line format; the
//! parsing is a pure function so it can be tested without the network.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::algorithms::geodesy::{EARTH_GM, EARTH_RADIUS_M};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Satellite, Tle};

pub const DEFAULT_CELESTRAK_URL: &str = "https://celestrak.org/NORAD/elements/gp.php";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SECONDS_PER_DAY: f64 = 86_400.0;

/// One catalogue object: display name and current elements.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueEntry {
    pub name: String,
    pub tle: Tle,
}

impl CatalogueEntry {
    /// Satellite record derived from the entry, orbital figures read from line 2.
    pub fn to_satellite(&self, category: &str) -> Satellite {
        let mut satellite =
            Satellite::new(self.tle.norad_id.clone(), self.name.clone()).with_category(category);
        let line2 = self.tle.line2.as_str();

        satellite.inclination_deg = field(line2, 8, 16);
        let eccentricity = line2
            .get(26..33)
            .and_then(|s| format!("0.{}", s.trim()).parse::<f64>().ok());
        let mean_motion = field(line2, 52, 63).filter(|n| *n > 0.0);

        if let Some(revs_per_day) = mean_motion {
            satellite.period_minutes = Some(1440.0 / revs_per_day);
            let n = revs_per_day * std::f64::consts::TAU / SECONDS_PER_DAY;
            let semi_major_m = (EARTH_GM / (n * n)).cbrt();
            if let Some(e) = eccentricity {
                satellite.apogee_km = Some((semi_major_m * (1.0 + e) - EARTH_RADIUS_M) / 1000.0);
                satellite.perigee_km = Some((semi_major_m * (1.0 - e) - EARTH_RADIUS_M) / 1000.0);
            }
        }
        satellite
    }
}

fn field(line: &str, from: usize, to: usize) -> Option<f64> {
    line.get(from..to.min(line.len()))
        .and_then(|s| s.trim().parse().ok())
}

#[async_trait]
pub trait CatalogueClient: Send + Sync {
    /// Current elements of every object in a catalogue group.
    async fn fetch_category(&self, category: &str) -> ServiceResult<Vec<CatalogueEntry>>;
}

pub struct CelestrakClient {
    http: reqwest::Client,
    base_url: String,
}

impl CelestrakClient {
    pub fn new(base_url: impl Into<String>) -> ServiceResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("satvis-rust/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn group_url(&self, category: &str) -> ServiceResult<reqwest::Url> {
        reqwest::Url::parse_with_params(&self.base_url, &[("GROUP", category), ("FORMAT", "TLE")])
            .map_err(|e| {
                ServiceError::configuration(format!("Invalid catalogue URL {}: {}", self.base_url, e))
            })
    }
}

#[async_trait]
impl CatalogueClient for CelestrakClient {
    async fn fetch_category(&self, category: &str) -> ServiceResult<Vec<CatalogueEntry>> {
        let url = self.group_url(category)?;
        debug!("Fetching catalogue group {} from {}", category, url);

        let response = self
            .http
            .get(url.clone())
            .header("accept", "text/plain")
            .send()
            .await
            .map_err(|e| ServiceError::Catalogue(format!("request to {} failed: {}", url, e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Catalogue(format!("reading {} failed: {}", url, e)))?;
        if !status.is_success() {
            return Err(ServiceError::Catalogue(format!("HTTP {} for {}", status, url)));
        }

        let entries = parse_three_line_elements(&body);
        info!("Catalogue group {} returned {} objects", category, entries.len());
        Ok(entries)
    }
}

/// Parse a 3LE (or bare 2LE) listing.
///
/// Name lines are optional; an element pair without one is named after its
/// NORAD ID. Malformed pairs are logged and skipped.
pub fn parse_three_line_elements(body: &str) -> Vec<CatalogueEntry> {
    let lines: Vec<&str> = body
        .lines()
        .map(|l| l.trim_matches(|c: char| c == '\u{feff}' || c.is_whitespace()))
        .filter(|l| !l.is_empty())
        .collect();

    let mut entries = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let (name, first) = if lines[i].starts_with("1 ") {
            (None, i)
        } else {
            (Some(lines[i]), i + 1)
        };

        match (lines.get(first), lines.get(first + 1)) {
            (Some(l1), Some(l2)) if l1.starts_with("1 ") && l2.starts_with("2 ") => {
                match Tle::from_lines(l1, l2) {
                    Ok(tle) => entries.push(CatalogueEntry {
                        name: name.map_or_else(|| tle.norad_id.to_string(), str::to_string),
                        tle,
                    }),
                    Err(e) => warn!("Skipping catalogue entry {:?}: {}", name, e),
                }
                i = first + 2;
            }
            _ => {
                debug!("Skipping stray catalogue line {:?}", lines[i]);
                i += 1;
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISS_L1: &str = "1 25544U 98067A   20344.54791435  .00001234  00000-0  29746-4 0  9993";
    const ISS_L2: &str = "2 25544  51.6456 212.9669 0001235 341.2074 106.3520 15.48921140255673";

    #[test]
    fn test_parse_named_and_bare_entries() {
        let body = format!(
            "ISS (ZARYA)             \r\n{}\r\n{}\r\n\n{}\n{}\ngarbage\n",
            ISS_L1, ISS_L2, ISS_L1, ISS_L2
        );
        let entries = parse_three_line_elements(&body);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "ISS (ZARYA)");
        assert_eq!(entries[0].tle.norad_id.as_str(), "25544");
        assert_eq!(entries[1].name, "25544");
    }

    #[test]
    fn test_orbit_figures_from_line_two() {
        let entry = parse_three_line_elements(&format!("ISS\n{}\n{}", ISS_L1, ISS_L2)).remove(0);
        let sat = entry.to_satellite("stations");
        assert_eq!(sat.category.as_deref(), Some("stations"));
        assert!((sat.inclination_deg.unwrap() - 51.6456).abs() < 1e-9);
        assert!((sat.period_minutes.unwrap() - 92.97).abs() < 0.01);
        let perigee = sat.perigee_km.unwrap();
        assert!(perigee > 380.0 && perigee < 440.0, "perigee {}", perigee);
    }

    #[test]
    fn test_group_url_carries_query() {
        let client = CelestrakClient::new(DEFAULT_CELESTRAK_URL).unwrap();
        let url = client.group_url("stations").unwrap();
        assert_eq!(
            url.as_str(),
            "https://celestrak.org/NORAD/elements/gp.php?GROUP=stations&FORMAT=TLE"
        );
    }
}
