//! Worker configuration file support.
//!
//! Configuration is read from a TOML file and then overridden from the
//! environment. Every setting has a default, so an empty file (or no file
//! at all, see [`AppConfig::load`]) yields a working in-memory setup.
//!
//! ```toml
//! [repository]
//! type = "local"
//!
//! [cache]
//! tle_ttl_hours = 168
//!
//! [pipeline]
//! max_concurrency = 4
//! batch_size = 100
//!
//! [grid]
//! workers = 4
//! max_zoom = 10
//!
//! [realtime]
//! max_in_flight = 16
//!
//! [catalogue]
//! base_url = "https://celestrak.org/NORAD/elements/gp.php"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::algorithms::tile_grid::{DEFAULT_GRID_WORKERS, DEFAULT_MAX_GRID_ZOOM, MAX_GRID_ZOOM};
use crate::db::RepositoryType;
use crate::error::{ServiceError, ServiceResult};
use crate::services::catalogue::DEFAULT_CELESTRAK_URL;
use crate::services::mapping_pipeline::PipelineConfig;
use crate::services::realtime_visibility::DEFAULT_MAX_IN_FLIGHT;

pub const CONFIG_FILE_NAME: &str = "satvis.toml";

const ENV_CACHE_TTL_HOURS: &str = "SATVIS_CACHE_TTL_HOURS";
const ENV_MAX_CONCURRENCY: &str = "SATVIS_MAX_CONCURRENCY";
const ENV_BATCH_SIZE: &str = "SATVIS_BATCH_SIZE";
const ENV_GRID_WORKERS: &str = "SATVIS_GRID_WORKERS";
const ENV_CELESTRAK_URL: &str = "SATVIS_CELESTRAK_URL";
const ENV_REALTIME_MAX_IN_FLIGHT: &str = "SATVIS_REALTIME_MAX_IN_FLIGHT";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub repository: RepositorySettings,
    pub cache: CacheSettings,
    pub pipeline: PipelineConfig,
    pub grid: GridSettings,
    pub realtime: RealtimeSettings,
    pub catalogue: CatalogueSettings,
}

/// Repository type settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySettings {
    #[serde(rename = "type")]
    pub repo_type: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            repo_type: "local".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Lifetime of cached TLE entries.
    pub tle_ttl_hours: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { tle_ttl_hours: 168 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub workers: usize,
    /// Zoom levels above this are refused by the grid generator.
    pub max_zoom: u8,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_GRID_WORKERS,
            max_zoom: DEFAULT_MAX_GRID_ZOOM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    /// Visibility requests answered concurrently by the listener.
    pub max_in_flight: usize,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogueSettings {
    pub base_url: String,
}

impl Default for CatalogueSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CELESTRAK_URL.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Ok(AppConfig)` if successful
    /// * `Err(ServiceError::Configuration)` if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> ServiceResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ServiceError::configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ServiceResult<Self> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| ServiceError::configuration(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `satvis.toml` in:
    /// 1. Current directory
    /// 2. `backend/` directory
    /// 3. Parent directory
    ///
    /// # Returns
    /// * `Ok(AppConfig)` if found and parsed successfully
    /// * `Err(ServiceError::Configuration)` if no file was found or parsing failed
    pub fn from_default_location() -> ServiceResult<Self> {
        let path = Self::default_file().ok_or_else(|| {
            ServiceError::configuration(format!("No {} found in standard locations", CONFIG_FILE_NAME))
        })?;
        info!("Loading configuration from {}", path.display());
        Self::from_file(&path)
    }

    /// File from the default location when present, defaults otherwise, then
    /// environment overrides.
    pub fn load() -> ServiceResult<Self> {
        let config = if Self::default_file().is_some() {
            Self::from_default_location()?
        } else {
            debug!("No {} found, using defaults", CONFIG_FILE_NAME);
            Self::default()
        };
        config.apply_env_overrides()
    }

    fn default_file() -> Option<PathBuf> {
        [
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from("backend").join(CONFIG_FILE_NAME),
            PathBuf::from("..").join(CONFIG_FILE_NAME),
        ]
        .into_iter()
        .find(|path| path.exists())
    }

    /// Override settings from `SATVIS_*` environment variables.
    ///
    /// Unset variables leave the setting alone; unparseable ones are an error.
    pub fn apply_env_overrides(mut self) -> ServiceResult<Self> {
        if let Some(hours) = env_parse(ENV_CACHE_TTL_HOURS)? {
            self.cache.tle_ttl_hours = hours;
        }
        if let Some(max) = env_parse(ENV_MAX_CONCURRENCY)? {
            self.pipeline.max_concurrency = max;
        }
        if let Some(size) = env_parse(ENV_BATCH_SIZE)? {
            self.pipeline.batch_size = size;
        }
        if let Some(workers) = env_parse(ENV_GRID_WORKERS)? {
            self.grid.workers = workers;
        }
        if let Some(max) = env_parse(ENV_REALTIME_MAX_IN_FLIGHT)? {
            self.realtime.max_in_flight = max;
        }
        if let Some(url) = env_parse::<String>(ENV_CELESTRAK_URL)? {
            self.catalogue.base_url = url;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn repository_type(&self) -> ServiceResult<RepositoryType> {
        RepositoryType::from_str(&self.repository.repo_type)
            .map_err(|e| ServiceError::configuration(format!("Invalid repository type: {}", e)))
    }

    pub fn tle_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache.tle_ttl_hours.saturating_mul(3600))
    }

    fn validate(&self) -> ServiceResult<()> {
        self.repository_type()?;
        if self.cache.tle_ttl_hours == 0 {
            return Err(ServiceError::configuration("cache.tle_ttl_hours must be positive"));
        }
        if self.pipeline.max_concurrency == 0 || self.pipeline.batch_size == 0 {
            return Err(ServiceError::configuration(
                "pipeline.max_concurrency and pipeline.batch_size must be positive",
            ));
        }
        if self.grid.workers == 0 {
            return Err(ServiceError::configuration("grid.workers must be positive"));
        }
        if self.grid.max_zoom > MAX_GRID_ZOOM {
            return Err(ServiceError::configuration(format!(
                "grid.max_zoom must not exceed {}",
                MAX_GRID_ZOOM
            )));
        }
        if self.realtime.max_in_flight == 0 {
            return Err(ServiceError::configuration("realtime.max_in_flight must be positive"));
        }
        if self.catalogue.base_url.trim().is_empty() {
            return Err(ServiceError::configuration("catalogue.base_url must not be empty"));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(name: &str) -> ServiceResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ServiceError::configuration(format!("Invalid {}={}: {}", name, raw, e))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.repository_type().unwrap(), RepositoryType::Local);
        assert_eq!(config.tle_ttl(), std::time::Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.pipeline.batch_size, 100);
        assert_eq!(config.pipeline.max_concurrency, 4);
    }

    #[test]
    fn test_parse_partial_sections() {
        let toml = r#"
[pipeline]
batch_size = 250

[grid]
max_zoom = 8
"#;
        let config = AppConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.pipeline.batch_size, 250);
        assert_eq!(config.pipeline.max_concurrency, 4);
        assert_eq!(config.grid.max_zoom, 8);
        assert_eq!(config.grid.workers, DEFAULT_GRID_WORKERS);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            AppConfig::from_toml_str("[repository]\ntype = \"oracle\"\n"),
            Err(ServiceError::Configuration(_))
        ));
        assert!(AppConfig::from_toml_str("[pipeline]\nbatch_size = 0\n").is_err());
        assert!(AppConfig::from_toml_str("[grid]\nmax_zoom = 30\n").is_err());
        assert!(AppConfig::from_toml_str("[grid]\nmax_zoom = 21\n").is_err());
        assert!(AppConfig::from_toml_str("[grid]\nmax_zoom = 12\n").is_ok());
        assert!(AppConfig::from_toml_str("[realtime]\nmax_in_flight = 0\n").is_err());
        assert!(AppConfig::from_toml_str("[cache]\ntle_ttl_hours = \"soon\"\n").is_err());
    }
}
