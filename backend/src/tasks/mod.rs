//! Named background tasks.
//!
//! A task is a [`TaskHandler`] registered under the name of its
//! [`TaskDefinition`]. Callers pass a string-keyed argument bag; the registry
//! checks the required keys before the handler runs, handlers parse and
//! validate the values themselves.

pub mod compute_visibilities;
pub mod generate_tiles;
pub mod mapping_horizon;
pub mod registry;
pub mod tle_upload;

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{ServiceError, ServiceResult};

pub use compute_visibilities::ComputeVisibilitiesTask;
pub use generate_tiles::GenerateTilesTask;
pub use mapping_horizon::MappingHorizonTask;
pub use registry::TaskRegistry;
pub use tle_upload::CelestrakTleUploadTask;

/// Argument bag of a task invocation.
pub type TaskArgs = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub required_args: &'static [&'static str],
}

impl TaskDefinition {
    /// Check that every required key is present and non-empty.
    pub fn validate_args(&self, args: &TaskArgs) -> ServiceResult<()> {
        for key in self.required_args {
            required(args, key)?;
        }
        Ok(())
    }
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn definition(&self) -> TaskDefinition;

    /// Run the task to completion or until `cancel` fires.
    ///
    /// # Returns
    /// * `Ok(Value)` - JSON summary recorded as the job result
    async fn run(&self, cancel: CancellationToken, args: &TaskArgs) -> ServiceResult<serde_json::Value>;
}

/// Non-empty value of a required argument.
pub fn required<'a>(args: &'a TaskArgs, key: &str) -> ServiceResult<&'a str> {
    args.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServiceError::validation(format!("missing required argument: {}", key)))
}

pub fn parse_required<T>(args: &TaskArgs, key: &str) -> ServiceResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = required(args, key)?;
    raw.parse()
        .map_err(|e| ServiceError::validation(format!("invalid value for {} ({}): {}", key, raw, e)))
}

/// Parsed optional argument, `None` when absent or empty.
pub fn parse_optional<T>(args: &TaskArgs, key: &str) -> ServiceResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match args.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(_) => parse_required(args, key).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> TaskArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_required_rejects_blank_values() {
        let bag = args(&[("faces", " "), ("radiusInMeter", "500")]);
        assert!(required(&bag, "faces").is_err());
        assert_eq!(required(&bag, "radiusInMeter").unwrap(), "500");
        let err = required(&bag, "category").unwrap_err();
        assert!(err.to_string().contains("missing required argument: category"));
    }

    #[test]
    fn test_parse_values() {
        let bag = args(&[("faces", "6"), ("radiusInMeter", "abc")]);
        assert_eq!(parse_required::<usize>(&bag, "faces").unwrap(), 6);
        assert!(matches!(
            parse_required::<f64>(&bag, "radiusInMeter"),
            Err(ServiceError::Validation(_))
        ));
        assert_eq!(parse_optional::<usize>(&bag, "maxCount").unwrap(), None);
    }
}
