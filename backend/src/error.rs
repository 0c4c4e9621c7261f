//! Service-level error taxonomy.
//!
//! Every core component reports failures through [`ServiceError`]. The variants
//! follow how callers are expected to react:
//!
//! | Variant          | Reaction                                                      |
//! |------------------|---------------------------------------------------------------|
//! | `Validation`     | surfaced to the caller, never retried                         |
//! | `Propagation`    | recoverable, skip the instant and keep scanning               |
//! | `NotFound`       | recoverable per satellite in batch runs, hard for lookups     |
//! | `Persistence`    | logged, the run continues, no retry in the same invocation    |
//! | `Cache`          | logged only, the durable store stays the source of truth      |
//! | `Configuration`  | aborts before any work starts                                 |
//! | `Catalogue`      | the ingestion task fails, stored TLEs stay untouched          |

use crate::cache::CacheError;
use crate::db::repository::RepositoryError;
use crate::propagation::PropagationError;

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Propagation(#[from] PropagationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The TLE catalogue could not be fetched or read.
    #[error("Catalogue error: {0}")]
    Catalogue(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether the failure only affects the current record and the
    /// surrounding run may continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Propagation(_) | Self::NotFound(_) | Self::Persistence(_) | Self::Cache(_)
        )
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { message, .. } => ServiceError::NotFound(message),
            RepositoryError::ValidationError { message, .. } => ServiceError::Validation(message),
            RepositoryError::ConfigurationError { message, .. } => {
                ServiceError::Configuration(message)
            }
            other => ServiceError::Persistence(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_not_found_maps_to_not_found() {
        let err: ServiceError = RepositoryError::not_found("tle 25544").into();
        assert!(matches!(err, ServiceError::NotFound(ref m) if m == "tle 25544"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_repository_query_error_maps_to_persistence() {
        let err: ServiceError = RepositoryError::query("insert failed").into();
        assert!(matches!(err, ServiceError::Persistence(_)));
    }

    #[test]
    fn test_validation_is_not_recoverable() {
        assert!(!ServiceError::validation("radius must be positive").is_recoverable());
        assert!(!ServiceError::configuration("bad").is_recoverable());
    }
}
