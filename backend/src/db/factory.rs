//! Repository factory for dependency injection.
//!
//! This module maps runtime configuration to a concrete repository instance.
//! Only the in-memory backend ships with the crate; other backends plug in by
//! implementing [`FullRepository`] and adding a [`RepositoryType`] variant.

use std::str::FromStr;
use std::sync::Arc;

use super::repositories::LocalRepository;
use super::repository::{FullRepository, RepositoryError, RepositoryResult};

/// Repository type configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepositoryType {
    /// In-memory local repository
    #[default]
    Local,
}

impl FromStr for RepositoryType {
    type Err = String;

    /// Parse repository type from string.
    ///
    /// # Arguments
    /// * `s` - String representation ("local", "memory")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "memory" | "in-memory" => Ok(Self::Local),
            _ => Err(format!("Unknown repository type: {}", s)),
        }
    }
}

impl RepositoryType {
    /// Get repository type from the `SATVIS_REPOSITORY_TYPE` environment variable.
    ///
    /// Unset or unparseable values fall back to Local.
    pub fn from_env() -> Self {
        std::env::var("SATVIS_REPOSITORY_TYPE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

/// Repository factory for creating repository instances.
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Create a repository instance based on type.
    pub fn create(repo_type: RepositoryType) -> Arc<dyn FullRepository> {
        match repo_type {
            RepositoryType::Local => Self::create_local(),
        }
    }

    /// Create a repository from its configured name.
    ///
    /// # Returns
    /// * `Ok(Arc<dyn FullRepository>)` - Repository instance
    /// * `Err(RepositoryError::ConfigurationError)` - Unknown repository type
    pub fn from_type_name(name: &str) -> RepositoryResult<Arc<dyn FullRepository>> {
        let repo_type = RepositoryType::from_str(name).map_err(|e| {
            RepositoryError::configuration(format!("Invalid repository type: {}", e))
        })?;
        Ok(Self::create(repo_type))
    }

    /// Create an in-memory local repository.
    pub fn create_local() -> Arc<dyn FullRepository> {
        Arc::new(LocalRepository::new())
    }
}
