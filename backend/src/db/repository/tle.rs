//! TLE repository trait.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{NoradId, Tle};

/// Durable storage of the latest orbital elements per satellite.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait TleRepository: Send + Sync {
    /// Latest TLE of a satellite, `Ok(None)` when unknown.
    async fn find_tle(&self, norad_id: &NoradId) -> RepositoryResult<Option<Tle>>;

    /// Insert a TLE; fails if one already exists for the NORAD ID.
    async fn insert_tle(&self, tle: &Tle) -> RepositoryResult<()>;

    /// Insert or replace the TLE of a satellite.
    ///
    /// An older epoch never replaces a newer one.
    ///
    /// # Returns
    /// * `Ok(true)` - The stored TLE changed
    /// * `Ok(false)` - The stored TLE is already as recent
    async fn upsert_tle(&self, tle: &Tle) -> RepositoryResult<bool>;

    /// # Returns
    /// * `Ok(true)` - A TLE was deleted
    async fn delete_tle(&self, norad_id: &NoradId) -> RepositoryResult<bool>;

    async fn find_all_tles(&self) -> RepositoryResult<Vec<Tle>>;
}
