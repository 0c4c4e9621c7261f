//! Satellite catalogue repository trait.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{NoradId, Satellite};

/// Repository trait for satellite metadata.
///
/// Satellites are keyed by NORAD ID; writes are idempotent upserts.
#[async_trait]
pub trait SatelliteRepository: Send + Sync {
    /// Insert or replace satellites by NORAD ID.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of records written
    async fn upsert_satellites(&self, satellites: &[Satellite]) -> RepositoryResult<usize>;

    async fn find_satellite(&self, norad_id: &NoradId) -> RepositoryResult<Option<Satellite>>;

    async fn find_all_satellites(&self) -> RepositoryResult<Vec<Satellite>>;

    /// Satellites tagged with `category`, at most `limit` when given.
    async fn find_satellites_by_category(
        &self,
        category: &str,
        limit: Option<usize>,
    ) -> RepositoryResult<Vec<Satellite>>;

    /// Fetch several satellites at once; unknown IDs are silently absent.
    async fn find_satellites_by_ids(&self, ids: &[NoradId]) -> RepositoryResult<Vec<Satellite>>;
}
