//! Tile/satellite mapping repository trait.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{NoradId, TileId, TileSatelliteMapping};

/// Persistence sink of the mapping pipeline.
///
/// Batches are independent: a failed batch leaves earlier ones in place.
#[async_trait]
pub trait MappingRepository: Send + Sync {
    /// Persist a batch of mappings.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of rows written
    /// * `Err(RepositoryError)` - Nothing from this batch was written
    async fn save_mappings(&self, batch: &[TileSatelliteMapping]) -> RepositoryResult<usize>;

    /// Distinct NORAD IDs with at least one mapping on any of `tile_ids`.
    async fn find_satellites_for_tiles(&self, tile_ids: &[TileId])
        -> RepositoryResult<Vec<NoradId>>;

    async fn find_mappings_for_satellite(
        &self,
        norad_id: &NoradId,
    ) -> RepositoryResult<Vec<TileSatelliteMapping>>;

    /// Drop every mapping of a satellite before it is recomputed.
    async fn delete_mappings_for_satellite(&self, norad_id: &NoradId) -> RepositoryResult<usize>;
}
