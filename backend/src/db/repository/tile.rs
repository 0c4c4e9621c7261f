//! Tile repository trait, including the spatial queries.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{BoundingBox, Tile, TileId};

/// Repository trait for the static tile grid.
#[async_trait]
pub trait TileRepository: Send + Sync {
    /// Insert or replace tiles by quadkey.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of tiles written
    async fn upsert_tiles(&self, tiles: Vec<Tile>) -> RepositoryResult<usize>;

    async fn find_tile(&self, id: &TileId) -> RepositoryResult<Option<Tile>>;

    async fn find_all_tiles(&self) -> RepositoryResult<Vec<Tile>>;

    /// Tiles whose centre lies inside `bbox`.
    async fn find_tiles_in_region(&self, bbox: BoundingBox) -> RepositoryResult<Vec<Tile>>;

    /// Tiles whose circle overlaps the circle of `radius_m` around `(lat, lon)`.
    async fn find_tiles_intersecting_location(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
    ) -> RepositoryResult<Vec<Tile>>;

    /// Delete a tile and, by cascade, its mappings.
    async fn delete_tile(&self, id: &TileId) -> RepositoryResult<bool>;
}
