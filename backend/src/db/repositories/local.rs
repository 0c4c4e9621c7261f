//! In-memory local repository implementation.
//!
//! This module provides a local implementation of all repository traits
//! suitable for unit testing, local development and the standalone worker.
//! All data lives in memory behind a single lock, so execution is fast,
//! deterministic and isolated per instance.
//!
//! Besides the storage contract it exposes test hooks: read/write counters,
//! a log of persisted batch sizes, a health switch and a write-failure switch
//! for the mapping sink.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::algorithms::geodesy::haversine_distance_km;
use crate::db::repository::*;
use crate::models::{BoundingBox, NoradId, Satellite, Tile, TileId, TileSatelliteMapping, Tle};

/// In-memory local repository.
///
/// Cloning is cheap and clones share the same data, which lets a test keep a
/// handle for inspection while the code under test owns another.
///
/// # Example
/// ```
/// use satvis_rust::db::repositories::LocalRepository;
///
/// let repo = LocalRepository::new();
/// let handle = repo.clone();
/// repo.set_fail_mapping_writes(true);
/// assert_eq!(handle.mapping_count(), 0);
/// assert!(handle.mapping_batch_sizes().is_empty());
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct LocalData {
    satellites: HashMap<NoradId, Satellite>,
    tles: HashMap<NoradId, Tle>,
    tiles: HashMap<TileId, Tile>,
    mappings: Vec<TileSatelliteMapping>,

    // Instrumentation
    tle_reads: usize,
    tle_writes: usize,
    mapping_batches: Vec<usize>,

    // Failure injection
    is_healthy: bool,
    fail_mapping_writes: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            satellites: HashMap::new(),
            tles: HashMap::new(),
            tiles: HashMap::new(),
            mappings: Vec::new(),
            tle_reads: 0,
            tle_writes: 0,
            mapping_batches: Vec::new(),
            is_healthy: true,
            fail_mapping_writes: false,
        }
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Make every subsequent `save_mappings` call fail.
    pub fn set_fail_mapping_writes(&self, fail: bool) {
        self.data.write().fail_mapping_writes = fail;
    }

    /// Clear all data from the repository, keeping the failure switches.
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = LocalData {
            is_healthy: data.is_healthy,
            fail_mapping_writes: data.fail_mapping_writes,
            ..Default::default()
        };
    }

    /// Number of TLE lookups served so far (`find_tle` and `find_all_tles`).
    pub fn tle_read_count(&self) -> usize {
        self.data.read().tle_reads
    }

    /// Number of TLE writes served so far (`insert_tle` and `upsert_tle`).
    pub fn tle_write_count(&self) -> usize {
        self.data.read().tle_writes
    }

    /// Sizes of every `save_mappings` call, failed ones included, in call order.
    pub fn mapping_batch_sizes(&self) -> Vec<usize> {
        self.data.read().mapping_batches.clone()
    }

    pub fn mapping_count(&self) -> usize {
        self.data.read().mappings.len()
    }

    pub fn tile_count(&self) -> usize {
        self.data.read().tiles.len()
    }

    /// Helper to check health and return error if unhealthy.
    fn check_health(&self, operation: &str) -> RepositoryResult<()> {
        if !self.data.read().is_healthy {
            return Err(RepositoryError::connection("Local store is not healthy")
                .with_operation(operation));
        }
        Ok(())
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SatelliteRepository for LocalRepository {
    async fn upsert_satellites(&self, satellites: &[Satellite]) -> RepositoryResult<usize> {
        self.check_health("upsert_satellites")?;
        let mut data = self.data.write();
        for sat in satellites {
            if sat.norad_id.is_blank() {
                return Err(RepositoryError::validation("Satellite without NORAD ID")
                    .with_operation("upsert_satellites"));
            }
            data.satellites.insert(sat.norad_id.clone(), sat.clone());
        }
        Ok(satellites.len())
    }

    async fn find_satellite(&self, norad_id: &NoradId) -> RepositoryResult<Option<Satellite>> {
        self.check_health("find_satellite")?;
        Ok(self.data.read().satellites.get(norad_id).cloned())
    }

    async fn find_all_satellites(&self) -> RepositoryResult<Vec<Satellite>> {
        self.check_health("find_all_satellites")?;
        let mut satellites: Vec<Satellite> = self.data.read().satellites.values().cloned().collect();
        satellites.sort_by(|a, b| a.norad_id.cmp(&b.norad_id));
        Ok(satellites)
    }

    async fn find_satellites_by_category(
        &self,
        category: &str,
        limit: Option<usize>,
    ) -> RepositoryResult<Vec<Satellite>> {
        let mut satellites: Vec<Satellite> = self
            .find_all_satellites()
            .await?
            .into_iter()
            .filter(|s| s.category.as_deref() == Some(category))
            .collect();
        if let Some(limit) = limit {
            satellites.truncate(limit);
        }
        Ok(satellites)
    }

    async fn find_satellites_by_ids(&self, ids: &[NoradId]) -> RepositoryResult<Vec<Satellite>> {
        self.check_health("find_satellites_by_ids")?;
        let data = self.data.read();
        Ok(ids
            .iter()
            .filter_map(|id| data.satellites.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl TleRepository for LocalRepository {
    async fn find_tle(&self, norad_id: &NoradId) -> RepositoryResult<Option<Tle>> {
        self.check_health("find_tle")?;
        let mut data = self.data.write();
        data.tle_reads += 1;
        Ok(data.tles.get(norad_id).cloned())
    }

    async fn insert_tle(&self, tle: &Tle) -> RepositoryResult<()> {
        self.check_health("insert_tle")?;
        let mut data = self.data.write();
        if data.tles.contains_key(&tle.norad_id) {
            return Err(RepositoryError::query_with_context(
                "TLE already exists",
                ErrorContext::new("insert_tle")
                    .with_entity("tle")
                    .with_entity_id(&tle.norad_id),
            ));
        }
        data.tle_writes += 1;
        data.tles.insert(tle.norad_id.clone(), tle.clone());
        Ok(())
    }

    async fn upsert_tle(&self, tle: &Tle) -> RepositoryResult<bool> {
        self.check_health("upsert_tle")?;
        let mut data = self.data.write();
        data.tle_writes += 1;
        let newer = data
            .tles
            .get(&tle.norad_id)
            .map_or(true, |existing| existing.epoch < tle.epoch);
        if newer {
            data.tles.insert(tle.norad_id.clone(), tle.clone());
        }
        Ok(newer)
    }

    async fn delete_tle(&self, norad_id: &NoradId) -> RepositoryResult<bool> {
        self.check_health("delete_tle")?;
        Ok(self.data.write().tles.remove(norad_id).is_some())
    }

    async fn find_all_tles(&self) -> RepositoryResult<Vec<Tle>> {
        self.check_health("find_all_tles")?;
        let mut data = self.data.write();
        data.tle_reads += 1;
        Ok(data.tles.values().cloned().collect())
    }
}

#[async_trait]
impl TileRepository for LocalRepository {
    async fn upsert_tiles(&self, tiles: Vec<Tile>) -> RepositoryResult<usize> {
        self.check_health("upsert_tiles")?;
        let count = tiles.len();
        let mut data = self.data.write();
        for tile in tiles {
            data.tiles.insert(tile.quadkey.clone(), tile);
        }
        Ok(count)
    }

    async fn find_tile(&self, id: &TileId) -> RepositoryResult<Option<Tile>> {
        self.check_health("find_tile")?;
        Ok(self.data.read().tiles.get(id).cloned())
    }

    async fn find_all_tiles(&self) -> RepositoryResult<Vec<Tile>> {
        self.check_health("find_all_tiles")?;
        let mut tiles: Vec<Tile> = self.data.read().tiles.values().cloned().collect();
        tiles.sort_by(|a, b| a.quadkey.cmp(&b.quadkey));
        Ok(tiles)
    }

    async fn find_tiles_in_region(&self, bbox: BoundingBox) -> RepositoryResult<Vec<Tile>> {
        self.check_health("find_tiles_in_region")?;
        Ok(self
            .data
            .read()
            .tiles
            .values()
            .filter(|t| bbox.contains(t.center()))
            .cloned()
            .collect())
    }

    async fn find_tiles_intersecting_location(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
    ) -> RepositoryResult<Vec<Tile>> {
        self.check_health("find_tiles_intersecting_location")?;
        let search_km = radius_m / 1000.0;
        Ok(self
            .data
            .read()
            .tiles
            .values()
            .filter(|t| {
                haversine_distance_km(lat, lon, t.center_lat, t.center_lon)
                    <= t.radius_km() + search_km
            })
            .cloned()
            .collect())
    }

    async fn delete_tile(&self, id: &TileId) -> RepositoryResult<bool> {
        self.check_health("delete_tile")?;
        let mut data = self.data.write();
        let existed = data.tiles.remove(id).is_some();
        if existed {
            data.mappings.retain(|m| &m.tile_id != id);
        }
        Ok(existed)
    }
}

#[async_trait]
impl MappingRepository for LocalRepository {
    async fn save_mappings(&self, batch: &[TileSatelliteMapping]) -> RepositoryResult<usize> {
        self.check_health("save_mappings")?;
        let mut data = self.data.write();
        data.mapping_batches.push(batch.len());
        if data.fail_mapping_writes {
            return Err(RepositoryError::query_with_context(
                "Mapping writes are disabled",
                ErrorContext::new("save_mappings")
                    .with_entity("mapping")
                    .with_details(format!("batch_size={}", batch.len())),
            ));
        }
        data.mappings.extend_from_slice(batch);
        Ok(batch.len())
    }

    async fn find_satellites_for_tiles(
        &self,
        tile_ids: &[TileId],
    ) -> RepositoryResult<Vec<NoradId>> {
        self.check_health("find_satellites_for_tiles")?;
        let wanted: BTreeSet<&TileId> = tile_ids.iter().collect();
        let data = self.data.read();
        let ids: BTreeSet<NoradId> = data
            .mappings
            .iter()
            .filter(|m| wanted.contains(&m.tile_id))
            .map(|m| m.norad_id.clone())
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn find_mappings_for_satellite(
        &self,
        norad_id: &NoradId,
    ) -> RepositoryResult<Vec<TileSatelliteMapping>> {
        self.check_health("find_mappings_for_satellite")?;
        Ok(self
            .data
            .read()
            .mappings
            .iter()
            .filter(|m| &m.norad_id == norad_id)
            .cloned()
            .collect())
    }

    async fn delete_mappings_for_satellite(&self, norad_id: &NoradId) -> RepositoryResult<usize> {
        self.check_health("delete_mappings_for_satellite")?;
        let mut data = self.data.write();
        let before = data.mappings.len();
        data.mappings.retain(|m| &m.norad_id != norad_id);
        Ok(before - data.mappings.len())
    }
}

#[async_trait]
impl FullRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }
}
