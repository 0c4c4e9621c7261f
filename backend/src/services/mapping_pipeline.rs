//! Batch computation of tile/satellite mappings.
//!
//! ```text
//!                    ┌──────────── Semaphore(max_concurrency) ────────────┐
//! satellites ──▶ for each id ──▶ TleStore::get ──▶ spawn_blocking(scan) ──┼─▶ mpsc ──▶ MappingBatcher ──▶ MappingRepository
//!                    └────────────────────────────────────────────────────┘   (one batcher per satellite)
//! ```
//!
//! The scan of one satellite walks the window by `horizon_step`. At every
//! step the horizon ring is computed once, tile groups whose latitude band
//! misses the ring are skipped and the remaining tile centres are tested
//! against the ring. Tiles in view go through the [`VisibilityEngine`]; a tile
//! covered by a pass is not scanned again before that pass's LOS.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::tle_store::TleStore;
use super::visibility_engine::{TileTarget, VisibilityEngine};
use crate::db::repository::MappingRepository;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{advance, NoradId, Tile, TileId, TileSatelliteMapping, TimeWindow, Tle};
use crate::propagation::{compute_horizon_region, optimal_time_step};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Half-width of a latitude band, wide enough to absorb rounding of the key.
const LAT_BAND_MARGIN: f64 = 1.0;

/// Sampling step used when scanning a tile in view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStepPolicy {
    Fixed(Duration),
    /// Derived per tile from the satellite altitude, see [`optimal_time_step`].
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Satellites scanned at the same time.
    pub max_concurrency: usize,
    /// Mappings per persisted batch.
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Explicit input set of one run.
#[derive(Debug, Clone)]
pub struct MappingJob {
    pub satellites: Vec<NoradId>,
    pub tiles: Vec<Tile>,
    pub window: TimeWindow,
    /// Interval between horizon evaluations.
    pub horizon_step: Duration,
    pub scan_step: TimeStepPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SatelliteFailure {
    pub norad_id: NoradId,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingRunReport {
    pub satellites_processed: usize,
    pub satellites_skipped: usize,
    pub satellites_failed: usize,
    pub mappings_emitted: usize,
    pub mappings_persisted: usize,
    pub batches_flushed: usize,
    pub batches_failed: usize,
    pub cancelled: bool,
    pub errors: Vec<SatelliteFailure>,
}

impl MappingRunReport {
    fn record(&mut self, outcome: SatelliteOutcome) {
        match outcome {
            SatelliteOutcome::Processed { emitted, stats } => {
                self.satellites_processed += 1;
                self.mappings_emitted += emitted;
                self.add_stats(stats);
            }
            SatelliteOutcome::Skipped { norad_id, message } => {
                self.satellites_skipped += 1;
                self.errors.push(SatelliteFailure { norad_id, message });
            }
            SatelliteOutcome::Failed {
                norad_id,
                message,
                stats,
            } => {
                self.satellites_failed += 1;
                self.add_stats(stats);
                self.errors.push(SatelliteFailure { norad_id, message });
            }
        }
    }

    fn add_stats(&mut self, stats: BatchStats) {
        self.mappings_persisted += stats.persisted;
        self.batches_flushed += stats.flushed;
        self.batches_failed += stats.failed;
    }
}

enum SatelliteOutcome {
    Processed {
        emitted: usize,
        stats: BatchStats,
    },
    Skipped {
        norad_id: NoradId,
        message: String,
    },
    Failed {
        norad_id: NoradId,
        message: String,
        stats: BatchStats,
    },
}

// ==================== Region grouping ====================

/// Group key of a tile: zoom level and latitude rounded to the degree.
pub fn region_key(zoom_level: u8, center_lat: f64) -> String {
    format!("zoom{}_lat{:.0}", zoom_level, center_lat)
}

#[derive(Debug, Clone)]
pub struct RegionGroup {
    pub key: String,
    pub lat_band: f64,
    pub tiles: Vec<Tile>,
}

impl RegionGroup {
    fn overlaps(&self, min_lat: f64, max_lat: f64) -> bool {
        self.lat_band + LAT_BAND_MARGIN >= min_lat && self.lat_band - LAT_BAND_MARGIN <= max_lat
    }
}

/// Tiles bucketed by [`region_key`].
#[derive(Debug, Clone, Default)]
pub struct RegionIndex {
    groups: Vec<RegionGroup>,
}

impl RegionIndex {
    /// Bucket tiles, dropping tiles without a polygon.
    pub fn build(tiles: Vec<Tile>) -> Self {
        let mut groups: BTreeMap<String, RegionGroup> = BTreeMap::new();
        for tile in tiles {
            if tile.vertices.is_empty() {
                warn!("Skipping tile {} without polygon data", tile.quadkey);
                continue;
            }
            let key = region_key(tile.zoom_level, tile.center_lat);
            groups
                .entry(key.clone())
                .or_insert_with(|| RegionGroup {
                    key,
                    lat_band: tile.center_lat.round(),
                    tiles: Vec::new(),
                })
                .tiles
                .push(tile);
        }
        Self {
            groups: groups.into_values().collect(),
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn tile_count(&self) -> usize {
        self.groups.iter().map(|g| g.tiles.len()).sum()
    }

    /// Groups whose band intersects `[min_lat, max_lat]`.
    pub fn candidates(&self, min_lat: f64, max_lat: f64) -> impl Iterator<Item = &RegionGroup> {
        self.groups
            .iter()
            .filter(move |g| g.overlaps(min_lat, max_lat))
    }
}

// ==================== Batching ====================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub flushed: usize,
    pub failed: usize,
    pub persisted: usize,
    /// Mappings lost with failed batches.
    pub dropped: usize,
}

/// Per-worker buffer flushing fixed-size batches to the mapping sink.
///
/// A failed flush is logged and its mappings are dropped, the batcher keeps
/// accepting new mappings.
pub struct MappingBatcher {
    sink: Arc<dyn MappingRepository>,
    batch_size: usize,
    buffer: Vec<TileSatelliteMapping>,
    stats: BatchStats,
}

impl MappingBatcher {
    pub fn new(sink: Arc<dyn MappingRepository>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sink,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            stats: BatchStats::default(),
        }
    }

    pub async fn push(&mut self, mapping: TileSatelliteMapping) {
        self.buffer.push(mapping);
        if self.buffer.len() >= self.batch_size {
            self.flush().await;
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Flush what is left and return the totals.
    pub async fn finish(mut self) -> BatchStats {
        self.flush().await;
        self.stats
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        match self.sink.save_mappings(&batch).await {
            Ok(saved) => {
                self.stats.flushed += 1;
                self.stats.persisted += saved;
                debug!("Flushed batch of {} mappings", saved);
            }
            Err(e) => {
                self.stats.failed += 1;
                self.stats.dropped += batch.len();
                error!("Failed to save batch of {} mappings: {}", batch.len(), e);
            }
        }
    }
}

// ==================== Per-satellite scan ====================

/// CPU-bound scan of one satellite over every tile.
struct SatelliteScan {
    engine: VisibilityEngine,
    tle: Tle,
    index: Arc<RegionIndex>,
    window: TimeWindow,
    horizon_step: Duration,
    scan_step: TimeStepPolicy,
}

impl SatelliteScan {
    /// Walk the window, handing every mapping to `emit`. Stops early when
    /// `emit` returns false. Returns the number of mappings emitted.
    fn run(&self, mut emit: impl FnMut(TileSatelliteMapping) -> bool) -> usize {
        let norad_id = &self.tle.norad_id;
        let mut covered_until: HashMap<TileId, DateTime<Utc>> = HashMap::new();
        let mut emitted = 0;
        let mut t = self.window.start;

        while t < self.window.end {
            let next = advance(t, self.horizon_step, self.window.end);
            let region = match compute_horizon_region(self.engine.propagator().as_ref(), &self.tle, t) {
                Ok(region) => region,
                Err(e) => {
                    warn!("Horizon of {} unavailable at {}: {}", norad_id, t, e);
                    t = next;
                    continue;
                }
            };
            let Some((min_lat, max_lat)) = region.latitude_band() else {
                t = next;
                continue;
            };

            for group in self.index.candidates(min_lat, max_lat) {
                for tile in &group.tiles {
                    if covered_until.get(&tile.quadkey).map_or(false, |until| *until > t) {
                        continue;
                    }
                    if !region.contains(tile.center()) {
                        continue;
                    }

                    let step = match self.scan_step {
                        TimeStepPolicy::Fixed(step) => step,
                        TimeStepPolicy::Dynamic => {
                            optimal_time_step(region.sub_point.altitude_km, tile.radius_m)
                        }
                    };
                    let (until, mapping) = match self.scan_tile(tile, t, next, step) {
                        Ok(result) => result,
                        Err(e) => {
                            warn!("Scan of {} over {} failed: {}", norad_id, tile.quadkey, e);
                            continue;
                        }
                    };
                    covered_until.insert(tile.quadkey.clone(), until);
                    if let Some(mapping) = mapping {
                        emitted += 1;
                        if !emit(mapping) {
                            debug!("Mapping sink closed, stopping scan of {}", norad_id);
                            return emitted;
                        }
                    }
                }
            }
            t = next;
        }
        emitted
    }

    /// Look for an AOS in `[from, until)` and follow the pass to its LOS.
    ///
    /// Returns the instant up to which the tile needs no further scan and the
    /// mapping of the pass, if any.
    fn scan_tile(
        &self,
        tile: &Tile,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        step: Duration,
    ) -> ServiceResult<(DateTime<Utc>, Option<TileSatelliteMapping>)> {
        let target = TileTarget::new(tile.center(), tile.radius_km());
        let search = TimeWindow { start: from, end: until };
        let window = self
            .engine
            .compute_visibility_window(&self.tle, target, &search, step, None)?;
        let Some(aos) = window.aos else {
            return Ok((until, None));
        };

        let pass_window = TimeWindow {
            start: aos,
            end: self.window.end,
        };
        let pass = self.engine.scan_pass(&self.tle, target, &pass_window, step)?;
        let covered = if pass.always_visible {
            self.window.end
        } else {
            pass.los.unwrap_or(self.window.end)
        };
        let mapping = TileSatelliteMapping::new(
            self.tle.norad_id.clone(),
            tile.quadkey.clone(),
            aos,
            pass.los,
            pass.max_elevation.or(window.max_elevation),
        );
        Ok((covered, Some(mapping)))
    }
}

// ==================== Pipeline ====================

/// Unit of work of one satellite, owned by a spawned task.
struct SatelliteUnit {
    norad_id: NoradId,
    engine: VisibilityEngine,
    tle_store: TleStore,
    sink: Arc<dyn MappingRepository>,
    index: Arc<RegionIndex>,
    window: TimeWindow,
    horizon_step: Duration,
    scan_step: TimeStepPolicy,
    batch_size: usize,
}

impl SatelliteUnit {
    async fn run(self) -> SatelliteOutcome {
        let tle = match self.tle_store.get(&self.norad_id).await {
            Ok(tle) => tle,
            Err(e) => {
                warn!("Skipping satellite {}: {}", self.norad_id, e);
                return SatelliteOutcome::Skipped {
                    norad_id: self.norad_id,
                    message: e.to_string(),
                };
            }
        };

        let (tx, mut rx) = mpsc::channel(self.batch_size.max(1));
        let scan = SatelliteScan {
            engine: self.engine,
            tle,
            index: self.index,
            window: self.window,
            horizon_step: self.horizon_step,
            scan_step: self.scan_step,
        };
        let handle = tokio::task::spawn_blocking(move || {
            scan.run(|mapping| tx.blocking_send(mapping).is_ok())
        });

        let mut batcher = MappingBatcher::new(self.sink, self.batch_size);
        while let Some(mapping) = rx.recv().await {
            batcher.push(mapping).await;
        }
        let stats = batcher.finish().await;

        match handle.await {
            Ok(emitted) => {
                debug!(
                    "Satellite {} done: {} mappings, {} persisted",
                    self.norad_id, emitted, stats.persisted
                );
                SatelliteOutcome::Processed { emitted, stats }
            }
            Err(e) => {
                error!("Scan task of {} aborted: {}", self.norad_id, e);
                SatelliteOutcome::Failed {
                    norad_id: self.norad_id,
                    message: format!("scan task aborted: {}", e),
                    stats,
                }
            }
        }
    }
}

/// Bounded, cancellable mapping computation over a satellite set.
#[derive(Clone)]
pub struct MappingPipeline {
    engine: VisibilityEngine,
    tle_store: TleStore,
    sink: Arc<dyn MappingRepository>,
    config: PipelineConfig,
}

impl MappingPipeline {
    pub fn new(
        engine: VisibilityEngine,
        tle_store: TleStore,
        sink: Arc<dyn MappingRepository>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            engine,
            tle_store,
            sink,
            config,
        }
    }

    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Compute and persist the mappings of `job`.
    ///
    /// Cancelling `cancel` stops new satellites from starting; satellites
    /// already running complete and flush their batches.
    ///
    /// # Returns
    /// * `Ok(MappingRunReport)` - per-satellite failures are inside the report
    /// * `Err(ServiceError::Validation)` - the job or configuration is unusable
    pub async fn run(
        &self,
        job: MappingJob,
        cancel: CancellationToken,
    ) -> ServiceResult<MappingRunReport> {
        self.validate(&job)?;

        let index = Arc::new(RegionIndex::build(job.tiles));
        info!(
            "Mapping {} satellites over {} tiles in {} groups, window {} to {}",
            job.satellites.len(),
            index.tile_count(),
            index.group_count(),
            job.window.start,
            job.window.end
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut workers = JoinSet::new();
        let mut report = MappingRunReport::default();

        for norad_id in job.satellites {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Mapping run cancelled, no further satellites started");
                    report.cancelled = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    permit.map_err(|_| ServiceError::Cancelled)?
                }
            };

            let unit = SatelliteUnit {
                norad_id,
                engine: self.engine.clone(),
                tle_store: self.tle_store.clone(),
                sink: Arc::clone(&self.sink),
                index: Arc::clone(&index),
                window: job.window,
                horizon_step: job.horizon_step,
                scan_step: job.scan_step,
                batch_size: self.config.batch_size,
            };
            workers.spawn(async move {
                let _permit = permit;
                unit.run().await
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!("Satellite worker panicked: {}", e);
                    report.satellites_failed += 1;
                }
            }
        }

        info!(
            "Mapping run finished: {} processed, {} skipped, {} mappings persisted, {} batches failed",
            report.satellites_processed,
            report.satellites_skipped,
            report.mappings_persisted,
            report.batches_failed
        );
        Ok(report)
    }

    fn validate(&self, job: &MappingJob) -> ServiceResult<()> {
        if self.config.max_concurrency == 0 {
            return Err(ServiceError::validation("max_concurrency must be at least 1"));
        }
        if self.config.batch_size == 0 {
            return Err(ServiceError::validation("batch_size must be at least 1"));
        }
        if job.horizon_step <= Duration::zero() {
            return Err(ServiceError::validation("Horizon step must be positive"));
        }
        if let TimeStepPolicy::Fixed(step) = job.scan_step {
            if step <= Duration::zero() {
                return Err(ServiceError::validation("Scan step must be positive"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::polygon::regular_polygon;
    use crate::models::{quadkey, LatLong, SubSatellitePoint};
    use crate::propagation::{OrbitPropagator, PropagationError};
    use chrono::TimeZone;

    struct EquatorTrack(DateTime<Utc>);

    impl OrbitPropagator for EquatorTrack {
        fn propagate(&self, _: &Tle, at: DateTime<Utc>) -> Result<SubSatellitePoint, PropagationError> {
            let minutes = (at - self.0).num_seconds() as f64 / 60.0;
            Ok(SubSatellitePoint {
                lat: 0.0,
                lon: -30.0 + minutes,
                altitude_km: 500.0,
            })
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn tile(lat: f64, lon: f64) -> Tile {
        Tile {
            quadkey: quadkey(6, lat, lon),
            zoom_level: 6,
            center_lat: lat,
            center_lon: lon,
            nb_faces: 6,
            radius_m: 300_000.0,
            vertices: regular_polygon(LatLong::new(lat, lon), 300_000.0, 6),
        }
    }

    #[test]
    fn test_region_key_format() {
        assert_eq!(region_key(4, 12.34), "zoom4_lat12");
        assert_eq!(region_key(0, -45.9), "zoom0_lat-46");
    }

    #[test]
    fn test_region_index_prunes_by_latitude() {
        let mut empty = tile(10.0, 0.0);
        empty.vertices.clear();
        let index = RegionIndex::build(vec![tile(0.0, 0.0), tile(0.2, 5.0), tile(45.0, 0.0), empty]);
        assert_eq!(index.group_count(), 2);
        assert_eq!(index.tile_count(), 3);
        let keys: Vec<&str> = index.candidates(-20.0, 20.0).map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["zoom6_lat0"]);
    }

    #[test]
    fn test_scan_emits_one_mapping_per_pass() {
        let scan = SatelliteScan {
            engine: VisibilityEngine::new(Arc::new(EquatorTrack(t0()))),
            tle: Tle::new("7", "1", "2", t0()),
            index: Arc::new(RegionIndex::build(vec![tile(0.0, 0.0), tile(0.0, 10.0), tile(45.0, 0.0)])),
            window: TimeWindow::new(t0(), t0() + Duration::hours(1)).unwrap(),
            horizon_step: Duration::minutes(1),
            scan_step: TimeStepPolicy::Fixed(Duration::minutes(1)),
        };
        let mut mappings = Vec::new();
        let emitted = scan.run(|m| {
            mappings.push(m);
            true
        });
        assert_eq!(emitted, 2);
        mappings.sort_by_key(|m| m.aos);

        assert_eq!(mappings[0].tile_id, quadkey(6, 0.0, 0.0));
        assert_eq!(mappings[0].aos, t0() + Duration::minutes(28));
        assert_eq!(mappings[0].los, Some(t0() + Duration::minutes(33)));
        assert_eq!(mappings[1].tile_id, quadkey(6, 0.0, 10.0));
        assert_eq!(mappings[1].aos, t0() + Duration::minutes(38));
        assert!(mappings.iter().all(|m| m.max_elevation.unwrap() > 0.0));
    }

    struct Hovering(SubSatellitePoint);

    impl OrbitPropagator for Hovering {
        fn propagate(&self, _: &Tle, _: DateTime<Utc>) -> Result<SubSatellitePoint, PropagationError> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_scan_keeps_tiles_across_the_pole() {
        let engine = VisibilityEngine::new(Arc::new(Hovering(SubSatellitePoint {
            lat: 80.0,
            lon: 0.0,
            altitude_km: 400.0,
        })));
        let far_side = Tile {
            quadkey: quadkey(3, 85.0, 180.0),
            zoom_level: 3,
            center_lat: 85.0,
            center_lon: 180.0,
            nb_faces: 6,
            radius_m: 2_000_000.0,
            vertices: regular_polygon(LatLong::new(85.0, 180.0), 2_000_000.0, 6),
        };
        let window = TimeWindow::new(t0(), t0() + Duration::minutes(10)).unwrap();
        let direct = engine
            .compute_visibility_window(
                &Tle::new("9", "1", "2", t0()),
                TileTarget::new(far_side.center(), far_side.radius_km()),
                &window,
                Duration::minutes(1),
                None,
            )
            .unwrap();
        assert!(direct.aos.is_some());

        let scan = SatelliteScan {
            engine,
            tle: Tle::new("9", "1", "2", t0()),
            index: Arc::new(RegionIndex::build(vec![far_side])),
            window,
            horizon_step: Duration::minutes(1),
            scan_step: TimeStepPolicy::Fixed(Duration::minutes(1)),
        };
        let mut mappings = Vec::new();
        assert_eq!(
            scan.run(|m| {
                mappings.push(m);
                true
            }),
            1
        );
        assert_eq!(mappings[0].aos, t0());
        assert_eq!(mappings[0].tile_id, quadkey(3, 85.0, 180.0));
    }
}
