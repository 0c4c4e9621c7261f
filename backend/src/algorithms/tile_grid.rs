//! Global tile grid generation.
//!
//! The grid is the full slippy-map tiling at the smallest zoom level whose
//! half tile size fits within the requested radius:
//!
//! ```text
//!   radius ──► choose_zoom_level ──► n = 2^zoom
//!                                        │
//!          ┌──────────────┬──────────────┼──────────────┐
//!          ▼              ▼              ▼              ▼
//!     worker x∈[0,k)  worker [k,2k)   worker ...     worker [.., n)
//!          │              │              │              │
//!          └──────────────┴──── channel ─┴──────────────┘
//!                                 │
//!                          single collector ──► HashMap<TileId, Tile>
//! ```

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::mpsc;
use std::thread;

use log::{debug, info};

use super::geodesy::EARTH_CIRCUMFERENCE_M;
use super::polygon::regular_polygon;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{quadkey, LatLong, Tile, TileId};

/// Highest zoom level considered by [`choose_zoom_level`].
pub const MAX_ZOOM_LEVEL: u8 = 21;

pub const DEFAULT_GRID_WORKERS: usize = 4;

/// Default cap on the generated zoom level (about one million tiles).
pub const DEFAULT_MAX_GRID_ZOOM: u8 = 10;

/// Highest zoom a generator can be configured for (about 16.7 million tiles).
pub const MAX_GRID_ZOOM: u8 = 12;

/// Largest tile map reserved up front; bigger grids grow as they fill.
const MAX_PRESIZED_TILES: usize = 1 << 20;

/// Edge length of a tile at `zoom` (m).
pub fn tile_size_m(zoom: u8) -> f64 {
    EARTH_CIRCUMFERENCE_M / 2f64.powi(zoom as i32)
}

/// Radius of the circle approximating a tile at `zoom` (m).
pub fn tile_radius_m(zoom: u8) -> f64 {
    tile_size_m(zoom) / 2.0
}

/// Smallest zoom whose half tile size is at most `radius_m`, or
/// [`MAX_ZOOM_LEVEL`] when none qualifies.
pub fn choose_zoom_level(radius_m: f64) -> u8 {
    (0..=MAX_ZOOM_LEVEL)
        .find(|&zoom| tile_radius_m(zoom) <= radius_m)
        .unwrap_or(MAX_ZOOM_LEVEL)
}

/// Slippy-map tile index to latitude/longitude in degrees.
pub fn tile_xy_to_lat_lon(x: u32, y: u32, zoom: u8) -> (f64, f64) {
    let n = 2f64.powi(zoom as i32);
    let lon = x as f64 / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y as f64 / n)).sinh().atan().to_degrees();
    (lat, lon)
}

/// Builds the global tile set with a fixed pool of OS threads.
#[derive(Debug, Clone)]
pub struct TileGridGenerator {
    workers: usize,
    max_zoom: u8,
}

impl Default for TileGridGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_GRID_WORKERS)
    }
}

impl TileGridGenerator {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            max_zoom: DEFAULT_MAX_GRID_ZOOM,
        }
    }

    /// Cap the zoom level, never above [`MAX_GRID_ZOOM`].
    pub fn with_max_zoom(mut self, max_zoom: u8) -> Self {
        self.max_zoom = max_zoom.min(MAX_GRID_ZOOM);
        self
    }

    pub fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// Generate every tile at the zoom level chosen for `radius_m`.
    ///
    /// # Arguments
    /// * `radius_m` - Requested tile radius in meters, must be positive
    /// * `nb_faces` - Number of polygon vertices per tile, must be positive
    ///
    /// # Returns
    /// * `Ok(HashMap)` keyed by quadkey, one entry per `(x, y)` tile index
    /// * `Err(ServiceError::Validation)` on bad input or when the zoom exceeds the cap
    pub fn generate(&self, radius_m: f64, nb_faces: usize) -> ServiceResult<HashMap<TileId, Tile>> {
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(ServiceError::validation(format!(
                "Tile radius must be positive, got {}",
                radius_m
            )));
        }
        if nb_faces == 0 {
            return Err(ServiceError::validation("Tile polygon needs at least one face"));
        }

        let zoom = choose_zoom_level(radius_m);
        if zoom > self.max_zoom {
            return Err(ServiceError::validation(format!(
                "Radius {} m requires zoom {} which exceeds the configured maximum {}",
                radius_m, zoom, self.max_zoom
            )));
        }

        let n: u32 = 1 << zoom;
        let actual_radius = tile_radius_m(zoom);
        let workers = (self.workers as u32).min(n).max(1);
        let columns_per_worker = n.div_ceil(workers);
        info!(
            "Generating {} tiles at zoom {} (radius {:.1} m, {} faces, {} workers)",
            n as u64 * n as u64,
            zoom,
            actual_radius,
            nb_faces,
            workers
        );

        let (tx, rx) = mpsc::channel::<(TileId, Tile)>();
        let tiles = thread::scope(|scope| {
            for worker in 0..workers {
                let start_x = worker * columns_per_worker;
                let end_x = ((worker + 1) * columns_per_worker).min(n);
                let tx = tx.clone();
                scope.spawn(move || {
                    debug!("Grid worker {} covering x in [{}, {})", worker, start_x, end_x);
                    for x in start_x..end_x {
                        for y in 0..n {
                            let tile = build_tile(x, y, zoom, actual_radius, nb_faces);
                            if tx.send((tile.quadkey.clone(), tile)).is_err() {
                                return;
                            }
                        }
                    }
                });
            }
            drop(tx);

            let mut tiles = HashMap::with_capacity((n as usize * n as usize).min(MAX_PRESIZED_TILES));
            for (key, tile) in rx {
                tiles.insert(key, tile);
            }
            tiles
        });

        Ok(tiles)
    }
}

fn build_tile(x: u32, y: u32, zoom: u8, radius_m: f64, nb_faces: usize) -> Tile {
    let (lat, lon) = tile_xy_to_lat_lon(x, y, zoom);
    let center = LatLong::new(lat, lon);
    Tile {
        quadkey: quadkey(zoom, lat, lon),
        zoom_level: zoom,
        center_lat: lat,
        center_lon: lon,
        nb_faces,
        radius_m,
        vertices: regular_polygon(center, radius_m, nb_faces),
    }
}
