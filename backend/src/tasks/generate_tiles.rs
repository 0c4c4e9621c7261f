use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{parse_required, TaskArgs, TaskDefinition, TaskHandler};
use crate::algorithms::TileGridGenerator;
use crate::db::repository::TileRepository;
use crate::error::{ServiceError, ServiceResult};
use crate::models::Tile;

/// Tiles written per repository call.
const TILE_WRITE_BATCH: usize = 100;

/// Builds the global grid for a radius and stores it.
pub struct GenerateTilesTask {
    repo: Arc<dyn TileRepository>,
    generator: TileGridGenerator,
}

impl GenerateTilesTask {
    pub fn new(repo: Arc<dyn TileRepository>, generator: TileGridGenerator) -> Self {
        Self { repo, generator }
    }
}

#[async_trait]
impl TaskHandler for GenerateTilesTask {
    fn definition(&self) -> TaskDefinition {
        TaskDefinition {
            name: "generate_tiles",
            description: "Generate the tile grid for a radius and store it",
            required_args: &["radiusInMeter", "faces"],
        }
    }

    async fn run(&self, cancel: CancellationToken, args: &TaskArgs) -> ServiceResult<serde_json::Value> {
        let radius: f64 = parse_required(args, "radiusInMeter")?;
        let faces: usize = parse_required(args, "faces")?;

        let generator = self.generator.clone();
        let grid = tokio::task::spawn_blocking(move || generator.generate(radius, faces))
            .await
            .map_err(|e| ServiceError::Persistence(format!("grid generation aborted: {}", e)))??;

        let mut tiles: Vec<Tile> = grid.into_values().collect();
        tiles.sort_by(|a, b| a.quadkey.cmp(&b.quadkey));
        let zoom_level = tiles.first().map(|t| t.zoom_level);
        let total = tiles.len();

        let mut written = 0;
        let mut failed = 0;
        for chunk in tiles.chunks(TILE_WRITE_BATCH) {
            if cancel.is_cancelled() {
                warn!("Tile generation cancelled after {} of {} tiles", written, total);
                return Err(ServiceError::Cancelled);
            }
            match self.repo.upsert_tiles(chunk.to_vec()).await {
                Ok(n) => written += n,
                Err(e) => {
                    warn!("Failed to store {} tiles: {}", chunk.len(), e);
                    failed += chunk.len();
                }
            }
        }

        info!("Stored {} tiles ({} failed) at zoom {:?}", written, failed, zoom_level);
        Ok(json!({
            "tiles": written,
            "failed": failed,
            "zoomLevel": zoom_level,
        }))
    }
}
