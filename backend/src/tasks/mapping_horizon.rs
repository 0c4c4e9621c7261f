use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::info;
use tokio_util::sync::CancellationToken;

use super::{parse_optional, parse_required, TaskArgs, TaskDefinition, TaskHandler};
use crate::db::repository::{FullRepository, SatelliteRepository, TileRepository};
use crate::error::{ServiceError, ServiceResult};
use crate::models::TimeWindow;
use crate::services::mapping_pipeline::{MappingJob, MappingPipeline, PipelineConfig, TimeStepPolicy};

/// Runs the mapping pipeline over every stored tile for a period starting now.
///
/// Optional arguments: `category` and `maxCount` narrow the satellite set,
/// `maxConcurrency` and `batchSize` override the pipeline configuration,
/// `dynamicStep=true` samples passes with the altitude-derived step instead
/// of `timeStepInSeconds`.
pub struct MappingHorizonTask {
    repo: Arc<dyn FullRepository>,
    pipeline: MappingPipeline,
}

impl MappingHorizonTask {
    pub fn new(repo: Arc<dyn FullRepository>, pipeline: MappingPipeline) -> Self {
        Self { repo, pipeline }
    }
}

#[async_trait]
impl TaskHandler for MappingHorizonTask {
    fn definition(&self) -> TaskDefinition {
        TaskDefinition {
            name: "satellites_tiles_mapping_horizon",
            description: "Compute satellite/tile mappings with horizon pruning",
            required_args: &["timeStepInSeconds", "periodInMinutes"],
        }
    }

    async fn run(&self, cancel: CancellationToken, args: &TaskArgs) -> ServiceResult<serde_json::Value> {
        let step_seconds: i64 = parse_required(args, "timeStepInSeconds")?;
        let period_minutes: i64 = parse_required(args, "periodInMinutes")?;
        if step_seconds <= 0 || period_minutes <= 0 {
            return Err(ServiceError::validation(
                "timeStepInSeconds and periodInMinutes must be positive",
            ));
        }
        let category: Option<String> = parse_optional(args, "category")?;
        let max_count: Option<usize> = parse_optional(args, "maxCount")?;
        let dynamic_step: bool = parse_optional(args, "dynamicStep")?.unwrap_or(false);

        let defaults = self.pipeline.config();
        let config = PipelineConfig {
            max_concurrency: parse_optional(args, "maxConcurrency")?.unwrap_or(defaults.max_concurrency),
            batch_size: parse_optional(args, "batchSize")?.unwrap_or(defaults.batch_size),
        };

        let mut satellites = match category.as_deref() {
            Some(category) => self.repo.find_satellites_by_category(category, max_count).await?,
            None => self.repo.find_all_satellites().await?,
        };
        if let Some(max) = max_count {
            satellites.truncate(max);
        }
        let tiles = self.repo.find_all_tiles().await?;

        let step = Duration::try_seconds(step_seconds).ok_or_else(|| {
            ServiceError::validation(format!("timeStepInSeconds {} is out of range", step_seconds))
        })?;
        let job = MappingJob {
            satellites: satellites.into_iter().map(|s| s.norad_id).collect(),
            tiles,
            window: TimeWindow::starting_at(Utc::now(), period_minutes)?,
            horizon_step: step,
            scan_step: if dynamic_step {
                TimeStepPolicy::Dynamic
            } else {
                TimeStepPolicy::Fixed(step)
            },
        };
        info!(
            "Mapping {} satellites over {} tiles for {} minutes",
            job.satellites.len(),
            job.tiles.len(),
            period_minutes
        );

        let report = self.pipeline.clone().with_config(config).run(job, cancel).await?;
        serde_json::to_value(&report)
            .map_err(|e| ServiceError::Persistence(format!("Failed to encode run report: {}", e)))
    }
}
