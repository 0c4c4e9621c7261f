//! Composition root.
//!
//! Everything the worker needs is built here once and handed down through
//! constructors; nothing below this module reaches for a global.

use std::sync::Arc;

use log::info;

use crate::algorithms::TileGridGenerator;
use crate::cache::{CacheBus, LocalCache};
use crate::config::AppConfig;
use crate::db::{FullRepository, RepositoryFactory};
use crate::error::ServiceResult;
use crate::propagation::Sgp4Propagator;
use crate::services::catalogue::{CatalogueClient, CelestrakClient};
use crate::services::job_tracker::JobTracker;
use crate::services::mapping_pipeline::MappingPipeline;
use crate::services::realtime_visibility::RealtimeVisibilityService;
use crate::services::tle_store::TleStore;
use crate::services::visibility_engine::VisibilityEngine;
use crate::tasks::compute_visibilities::ComputeVisibilitiesTask;
use crate::tasks::generate_tiles::GenerateTilesTask;
use crate::tasks::mapping_horizon::MappingHorizonTask;
use crate::tasks::registry::TaskRegistry;
use crate::tasks::tle_upload::CelestrakTleUploadTask;

#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub repository: Arc<dyn FullRepository>,
    pub cache: Arc<dyn CacheBus>,
    pub tle_store: TleStore,
    pub pipeline: MappingPipeline,
    pub realtime: RealtimeVisibilityService,
    pub tasks: TaskRegistry,
}

impl AppContext {
    /// Build the context with the collaborators named by `config`.
    ///
    /// # Returns
    /// * `Err(ServiceError::Configuration)` - unknown repository type or bad catalogue URL
    pub fn from_config(config: AppConfig) -> ServiceResult<Self> {
        let repository = RepositoryFactory::create(config.repository_type()?);
        let cache: Arc<dyn CacheBus> = Arc::new(LocalCache::with_publish_log(0));
        let catalogue: Arc<dyn CatalogueClient> =
            Arc::new(CelestrakClient::new(config.catalogue.base_url.clone())?);
        Ok(Self::with_collaborators(config, repository, cache, catalogue))
    }

    /// Build the context around caller-supplied storage, bus and catalogue.
    pub fn with_collaborators(
        config: AppConfig,
        repository: Arc<dyn FullRepository>,
        cache: Arc<dyn CacheBus>,
        catalogue: Arc<dyn CatalogueClient>,
    ) -> Self {
        let tle_store = TleStore::new(repository.clone(), cache.clone()).with_ttl(config.tle_ttl());
        let engine = VisibilityEngine::new(Arc::new(Sgp4Propagator::new()));
        let pipeline = MappingPipeline::new(
            engine,
            tle_store.clone(),
            repository.clone(),
            config.pipeline,
        );
        let realtime = RealtimeVisibilityService::new(repository.clone(), tle_store.clone(), cache.clone())
            .with_max_in_flight(config.realtime.max_in_flight);
        let generator = TileGridGenerator::new(config.grid.workers).with_max_zoom(config.grid.max_zoom);

        let tasks = TaskRegistry::new(JobTracker::new())
            .with(Arc::new(GenerateTilesTask::new(repository.clone(), generator)))
            .with(Arc::new(MappingHorizonTask::new(repository.clone(), pipeline.clone())))
            .with(Arc::new(ComputeVisibilitiesTask::new(realtime.clone())))
            .with(Arc::new(CelestrakTleUploadTask::new(
                repository.clone(),
                tle_store.clone(),
                catalogue,
            )));
        info!(
            "Application context ready with {} tasks",
            tasks.definitions().len()
        );

        Self {
            config,
            repository,
            cache,
            tle_store,
            pipeline,
            realtime,
            tasks,
        }
    }
}
