//! End-to-end runs of the mapping pipeline over the in-memory backends.

mod support;

use std::sync::Arc;

use chrono::Duration;
use tokio_util::sync::CancellationToken;

use satvis_rust::cache::LocalCache;
use satvis_rust::db::{LocalRepository, MappingRepository};
use satvis_rust::error::ServiceError;
use satvis_rust::models::{LatLong, NoradId, TileSatelliteMapping, TimeWindow};
use satvis_rust::propagation::{OrbitPropagator, Sgp4Propagator};
use satvis_rust::services::mapping_pipeline::{
    MappingBatcher, MappingJob, MappingPipeline, PipelineConfig, TimeStepPolicy,
};
use satvis_rust::services::tle_store::TleStore;
use satvis_rust::services::visibility_engine::VisibilityEngine;

use support::{fake_tle, iss_tle, t0, tile, EquatorTrack};

struct Fixture {
    repo: LocalRepository,
    store: TleStore,
}

impl Fixture {
    fn new() -> Self {
        let repo = LocalRepository::new();
        let store = TleStore::new(Arc::new(repo.clone()), Arc::new(LocalCache::new()));
        Self { repo, store }
    }

    fn pipeline(&self, propagator: Arc<dyn OrbitPropagator>, config: PipelineConfig) -> MappingPipeline {
        MappingPipeline::new(
            VisibilityEngine::new(propagator),
            self.store.clone(),
            Arc::new(self.repo.clone()),
            config,
        )
    }

    fn equator_pipeline(&self) -> MappingPipeline {
        self.pipeline(Arc::new(EquatorTrack), PipelineConfig::default())
    }
}

fn equator_job(satellites: &[&str]) -> MappingJob {
    MappingJob {
        satellites: satellites.iter().map(|id| NoradId::new(*id)).collect(),
        tiles: vec![tile(0.0, 0.0), tile(0.0, 10.0), tile(45.0, 0.0)],
        window: TimeWindow::starting_at(t0(), 60).unwrap(),
        horizon_step: Duration::minutes(1),
        scan_step: TimeStepPolicy::Fixed(Duration::minutes(1)),
    }
}

#[tokio::test]
async fn test_batcher_flushes_full_batches_then_remainder() {
    let repo = LocalRepository::new();
    let mut batcher = MappingBatcher::new(Arc::new(repo.clone()), 100);
    for i in 0..250 {
        batcher
            .push(TileSatelliteMapping::new(
                "1".into(),
                format!("tile-{}", i).into(),
                t0(),
                None,
                Some(10.0),
            ))
            .await;
    }
    assert_eq!(batcher.pending(), 50);

    let stats = batcher.finish().await;
    assert_eq!(repo.mapping_batch_sizes(), vec![100, 100, 50]);
    assert_eq!(stats.flushed, 3);
    assert_eq!(stats.persisted, 250);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_pipeline_persists_one_mapping_per_pass() {
    let fixture = Fixture::new();
    for id in ["1", "2"] {
        fixture.store.update(&fake_tle(id)).await.unwrap();
    }

    let report = fixture
        .equator_pipeline()
        .run(equator_job(&["1", "2"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.satellites_processed, 2);
    assert_eq!(report.mappings_emitted, 4);
    assert_eq!(report.mappings_persisted, 4);
    assert_eq!(report.batches_flushed, 2);
    assert!(!report.cancelled);
    assert!(report.errors.is_empty());
    assert_eq!(fixture.repo.mapping_batch_sizes(), vec![2, 2]);

    let mut mappings = fixture.repo.find_mappings_for_satellite(&"1".into()).await.unwrap();
    mappings.sort_by_key(|m| m.aos);
    assert_eq!(mappings.len(), 2);
    assert_eq!(mappings[0].aos, t0() + Duration::minutes(28));
    assert_eq!(mappings[0].los, Some(t0() + Duration::minutes(33)));
    for mapping in &mappings {
        assert!(mapping.los.map_or(true, |los| los >= mapping.aos));
        assert!(mapping.max_elevation.is_some_and(|e| e > 0.0 && e <= 90.0));
    }
}

#[tokio::test]
async fn test_dynamic_step_refines_aos() {
    let fixture = Fixture::new();
    fixture.store.update(&fake_tle("1")).await.unwrap();
    let job = MappingJob {
        scan_step: TimeStepPolicy::Dynamic,
        ..equator_job(&["1"])
    };

    let report = fixture.equator_pipeline().run(job, CancellationToken::new()).await.unwrap();
    assert_eq!(report.mappings_persisted, 2);

    let first = fixture
        .repo
        .find_mappings_for_satellite(&"1".into())
        .await
        .unwrap()
        .into_iter()
        .min_by_key(|m| m.aos)
        .unwrap();
    assert!(first.aos > t0() + Duration::minutes(27));
    assert!(first.aos < t0() + Duration::minutes(28));
}

#[tokio::test]
async fn test_satellite_without_tle_is_skipped() {
    let fixture = Fixture::new();
    fixture.store.update(&fake_tle("1")).await.unwrap();

    let report = fixture
        .equator_pipeline()
        .run(equator_job(&["1", "404"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.satellites_processed, 1);
    assert_eq!(report.satellites_skipped, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].norad_id, NoradId::new("404"));
    assert_eq!(report.mappings_persisted, 2);
}

#[tokio::test]
async fn test_failed_flush_is_counted_and_run_continues() {
    let fixture = Fixture::new();
    for id in ["1", "2"] {
        fixture.store.update(&fake_tle(id)).await.unwrap();
    }
    fixture.repo.set_fail_mapping_writes(true);

    let report = fixture
        .equator_pipeline()
        .run(equator_job(&["1", "2"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.satellites_processed, 2);
    assert_eq!(report.mappings_emitted, 4);
    assert_eq!(report.mappings_persisted, 0);
    assert_eq!(report.batches_failed, 2);
    assert_eq!(fixture.repo.mapping_count(), 0);
}

#[tokio::test]
async fn test_cancelled_run_starts_no_satellite() {
    let fixture = Fixture::new();
    fixture.store.update(&fake_tle("1")).await.unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = fixture
        .equator_pipeline()
        .run(equator_job(&["1"]), cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.satellites_processed, 0);
    assert_eq!(fixture.repo.mapping_count(), 0);
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(
        Arc::new(EquatorTrack),
        PipelineConfig {
            max_concurrency: 0,
            batch_size: 100,
        },
    );
    assert!(matches!(
        pipeline.run(equator_job(&["1"]), CancellationToken::new()).await,
        Err(ServiceError::Validation(_))
    ));

    let job = MappingJob {
        horizon_step: Duration::zero(),
        ..equator_job(&["1"])
    };
    assert!(matches!(
        fixture.equator_pipeline().run(job, CancellationToken::new()).await,
        Err(ServiceError::Validation(_))
    ));
}

#[tokio::test]
async fn test_iss_pass_over_its_own_ground_track() {
    // The elements decay, so the window is anchored one hour after their epoch
    // rather than at the current time.
    let iss = iss_tle();
    let propagator = Arc::new(Sgp4Propagator::new());
    let overhead_at = iss.epoch + Duration::hours(1);
    let sub_point = propagator.propagate(&iss, overhead_at).unwrap();

    let fixture = Fixture::new();
    fixture.store.update(&iss).await.unwrap();
    let pipeline = fixture.pipeline(propagator, PipelineConfig::default());
    let ground = LatLong::new(sub_point.lat, sub_point.lon);
    let job = MappingJob {
        satellites: vec![iss.norad_id.clone()],
        tiles: vec![tile(ground.lat, ground.lon)],
        window: TimeWindow::new(
            overhead_at - Duration::minutes(10),
            overhead_at + Duration::minutes(10),
        )
        .unwrap(),
        horizon_step: Duration::minutes(1),
        scan_step: TimeStepPolicy::Fixed(Duration::seconds(5)),
    };

    let report = pipeline.run(job, CancellationToken::new()).await.unwrap();
    assert_eq!(report.satellites_processed, 1);
    assert_eq!(report.mappings_persisted, 1);

    let mapping = &fixture
        .repo
        .find_mappings_for_satellite(&iss.norad_id)
        .await
        .unwrap()[0];
    assert!(mapping.aos <= overhead_at);
    assert!(mapping.aos > overhead_at - Duration::minutes(2));
    let los = mapping.los.unwrap();
    assert!(los > overhead_at && los < overhead_at + Duration::minutes(2));
    assert!(mapping.max_elevation.unwrap() > 45.0);
}
