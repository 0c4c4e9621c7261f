//! Task dispatch through the registry built by the composition root.

mod support;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use satvis_rust::algorithms::tile_grid::tile_radius_m;
use satvis_rust::app::AppContext;
use satvis_rust::cache::LocalCache;
use satvis_rust::config::AppConfig;
use satvis_rust::db::{LocalRepository, SatelliteRepository};
use satvis_rust::error::{ServiceError, ServiceResult};
use satvis_rust::services::catalogue::{CatalogueClient, CatalogueEntry};
use satvis_rust::services::job_tracker::JobStatus;
use satvis_rust::tasks::TaskArgs;

use support::iss_tle;

struct StaticCatalogue;

#[async_trait]
impl CatalogueClient for StaticCatalogue {
    async fn fetch_category(&self, category: &str) -> ServiceResult<Vec<CatalogueEntry>> {
        match category {
            "stations" => Ok(vec![CatalogueEntry {
                name: "ISS (ZARYA)".to_string(),
                tle: iss_tle(),
            }]),
            other => Err(ServiceError::Catalogue(format!("unknown group {}", other))),
        }
    }
}

fn context() -> (AppContext, LocalRepository) {
    let repo = LocalRepository::new();
    let context = AppContext::with_collaborators(
        AppConfig::default(),
        Arc::new(repo.clone()),
        Arc::new(LocalCache::new()),
        Arc::new(StaticCatalogue),
    );
    (context, repo)
}

fn args(pairs: &[(&str, &str)]) -> TaskArgs {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn wait_for_terminal(context: &AppContext, job_id: &str) -> JobStatus {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(job) = context.tasks.jobs().get_job(job_id) {
                if job.status.is_terminal() {
                    return job.status;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not finish in time")
}

#[test]
fn test_every_task_is_registered() {
    let (context, _) = context();
    let names: Vec<&str> = context.tasks.definitions().iter().map(|d| d.name).collect();
    assert_eq!(
        names,
        vec![
            "celestrack_tle_upload",
            "compute_visibilities",
            "generate_tiles",
            "satellites_tiles_mapping_horizon",
        ]
    );
}

#[tokio::test]
async fn test_unknown_task_and_missing_arguments() {
    let (context, _) = context();
    let cancel = CancellationToken::new();

    let err = context
        .tasks
        .process("defragment", &TaskArgs::new(), cancel.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(ref m) if m == "task not found: [defragment]"));

    let err = context
        .tasks
        .process("generate_tiles", &args(&[("radiusInMeter", "5000")]), cancel.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(ref m) if m.contains("faces")));

    let err = context
        .tasks
        .process("generate_tiles", &args(&[("radiusInMeter", "5000"), ("faces", " ")]), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    assert!(context.tasks.spawn("satellites_tiles_mapping_horizon", TaskArgs::new()).is_err());
    assert!(context.tasks.jobs().list_jobs().is_empty());
}

#[tokio::test]
async fn test_generate_tiles_stores_the_grid() {
    let (context, repo) = context();
    let radius = tile_radius_m(2).to_string();

    let result = context
        .tasks
        .process(
            "generate_tiles",
            &args(&[("radiusInMeter", &radius), ("faces", "6")]),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result["tiles"], 16);
    assert_eq!(result["failed"], 0);
    assert_eq!(result["zoomLevel"], 2);
    assert_eq!(repo.tile_count(), 16);
}

#[tokio::test]
async fn test_tle_upload_creates_satellites_once() {
    let (context, repo) = context();
    let upload = args(&[("category", "stations")]);

    let first = context
        .tasks
        .process("celestrack_tle_upload", &upload, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first["fetched"], 1);
    assert_eq!(first["satellitesCreated"], 1);
    assert_eq!(first["tlesUpdated"], 1);

    let satellite = repo.find_satellite(&"25544".into()).await.unwrap().unwrap();
    assert_eq!(satellite.name, "ISS (ZARYA)");
    assert_eq!(satellite.category.as_deref(), Some("stations"));
    assert_eq!(context.tle_store.get(&"25544".into()).await.unwrap(), iss_tle());

    let second = context
        .tasks
        .process("celestrack_tle_upload", &upload, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second["satellitesCreated"], 0);
    assert_eq!(second["tlesUnchanged"], 1);

    let err = context
        .tasks
        .process("celestrack_tle_upload", &args(&[("category", "nope")]), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Catalogue(_)));
}

#[tokio::test]
async fn test_mapping_task_with_empty_catalogue_reports_nothing() {
    let (context, _) = context();
    let result = context
        .tasks
        .process(
            "satellites_tiles_mapping_horizon",
            &args(&[("timeStepInSeconds", "60"), ("periodInMinutes", "10")]),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(result["satellites_processed"], 0);
    assert_eq!(result["mappings_persisted"], 0);

    let err = context
        .tasks
        .process(
            "satellites_tiles_mapping_horizon",
            &args(&[("timeStepInSeconds", "0"), ("periodInMinutes", "10")]),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn test_mapping_task_rejects_out_of_range_durations() {
    let (context, _) = context();
    for (step, period) in [
        ("30", "9223372036854775807"),
        ("9223372036854775807", "10"),
    ] {
        let err = context
            .tasks
            .process(
                "satellites_tiles_mapping_horizon",
                &args(&[("timeStepInSeconds", step), ("periodInMinutes", period)]),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m.contains("out of range")), "{}", err);
    }

    let job_id = context
        .tasks
        .spawn(
            "satellites_tiles_mapping_horizon",
            args(&[("timeStepInSeconds", "30"), ("periodInMinutes", "9223372036854775807")]),
        )
        .unwrap();
    assert_eq!(wait_for_terminal(&context, &job_id).await, JobStatus::Failed);
}

#[tokio::test]
async fn test_spawned_job_completes_with_result() {
    let (context, _) = context();
    let radius = tile_radius_m(1).to_string();
    let job_id = context
        .tasks
        .spawn("generate_tiles", args(&[("radiusInMeter", &radius), ("faces", "4")]))
        .unwrap();

    assert_eq!(wait_for_terminal(&context, &job_id).await, JobStatus::Completed);
    let job = context.tasks.jobs().get_job(&job_id).unwrap();
    assert_eq!(job.task, "generate_tiles");
    assert_eq!(job.result.unwrap()["tiles"], 4);
    assert!(job.completed_at.is_some());
}

#[tokio::test]
async fn test_spawned_job_fails_on_bad_values() {
    let (context, _) = context();
    let job_id = context
        .tasks
        .spawn("compute_visibilities", args(&[("defaultHorizon", "120")]))
        .unwrap();

    assert_eq!(wait_for_terminal(&context, &job_id).await, JobStatus::Failed);
    let logs = context.tasks.jobs().get_logs(&job_id);
    assert!(logs.iter().any(|l| l.message.contains("defaultHorizon")));
}

#[tokio::test]
async fn test_listener_job_stops_on_cancel() {
    let (context, _) = context();
    let job_id = context
        .tasks
        .spawn("compute_visibilities", HashMap::from([("defaultHorizon".to_string(), "30".to_string())]))
        .unwrap();
    assert_eq!(context.tasks.jobs().running_count(), 1);

    assert!(context.tasks.jobs().cancel_job(&job_id));
    assert_eq!(wait_for_terminal(&context, &job_id).await, JobStatus::Cancelled);
    assert!(!context.tasks.jobs().cancel_job(&job_id));
}
