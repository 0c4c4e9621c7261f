use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{parse_optional, required, TaskArgs, TaskDefinition, TaskHandler};
use crate::db::repository::SatelliteRepository;
use crate::error::{ServiceError, ServiceResult};
use crate::services::catalogue::{CatalogueClient, CatalogueEntry};
use crate::services::tle_store::TleStore;

/// Pulls a catalogue group and upserts its satellites and TLEs.
///
/// Satellites unknown to the repository are created from the catalogue
/// entry; known ones are left untouched. TLEs go through the [`TleStore`] so
/// the cache and the update channel follow the write.
pub struct CelestrakTleUploadTask {
    satellites: Arc<dyn SatelliteRepository>,
    tle_store: TleStore,
    client: Arc<dyn CatalogueClient>,
}

#[derive(Default)]
struct UploadCounters {
    satellites_created: usize,
    tles_updated: usize,
    tles_unchanged: usize,
    failed: usize,
}

impl CelestrakTleUploadTask {
    pub fn new(
        satellites: Arc<dyn SatelliteRepository>,
        tle_store: TleStore,
        client: Arc<dyn CatalogueClient>,
    ) -> Self {
        Self {
            satellites,
            tle_store,
            client,
        }
    }

    async fn upsert_entry(
        &self,
        entry: &CatalogueEntry,
        category: &str,
        counters: &mut UploadCounters,
    ) -> ServiceResult<()> {
        let norad_id = &entry.tle.norad_id;
        if self.satellites.find_satellite(norad_id).await?.is_none() {
            self.satellites
                .upsert_satellites(&[entry.to_satellite(category)])
                .await?;
            counters.satellites_created += 1;
        }
        if self.tle_store.update(&entry.tle).await? {
            counters.tles_updated += 1;
        } else {
            counters.tles_unchanged += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for CelestrakTleUploadTask {
    fn definition(&self) -> TaskDefinition {
        TaskDefinition {
            name: "celestrack_tle_upload",
            description: "Fetch TLEs of a CelesTrak group and upsert them",
            required_args: &["category"],
        }
    }

    async fn run(&self, cancel: CancellationToken, args: &TaskArgs) -> ServiceResult<serde_json::Value> {
        let category = required(args, "category")?.to_string();
        let max_count: Option<usize> = parse_optional(args, "maxCount")?;

        let mut entries = self.client.fetch_category(&category).await?;
        let fetched = entries.len();
        if let Some(max) = max_count {
            entries.truncate(max);
        }
        info!("Upserting {} of {} TLEs for category {}", entries.len(), fetched, category);

        let mut counters = UploadCounters::default();
        for entry in &entries {
            if cancel.is_cancelled() {
                warn!("TLE upload for {} cancelled", category);
                return Err(ServiceError::Cancelled);
            }
            if let Err(e) = self.upsert_entry(entry, &category, &mut counters).await {
                warn!("Failed to upsert TLE for {}: {}", entry.tle.norad_id, e);
                counters.failed += 1;
            }
        }

        Ok(json!({
            "category": category,
            "fetched": fetched,
            "satellitesCreated": counters.satellites_created,
            "tlesUpdated": counters.tles_updated,
            "tlesUnchanged": counters.tles_unchanged,
            "failed": counters.failed,
        }))
    }
}
