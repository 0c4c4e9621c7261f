//! Cache-aside access to TLEs.
//!
//! Reads try the cache hash `satellite:tle:<id>` first and fall back to the
//! durable repository, repopulating the cache with a TTL. Writes go to the
//! repository first and refresh the cache only after the durable write
//! succeeded. Cache failures are logged and never surface to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, warn};

use crate::cache::CacheBus;
use crate::db::repository::TleRepository;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{NoradId, Tle};

/// Prefix of the per-satellite cache hash.
pub const TLE_CACHE_PREFIX: &str = "satellite:tle:";

/// Channel announcing every TLE written through the store.
pub const TLE_UPDATES_CHANNEL: &str = "satellite_tle_updates";

/// Default cache lifetime of a TLE entry (7 days).
pub const DEFAULT_TLE_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

const FIELD_LINE_1: &str = "line_1";
const FIELD_LINE_2: &str = "line_2";
const FIELD_EPOCH: &str = "epoch";
const FIELD_ID: &str = "id";

#[derive(Clone)]
pub struct TleStore {
    repo: Arc<dyn TleRepository>,
    cache: Arc<dyn CacheBus>,
    ttl: Duration,
}

impl TleStore {
    pub fn new(repo: Arc<dyn TleRepository>, cache: Arc<dyn CacheBus>) -> Self {
        Self {
            repo,
            cache,
            ttl: DEFAULT_TLE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn cache_key(norad_id: &NoradId) -> String {
        format!("{}{}", TLE_CACHE_PREFIX, norad_id)
    }

    /// Fetch the TLE of a satellite.
    ///
    /// # Returns
    /// * `Ok(Tle)` - from the cache when present and well formed, otherwise from storage
    /// * `Err(ServiceError::NotFound)` - no TLE stored for this satellite
    /// * `Err(ServiceError::Persistence)` - the durable read failed
    pub async fn get(&self, norad_id: &NoradId) -> ServiceResult<Tle> {
        if let Some(tle) = self.read_cached(norad_id).await {
            debug!("TLE cache hit for {}", norad_id);
            return Ok(tle);
        }

        let tle = self
            .repo
            .find_tle(norad_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("No TLE for satellite {}", norad_id)))?;
        self.populate(&tle).await;
        Ok(tle)
    }

    /// Fetch several TLEs concurrently, returning the found ones and the ids
    /// without data. Found TLEs keep the order of `ids`.
    pub async fn get_many(&self, ids: &[NoradId]) -> ServiceResult<(Vec<Tle>, Vec<NoradId>)> {
        let lookups = join_all(ids.iter().map(|id| self.get(id))).await;
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for (id, lookup) in ids.iter().zip(lookups) {
            match lookup {
                Ok(tle) => found.push(tle),
                Err(ServiceError::NotFound(_)) => missing.push(id.clone()),
                Err(e) => return Err(e),
            }
        }
        Ok((found, missing))
    }

    /// Insert a new TLE. Fails when one is already stored for the satellite.
    pub async fn save(&self, tle: &Tle) -> ServiceResult<()> {
        tle.validate()?;
        self.repo.insert_tle(tle).await?;
        self.populate(tle).await;
        self.announce(tle).await;
        Ok(())
    }

    /// Insert or replace a TLE. Older epochs never replace newer ones.
    ///
    /// # Returns
    /// * `Ok(true)` - the TLE was stored
    /// * `Ok(false)` - a newer TLE was already stored, nothing changed
    pub async fn update(&self, tle: &Tle) -> ServiceResult<bool> {
        tle.validate()?;
        let applied = self.repo.upsert_tle(tle).await?;
        if applied {
            self.populate(tle).await;
            self.announce(tle).await;
        } else {
            debug!(
                "Ignored TLE for {} with epoch {}, stored one is newer",
                tle.norad_id, tle.epoch
            );
        }
        Ok(applied)
    }

    /// Remove a TLE from storage, then invalidate its cache entry.
    pub async fn delete(&self, norad_id: &NoradId) -> ServiceResult<bool> {
        let existed = self.repo.delete_tle(norad_id).await?;
        if let Err(e) = self.cache.del(&Self::cache_key(norad_id)).await {
            warn!("Failed to invalidate cached TLE {}: {}", norad_id, e);
        }
        Ok(existed)
    }

    async fn read_cached(&self, norad_id: &NoradId) -> Option<Tle> {
        let key = Self::cache_key(norad_id);
        let fields = match self.cache.hget_all(&key).await {
            Ok(fields) => fields,
            Err(e) => {
                warn!("TLE cache read failed for {}: {}", norad_id, e);
                return None;
            }
        };
        if fields.is_empty() {
            return None;
        }

        let line1 = fields.get(FIELD_LINE_1)?;
        let line2 = fields.get(FIELD_LINE_2)?;
        let epoch = match fields
            .get(FIELD_EPOCH)
            .map(|raw| DateTime::parse_from_rfc3339(raw))
        {
            Some(Ok(epoch)) => epoch.with_timezone(&Utc),
            _ => {
                debug!("Cached TLE for {} has no usable epoch", norad_id);
                return None;
            }
        };
        Some(Tle::new(norad_id.clone(), line1.as_str(), line2.as_str(), epoch))
    }

    async fn populate(&self, tle: &Tle) {
        let key = Self::cache_key(&tle.norad_id);
        let fields = HashMap::from([
            (FIELD_LINE_1.to_string(), tle.line1.clone()),
            (FIELD_LINE_2.to_string(), tle.line2.clone()),
            (FIELD_EPOCH.to_string(), tle.epoch.to_rfc3339()),
            (FIELD_ID.to_string(), tle.norad_id.to_string()),
        ]);
        if let Err(e) = self.cache.hset(&key, fields).await {
            warn!("Failed to cache TLE {}: {}", tle.norad_id, e);
            return;
        }
        if let Err(e) = self.cache.expire(&key, self.ttl).await {
            warn!("Failed to set TTL on cached TLE {}: {}", tle.norad_id, e);
        }
    }

    async fn announce(&self, tle: &Tle) {
        let payload = match serde_json::to_string(tle) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode TLE update for {}: {}", tle.norad_id, e);
                return;
            }
        };
        if let Err(e) = self.cache.publish(TLE_UPDATES_CHANNEL, payload).await {
            warn!("Failed to publish TLE update for {}: {}", tle.norad_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::db::LocalRepository;
    use chrono::TimeZone;

    fn store() -> (TleStore, LocalRepository, LocalCache) {
        let repo = LocalRepository::new();
        let cache = LocalCache::new();
        let store = TleStore::new(Arc::new(repo.clone()), Arc::new(cache.clone()));
        (store, repo, cache)
    }

    fn tle(day: u32) -> Tle {
        Tle::new(
            "25544",
            "1 25544U line",
            "2 25544 line",
            Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_malformed_cache_entry_falls_back_to_storage() {
        let (store, repo, cache) = store();
        repo.upsert_tle(&tle(1)).await.unwrap();
        cache
            .hset(
                "satellite:tle:25544",
                HashMap::from([("epoch".to_string(), "not a date".to_string())]),
            )
            .await
            .unwrap();

        let got = store.get(&"25544".into()).await.unwrap();
        assert_eq!(got, tle(1));
        assert_eq!(repo.tle_read_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_update_leaves_cache_alone() {
        let (store, _repo, cache) = store();
        assert!(store.update(&tle(5)).await.unwrap());
        assert!(!store.update(&tle(2)).await.unwrap());
        let cached = cache.hget_all("satellite:tle:25544").await.unwrap();
        assert_eq!(cached.get("epoch"), Some(&tle(5).epoch.to_rfc3339()));
        assert_eq!(cache.published_on(TLE_UPDATES_CHANNEL).len(), 1);
    }

    #[tokio::test]
    async fn test_missing_tle_is_not_found() {
        let (store, _repo, _cache) = store();
        assert!(matches!(
            store.get(&"1".into()).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
