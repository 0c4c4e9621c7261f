//! On-demand visibility lookups driven by the message bus.
//!
//! Clients publish a [`VisibilityRequest`] on `visibility_requests`. Every
//! satellite mapped to a tile around the requested location is answered with
//! a [`VisibilityRecord`] on `user_visibilities_event:<uid>`, and the whole
//! set is cached at `satellite_visibilities:<uid>` until the next request of
//! the same user overwrites it.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::tle_store::TleStore;
use crate::cache::CacheBus;
use crate::db::repository::{
    FullRepository, MappingRepository, SatelliteRepository, TileRepository,
};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{TileId, UserLocation, VisibilityRecord, VisibilityRequest};

pub const VISIBILITY_REQUESTS_CHANNEL: &str = "visibility_requests";
pub const USER_VISIBILITY_EVENT_PREFIX: &str = "user_visibilities_event:";
pub const USER_VISIBILITY_CACHE_PREFIX: &str = "satellite_visibilities:";

/// Requests answered concurrently by one listener unless configured otherwise.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Horizon reported to users whose request carries none, in degrees.
pub const DEFAULT_USER_HORIZON_DEG: f64 = 30.0;

/// Counters of one subscription loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RealtimeStats {
    pub received: usize,
    pub served: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Highest number of requests answered at the same time.
    pub peak_in_flight: usize,
}

#[derive(Clone)]
pub struct RealtimeVisibilityService {
    repo: Arc<dyn FullRepository>,
    tle_store: TleStore,
    cache: Arc<dyn CacheBus>,
    default_horizon: f64,
    max_in_flight: usize,
}

impl RealtimeVisibilityService {
    pub fn new(repo: Arc<dyn FullRepository>, tle_store: TleStore, cache: Arc<dyn CacheBus>) -> Self {
        Self {
            repo,
            tle_store,
            cache,
            default_horizon: DEFAULT_USER_HORIZON_DEG,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Cap on requests answered at once. Zero is treated as one.
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn with_default_horizon(mut self, horizon: f64) -> Self {
        self.default_horizon = horizon;
        self
    }

    pub fn default_horizon(&self) -> f64 {
        self.default_horizon
    }

    pub fn event_channel(uid: &str) -> String {
        format!("{}{}", USER_VISIBILITY_EVENT_PREFIX, uid)
    }

    pub fn cache_key(uid: &str) -> String {
        format!("{}{}", USER_VISIBILITY_CACHE_PREFIX, uid)
    }

    /// Listen on the request channel until `cancel` fires or the channel closes.
    ///
    /// Each message is handled on its own task so a slow lookup does not hold
    /// back the next message. At most `max_in_flight` messages are handled at
    /// once and the channel is not read while that many are pending. Invalid
    /// messages are logged and counted, the loop keeps running. Requests
    /// still in flight at shutdown complete before the subscription is
    /// released.
    pub async fn run(&self, cancel: CancellationToken) -> ServiceResult<RealtimeStats> {
        let mut subscription = self.cache.subscribe(VISIBILITY_REQUESTS_CHANNEL).await?;
        info!("Listening for visibility requests on {}", subscription.channel());

        let mut stats = RealtimeStats::default();
        let mut in_flight: JoinSet<ServiceResult<usize>> = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Visibility request listener cancelled");
                    break;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    record_outcome(&mut stats, joined);
                }
                message = subscription.next_message(), if in_flight.len() < self.max_in_flight => {
                    let Some(payload) = message else {
                        info!("Visibility request channel closed");
                        break;
                    };
                    stats.received += 1;
                    let service = self.clone();
                    in_flight.spawn(async move { service.handle_message(&payload).await.map(|r| r.len()) });
                    stats.peak_in_flight = stats.peak_in_flight.max(in_flight.len());
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            record_outcome(&mut stats, joined);
        }
        subscription.unsubscribe().await?;
        info!(
            "Visibility request listener stopped: {} received, {} served, {} rejected, {} failed",
            stats.received, stats.served, stats.rejected, stats.failed
        );
        Ok(stats)
    }

    /// Decode and answer one raw bus message.
    pub async fn handle_message(&self, payload: &str) -> ServiceResult<Vec<VisibilityRecord>> {
        let request: VisibilityRequest = serde_json::from_str(payload)
            .map_err(|e| ServiceError::validation(format!("Malformed visibility request: {}", e)))?;
        self.handle_request(&request).await
    }

    /// Answer one request: publish a record per visible satellite and cache the set.
    ///
    /// # Returns
    /// * `Ok(records)` - possibly empty when no tile or mapping matches
    /// * `Err(ServiceError::Validation)` - coordinates, radius or time bounds are invalid
    /// * `Err(ServiceError::Persistence)` - a repository lookup failed
    pub async fn handle_request(&self, request: &VisibilityRequest) -> ServiceResult<Vec<VisibilityRecord>> {
        request.validate()?;
        debug!(
            "Visibility request of {} at ({:.6}, {:.6}) radius {:.0} m from {} to {}",
            request.uid,
            request.latitude,
            request.longitude,
            request.radius,
            request.start_time,
            request.end_time
        );

        let tiles = self
            .repo
            .find_tiles_intersecting_location(request.latitude, request.longitude, request.radius)
            .await?;
        let records = if tiles.is_empty() {
            debug!("No tiles around the location of {}", request.uid);
            Vec::new()
        } else {
            let tile_ids: Vec<TileId> = tiles.into_iter().map(|t| t.quadkey).collect();
            self.build_records(request, &tile_ids).await?
        };

        for record in &records {
            match serde_json::to_string(record) {
                Ok(payload) => {
                    if let Err(e) = self.cache.publish(&Self::event_channel(&request.uid), payload).await {
                        warn!("Failed to publish visibility of {} to {}: {}", record.satellite_id, request.uid, e);
                    }
                }
                Err(e) => warn!("Failed to encode visibility of {}: {}", record.satellite_id, e),
            }
        }

        let snapshot = serde_json::to_string(&records)
            .map_err(|e| ServiceError::Persistence(format!("Failed to encode visibility set: {}", e)))?;
        if let Err(e) = self.cache.set(&Self::cache_key(&request.uid), snapshot, None).await {
            warn!("Failed to cache visibilities of {}: {}", request.uid, e);
        }

        info!("Answered {} with {} visible satellites", request.uid, records.len());
        Ok(records)
    }

    async fn build_records(
        &self,
        request: &VisibilityRequest,
        tile_ids: &[TileId],
    ) -> ServiceResult<Vec<VisibilityRecord>> {
        let norad_ids = self.repo.find_satellites_for_tiles(tile_ids).await?;
        if norad_ids.is_empty() {
            debug!("No satellites mapped to the {} tiles of {}", tile_ids.len(), request.uid);
            return Ok(Vec::new());
        }

        let names: HashMap<_, _> = self
            .repo
            .find_satellites_by_ids(&norad_ids)
            .await?
            .into_iter()
            .map(|s| (s.norad_id, s.name))
            .collect();
        let (tles, missing) = self.tle_store.get_many(&norad_ids).await?;
        if !missing.is_empty() {
            debug!("{} satellites of {} have no TLE", missing.len(), request.uid);
        }
        let tles: HashMap<_, _> = tles.into_iter().map(|t| (t.norad_id.clone(), t)).collect();

        let location = UserLocation {
            latitude: request.latitude,
            longitude: request.longitude,
            radius: request.radius,
            horizon: request.horizon.unwrap_or(self.default_horizon),
            uid: request.uid.clone(),
        };

        Ok(norad_ids
            .into_iter()
            .map(|id| {
                let (line1, line2) = tles
                    .get(&id)
                    .map(|t| (t.line1.clone(), t.line2.clone()))
                    .unwrap_or_default();
                VisibilityRecord {
                    satellite_name: names.get(&id).cloned().unwrap_or_else(|| id.to_string()),
                    satellite_id: id,
                    start_time: request.start_time,
                    end_time: request.end_time,
                    tle_line1: line1,
                    tle_line2: line2,
                    user_location: location.clone(),
                    user_uid: request.uid.clone(),
                }
            })
            .collect())
    }
}

fn record_outcome(
    stats: &mut RealtimeStats,
    joined: Result<ServiceResult<usize>, tokio::task::JoinError>,
) {
    match joined {
        Ok(Ok(_)) => stats.served += 1,
        Ok(Err(ServiceError::Validation(message))) => {
            warn!("Rejected visibility request: {}", message);
            stats.rejected += 1;
        }
        Ok(Err(e)) => {
            warn!("Visibility request failed: {}", e);
            stats.failed += 1;
        }
        Err(e) => {
            warn!("Visibility request task aborted: {}", e);
            stats.failed += 1;
        }
    }
}
