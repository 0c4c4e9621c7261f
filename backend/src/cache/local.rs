//! In-memory cache and message bus.
//!
//! Keys expire on access, and expired keys are swept every
//! [`SWEEP_INTERVAL`] writes. Each pub/sub channel is a
//! `tokio::sync::broadcast` channel created on first subscription; publishing
//! to a channel nobody listens to reaches zero subscribers but is still
//! recorded in the publish log. The log keeps the latest
//! [`DEFAULT_PUBLISH_LOG_CAPACITY`] messages.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use super::{CacheBus, CacheError, CacheResult, Subscription};

const CHANNEL_CAPACITY: usize = 1024;

/// Messages kept in the publish log of a cache built with [`LocalCache::new`].
pub const DEFAULT_PUBLISH_LOG_CAPACITY: usize = 1024;

/// Writes between two sweeps of expired keys.
pub const SWEEP_INTERVAL: usize = 256;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    SortedSet(Vec<(f64, String)>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

struct CacheData {
    entries: HashMap<String, Entry>,
    channels: HashMap<String, broadcast::Sender<String>>,
    published: VecDeque<(String, String)>,
    publish_log_capacity: usize,
    ttls: HashMap<String, Duration>,
    writes_since_sweep: usize,
    unavailable: bool,
}

impl CacheData {
    fn with_publish_log(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            channels: HashMap::new(),
            published: VecDeque::new(),
            publish_log_capacity: capacity,
            ttls: HashMap::new(),
            writes_since_sweep: 0,
            unavailable: false,
        }
    }

    /// Live entry for `key`, dropping it first when expired.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
            self.ttls.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn remove_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.entries.remove(key);
            self.ttls.remove(key);
        }
        self.writes_since_sweep = 0;
        expired.len()
    }

    /// Count a write and sweep expired keys once every [`SWEEP_INTERVAL`] writes.
    fn note_write(&mut self) {
        self.writes_since_sweep += 1;
        if self.writes_since_sweep >= SWEEP_INTERVAL {
            self.remove_expired();
        }
    }

    fn record_publish(&mut self, channel: &str, payload: &str) {
        if self.publish_log_capacity == 0 {
            return;
        }
        while self.published.len() >= self.publish_log_capacity {
            self.published.pop_front();
        }
        self.published.push_back((channel.to_string(), payload.to_string()));
    }
}

/// In-memory [`CacheBus`].
///
/// Clones share state.
#[derive(Clone)]
pub struct LocalCache {
    data: Arc<RwLock<CacheData>>,
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::with_publish_log(DEFAULT_PUBLISH_LOG_CAPACITY)
    }
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache whose publish log keeps the latest `capacity` messages. Zero
    /// disables the log.
    pub fn with_publish_log(capacity: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(CacheData::with_publish_log(capacity))),
        }
    }

    /// Drop every expired key now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.data.write().remove_expired()
    }

    /// Number of keys held, expired ones included until swept.
    pub fn key_count(&self) -> usize {
        self.data.read().entries.len()
    }

    /// Make every subsequent operation fail with [`CacheError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.data.write().unavailable = !available;
    }

    /// Logged `(channel, payload)` pairs, oldest first.
    pub fn published(&self) -> Vec<(String, String)> {
        self.data.read().published.iter().cloned().collect()
    }

    /// Payloads published on one channel.
    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.data
            .read()
            .published
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Last TTL applied to `key` through `expire` or `set`.
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.data.read().ttls.get(key).copied()
    }

    /// Current number of live subscriptions on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.data
            .read()
            .channels
            .get(channel)
            .map_or(0, |tx| tx.receiver_count())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.write().live(key).is_some()
    }

    fn check_available(&self, operation: &str) -> CacheResult<()> {
        if self.data.read().unavailable {
            return Err(CacheError::Unavailable(format!(
                "{} rejected, local cache is switched off",
                operation
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBus for LocalCache {
    async fn hset(&self, key: &str, fields: HashMap<String, String>) -> CacheResult<()> {
        self.check_available("hset")?;
        let mut data = self.data.write();
        data.note_write();
        match data.live(key) {
            Some(Entry {
                value: Value::Hash(existing),
                ..
            }) => {
                existing.extend(fields);
            }
            Some(_) => return Err(CacheError::WrongType { key: key.into() }),
            None => {
                data.entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Hash(fields),
                        expires_at: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn hget_all(&self, key: &str) -> CacheResult<HashMap<String, String>> {
        self.check_available("hget_all")?;
        match self.data.write().live(key) {
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.clone()),
            Some(_) => Err(CacheError::WrongType { key: key.into() }),
            None => Ok(HashMap::new()),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.check_available("expire")?;
        let mut data = self.data.write();
        let Some(entry) = data.live(key) else {
            return Ok(false);
        };
        entry.expires_at = Some(Instant::now() + ttl);
        data.ttls.insert(key.to_string(), ttl);
        Ok(true)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()> {
        self.check_available("set")?;
        let mut data = self.data.write();
        data.note_write();
        data.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        match ttl {
            Some(d) => data.ttls.insert(key.to_string(), d),
            None => data.ttls.remove(key),
        };
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check_available("get")?;
        match self.data.write().live(key) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(CacheError::WrongType { key: key.into() }),
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> CacheResult<bool> {
        self.check_available("del")?;
        let mut data = self.data.write();
        let existed = data.live(key).is_some();
        data.entries.remove(key);
        data.ttls.remove(key);
        Ok(existed)
    }

    async fn publish(&self, channel: &str, payload: String) -> CacheResult<usize> {
        self.check_available("publish")?;
        let mut data = self.data.write();
        data.record_publish(channel, &payload);
        // send only fails when there are no receivers
        Ok(data
            .channels
            .get(channel)
            .and_then(|tx| tx.send(payload).ok())
            .unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> CacheResult<Box<dyn Subscription>> {
        self.check_available("subscribe")?;
        let mut data = self.data.write();
        let rx = data
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        log::debug!("Subscribed to channel {}", channel);
        Ok(Box::new(LocalSubscription {
            channel: channel.to_string(),
            rx,
        }))
    }

    async fn zadd(&self, key: &str, score: f64, member: String) -> CacheResult<()> {
        self.check_available("zadd")?;
        let mut data = self.data.write();
        data.note_write();
        match data.live(key) {
            Some(Entry {
                value: Value::SortedSet(members),
                ..
            }) => {
                members.retain(|(_, m)| m != &member);
                members.push((score, member));
                members.sort_by(|a, b| a.0.total_cmp(&b.0));
            }
            Some(_) => return Err(CacheError::WrongType { key: key.into() }),
            None => {
                data.entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::SortedSet(vec![(score, member)]),
                        expires_at: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> CacheResult<Vec<String>> {
        self.check_available("zrange_by_score")?;
        match self.data.write().live(key) {
            Some(Entry {
                value: Value::SortedSet(members),
                ..
            }) => Ok(members
                .iter()
                .filter(|(score, _)| *score >= min && *score <= max)
                .map(|(_, m)| m.clone())
                .collect()),
            Some(_) => Err(CacheError::WrongType { key: key.into() }),
            None => Ok(Vec::new()),
        }
    }
}

struct LocalSubscription {
    channel: String,
    rx: broadcast::Receiver<String>,
}

#[async_trait]
impl Subscription for LocalSubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn next_message(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "Subscriber on {} lagged, {} messages dropped",
                        self.channel,
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn unsubscribe(self: Box<Self>) -> CacheResult<()> {
        log::debug!("Unsubscribed from channel {}", self.channel);
        Ok(())
    }
}
