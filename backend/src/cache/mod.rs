//! Cache and message-bus contract.
//!
//! The shape follows a Redis-like store: string keys with TTL, hashes, sorted
//! sets and pub/sub channels. Cache failures are never fatal for callers, the
//! durable repositories remain the source of truth.

pub mod local;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

pub use local::LocalCache;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// The key holds a value of another kind (e.g. a hash read as a string).
    #[error("Wrong value type for key {key}")]
    WrongType { key: String },

    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Key/value, hash, sorted-set and pub/sub primitives.
#[async_trait]
pub trait CacheBus: Send + Sync {
    /// Set hash fields, creating the hash when missing.
    async fn hset(&self, key: &str, fields: HashMap<String, String>) -> CacheResult<()>;

    /// All fields of a hash, empty when the key does not exist.
    async fn hget_all(&self, key: &str) -> CacheResult<HashMap<String, String>>;

    /// Attach a TTL to an existing key. `Ok(false)` when the key is missing.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Store a string value, without expiry when `ttl` is `None`.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CacheResult<()>;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Delete a key of any kind. `Ok(true)` when something was removed.
    async fn del(&self, key: &str) -> CacheResult<bool>;

    /// Publish on a channel, returning the number of subscribers reached.
    async fn publish(&self, channel: &str, payload: String) -> CacheResult<usize>;

    async fn subscribe(&self, channel: &str) -> CacheResult<Box<dyn Subscription>>;

    async fn zadd(&self, key: &str, score: f64, member: String) -> CacheResult<()>;

    /// Members with `min <= score <= max`, ordered by score.
    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> CacheResult<Vec<String>>;
}

/// A live subscription to one channel.
#[async_trait]
pub trait Subscription: Send {
    fn channel(&self) -> &str;

    /// Next payload, `None` once the channel is closed.
    async fn next_message(&mut self) -> Option<String>;

    /// Leave the channel.
    async fn unsubscribe(self: Box<Self>) -> CacheResult<()>;
}
