//! Distributed cache port.
//!
//! The transport is not owned by this crate. Anything that can store JSON
//! values by key with a TTL can back the shared tier.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::distributed";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("distributed cache unavailable: {0}")]
    Unavailable(String),
    #[error("failed to encode cache value for `{key}`: {message}")]
    Encode { key: String, message: String },
    #[error("failed to decode cache value for `{key}`: {message}")]
    Decode { key: String, message: String },
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

#[async_trait]
pub trait DistributedCache: Send + Sync {
    fn enabled(&self) -> bool;

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;

    async fn clear(&self, keys: &[String]) -> Result<(), CacheError>;
}

/// Process-local stand-in for a shared cache.
///
/// Several cache tiers (or several managers) holding the same instance see
/// each other's writes, which is all a single-node deployment needs.
#[derive(Default)]
pub struct MemoryDistributedCache {
    entries: RwLock<HashMap<String, (Value, Instant, Duration)>>,
}

impl MemoryDistributedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        rw_read(&self.entries, SOURCE, "contains").contains_key(key)
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DistributedCache for MemoryDistributedCache {
    fn enabled(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some((value, stored_at, ttl)) if now.saturating_duration_since(*stored_at) <= *ttl => {
                return Ok(Some(value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "set").insert(key.to_string(), (value, Instant::now(), ttl));
        Ok(())
    }

    async fn clear(&self, keys: &[String]) -> Result<(), CacheError> {
        let mut entries = rw_write(&self.entries, SOURCE, "clear");
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}
