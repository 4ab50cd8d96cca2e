//! Local tier layered in front of the distributed cache.
//!
//! The distributed cache is authoritative across processes and is consulted
//! first. The local tier mirrors it with its own TTL, so a lost remote
//! invalidation leaves local staleness bounded by that TTL.
//!
//! Remote keys carry the namespace generation, a token stored in the
//! distributed cache itself. `clear_all` replaces the token, which retires
//! every entry of the namespace no matter which process wrote it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::config::CacheConfig;
use super::distributed::{CacheError, DistributedCache};
use super::keys::{GENERATION_KEY, distributed_key};
use super::store::LocalCache;
use super::tier::CacheTier;

const GENERATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct LayeredCache<T> {
    local: LocalCache<T>,
    remote: Arc<dyn DistributedCache>,
    prefix: String,
    remote_ttl: Duration,
}

impl<T> LayeredCache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(local: LocalCache<T>, remote: Arc<dyn DistributedCache>, config: &CacheConfig) -> Self {
        Self {
            local,
            remote,
            prefix: config.key_prefix.clone(),
            remote_ttl: config.distributed_ttl(),
        }
    }

    fn generation_key(&self) -> String {
        distributed_key(&self.prefix, self.local.namespace(), GENERATION_KEY)
    }

    /// Current namespace generation; a missing token is minted on the spot.
    async fn generation(&self) -> Result<String, CacheError> {
        match self.remote.get(&self.generation_key()).await? {
            Some(Value::String(token)) => Ok(token),
            _ => self.bump_generation().await,
        }
    }

    async fn bump_generation(&self) -> Result<String, CacheError> {
        let token = Uuid::new_v4().simple().to_string();
        self.remote
            .set(
                &self.generation_key(),
                Value::String(token.clone()),
                GENERATION_TTL.max(self.remote_ttl),
            )
            .await?;
        Ok(token)
    }

    async fn remote_key(&self, key: &str) -> Result<String, CacheError> {
        let generation = self.generation().await?;
        Ok(distributed_key(
            &self.prefix,
            self.local.namespace(),
            &format!("{generation}:{key}"),
        ))
    }

    async fn fetch_remote(&self, key: &str) -> Result<Option<T>, CacheError> {
        let remote_key = self.remote_key(key).await?;
        let Some(value) = self.remote.get(&remote_key).await? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|err| CacheError::Decode {
                key: remote_key,
                message: err.to_string(),
            })
    }

    async fn store_remote(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let remote_key = self.remote_key(key).await?;
        let encoded = serde_json::to_value(value).map_err(|err| CacheError::Encode {
            key: remote_key.clone(),
            message: err.to_string(),
        })?;
        self.remote.set(&remote_key, encoded, self.remote_ttl).await
    }

    async fn store_local(&self, key: &str, value: T) {
        let evicted = self.local.insert(key, value);
        self.propagate_evictions(evicted).await;
    }

    async fn clear_remote(&self, keys: &[String]) -> Result<(), CacheError> {
        let generation = self.generation().await?;
        let remote_keys: Vec<String> = keys
            .iter()
            .map(|key| {
                distributed_key(
                    &self.prefix,
                    self.local.namespace(),
                    &format!("{generation}:{key}"),
                )
            })
            .collect();
        self.remote.clear(&remote_keys).await
    }

    async fn propagate_evictions(&self, evicted: Vec<String>) {
        if evicted.is_empty() {
            return;
        }
        if let Err(err) = self.clear_remote(&evicted).await {
            warn!(
                namespace = %self.local.namespace(),
                evicted = evicted.len(),
                error = %err,
                "Failed to propagate local evictions to the distributed cache"
            );
        }
    }
}

#[async_trait]
impl<T> CacheTier<T> for LayeredCache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<T> {
        if self.remote.enabled() {
            match self.fetch_remote(key).await {
                Ok(Some(value)) => {
                    self.store_local(key, value.clone()).await;
                    return Some(value);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        namespace = %self.local.namespace(),
                        key,
                        error = %err,
                        "Distributed cache read failed; falling back to the local tier"
                    );
                }
            }
        }
        self.local.get(key)
    }

    async fn set(&self, key: &str, value: T) {
        if self.remote.enabled()
            && let Err(err) = self.store_remote(key, &value).await
        {
            warn!(
                namespace = %self.local.namespace(),
                key,
                error = %err,
                "Distributed cache write failed"
            );
        }
        self.store_local(key, value).await;
    }

    async fn clear(&self, key: &str) {
        if self.remote.enabled()
            && let Err(err) = self.clear_remote(&[key.to_string()]).await
        {
            warn!(
                namespace = %self.local.namespace(),
                key,
                error = %err,
                "Distributed cache clear failed"
            );
        }
        self.local.remove(key);
    }

    async fn clear_all(&self) {
        let keys = self.local.clear();
        debug!(
            namespace = %self.local.namespace(),
            cleared = keys.len(),
            "Clearing cache tier"
        );
        if !self.remote.enabled() {
            return;
        }
        self.propagate_evictions(keys).await;
        if let Err(err) = self.bump_generation().await {
            warn!(
                namespace = %self.local.namespace(),
                error = %err,
                "Failed to retire the distributed cache generation"
            );
        }
    }

    fn len(&self) -> usize {
        self.local.len()
    }
}
