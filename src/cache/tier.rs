//! Cache tier interface and configuration-driven selection.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;

use super::config::CacheConfig;
use super::distributed::DistributedCache;
use super::keys::Namespace;
use super::layered::LayeredCache;
use super::store::LocalCache;

/// A bounded key → value cache for one namespace.
#[async_trait]
pub trait CacheTier<T>: Send + Sync {
    async fn get(&self, key: &str) -> Option<T>;

    async fn set(&self, key: &str, value: T);

    async fn clear(&self, key: &str);

    /// Drop every entry this tier knows about.
    async fn clear_all(&self);

    /// Entries currently held in process.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<T> CacheTier<T> for LocalCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<T> {
        LocalCache::get(self, key)
    }

    async fn set(&self, key: &str, value: T) {
        self.insert(key, value);
    }

    async fn clear(&self, key: &str) {
        self.remove(key);
    }

    async fn clear_all(&self) {
        LocalCache::clear(self);
    }

    fn len(&self) -> usize {
        LocalCache::len(self)
    }
}

/// Build the tier for `namespace`: layered when the distributed cache is
/// enabled and a client is available, local otherwise.
pub fn build_tier<T>(
    namespace: Namespace,
    config: &CacheConfig,
    remote: Option<Arc<dyn DistributedCache>>,
) -> Arc<dyn CacheTier<T>>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let local = LocalCache::new(namespace, config);
    match remote {
        Some(remote) if config.distributed_enabled => {
            Arc::new(LayeredCache::new(local, remote, config))
        }
        None if config.distributed_enabled => {
            warn!(
                namespace = %namespace,
                "distributed cache enabled without a client; using the local tier only"
            );
            Arc::new(local)
        }
        _ => Arc::new(local),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::distributed::MemoryDistributedCache;

    #[tokio::test]
    async fn disabled_distributed_cache_keeps_writes_local() {
        let remote = Arc::new(MemoryDistributedCache::new());
        let tier: Arc<dyn CacheTier<String>> = build_tier(
            Namespace::FileHash,
            &CacheConfig::default(),
            Some(remote.clone() as Arc<dyn DistributedCache>),
        );

        tier.set("posts/news.js", "abc".to_string()).await;

        assert_eq!(tier.get("posts/news.js").await.as_deref(), Some("abc"));
        assert!(remote.is_empty());
    }

    #[tokio::test]
    async fn enabled_distributed_cache_is_layered() {
        let remote = Arc::new(MemoryDistributedCache::new());
        let config = CacheConfig {
            distributed_enabled: true,
            ..Default::default()
        };
        let tier: Arc<dyn CacheTier<String>> =
            build_tier(
                Namespace::FileHash,
                &config,
                Some(remote.clone() as Arc<dyn DistributedCache>),
            );

        tier.set("posts/news.js", "abc".to_string()).await;
        assert!(remote.contains("cms:file_hash:generation"));
        assert_eq!(remote.len(), 2);

        tier.clear_all().await;
        assert!(tier.is_empty());
        assert_eq!(remote.len(), 1);
        assert!(tier.get("posts/news.js").await.is_none());
    }

    #[tokio::test]
    async fn enabled_without_client_falls_back_to_local() {
        let config = CacheConfig {
            distributed_enabled: true,
            ..Default::default()
        };
        let tier: Arc<dyn CacheTier<String>> = build_tier(Namespace::Snapshot, &config, None);

        tier.set("all_collections", "[]".to_string()).await;
        tier.clear("all_collections").await;
        assert!(tier.get("all_collections").await.is_none());
    }
}
