//! In-process cache tier.
//!
//! A bounded key → value map with a per-entry capture timestamp. Entries are
//! kept in write order: reads never promote, so eviction always removes the
//! oldest-written entries first.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;

use super::config::CacheConfig;
use super::keys::Namespace;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
pub(crate) const METRIC_CACHE_HIT: &str = "vellum_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "vellum_cache_miss_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "vellum_cache_evict_total";

struct CacheEntry<T> {
    value: T,
    captured_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            captured_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.captured_at) > ttl
    }
}

/// Local LRU + TTL tier.
pub struct LocalCache<T> {
    namespace: Namespace,
    ttl: Duration,
    max_entries: NonZeroUsize,
    entries: RwLock<LruCache<String, CacheEntry<T>>>,
}

impl<T: Clone> LocalCache<T> {
    pub fn new(namespace: Namespace, config: &CacheConfig) -> Self {
        Self::with_limits(namespace, config.local_ttl(), config.max_entries_non_zero())
    }

    pub fn with_limits(namespace: Namespace, ttl: Duration, max_entries: NonZeroUsize) -> Self {
        Self {
            namespace,
            ttl,
            max_entries,
            entries: RwLock::new(LruCache::unbounded()),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Look up `key`; an entry older than the TTL is purged and reported absent.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");

        let expired = match entries.peek(key) {
            Some(entry) if !entry.is_expired(self.ttl, now) => {
                counter!(METRIC_CACHE_HIT, "tier" => self.namespace.as_str()).increment(1);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
        }
        counter!(METRIC_CACHE_MISS, "tier" => self.namespace.as_str()).increment(1);
        None
    }

    /// Store `value` with a fresh timestamp, then trim.
    ///
    /// Returns the keys evicted to get back under the size limit.
    pub fn insert(&self, key: &str, value: T) -> Vec<String> {
        let mut entries = rw_write(&self.entries, SOURCE, "insert");
        entries.put(key.to_string(), CacheEntry::new(value));
        self.trim_locked(&mut entries)
    }

    /// Evict oldest-written entries until the tier is within its limit.
    pub fn trim(&self) -> Vec<String> {
        let mut entries = rw_write(&self.entries, SOURCE, "trim");
        self.trim_locked(&mut entries)
    }

    fn trim_locked(&self, entries: &mut LruCache<String, CacheEntry<T>>) -> Vec<String> {
        let mut evicted = Vec::new();
        while entries.len() > self.max_entries.get() {
            match entries.pop_lru() {
                Some((key, _)) => evicted.push(key),
                None => break,
            }
        }
        if !evicted.is_empty() {
            counter!(METRIC_CACHE_EVICT, "tier" => self.namespace.as_str())
                .increment(evicted.len() as u64);
        }
        evicted
    }

    pub fn remove(&self, key: &str) -> bool {
        rw_write(&self.entries, SOURCE, "remove").pop(key).is_some()
    }

    /// Drop every entry, returning the keys that were held.
    pub fn clear(&self) -> Vec<String> {
        let mut entries = rw_write(&self.entries, SOURCE, "clear");
        let keys = entries.iter().map(|(key, _)| key.clone()).collect();
        entries.clear();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        rw_read(&self.entries, SOURCE, "contains").contains(key)
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn cache(ttl_secs: u64, max_entries: usize) -> LocalCache<String> {
        LocalCache::with_limits(
            Namespace::Schema,
            Duration::from_secs(ttl_secs),
            NonZeroUsize::new(max_entries).expect("non-zero limit"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn round_trip_within_ttl() {
        let cache = cache(300, 10);
        cache.insert("posts", "v1".to_string());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("posts").as_deref(), Some("v1"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_purged_on_read() {
        let cache = cache(300, 10);
        cache.insert("posts", "v1".to_string());

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(cache.get("posts").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rewrite_refreshes_timestamp() {
        let cache = cache(300, 10);
        cache.insert("posts", "v1".to_string());
        tokio::time::advance(Duration::from_secs(200)).await;
        cache.insert("posts", "v2".to_string());
        tokio::time::advance(Duration::from_secs(200)).await;

        assert_eq!(cache.get("posts").as_deref(), Some("v2"));
    }

    #[test]
    fn size_bound_keeps_most_recently_written() {
        let cache = cache(300, 3);
        let mut evicted = Vec::new();
        for index in 0..5 {
            evicted.extend(cache.insert(&format!("key-{index}"), index.to_string()));
        }

        assert_eq!(cache.len(), 3);
        assert_eq!(evicted, vec!["key-0".to_string(), "key-1".to_string()]);
        for index in 2..5 {
            assert!(cache.contains(&format!("key-{index}")));
        }
    }

    #[test]
    fn reads_do_not_protect_old_entries() {
        let cache = cache(300, 2);
        cache.insert("a", "a".to_string());
        cache.insert("b", "b".to_string());
        assert!(cache.get("a").is_some());

        let evicted = cache.insert("c", "c".to_string());
        assert_eq!(evicted, vec!["a".to_string()]);
    }

    #[test]
    fn clear_returns_held_keys() {
        let cache = cache(300, 10);
        cache.insert("a", "a".to_string());
        cache.insert("b", "b".to_string());

        let mut keys = cache.clear();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert!(cache.is_empty());
    }

    #[test]
    fn recovers_from_poisoned_lock() {
        let cache = cache(300, 10);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = cache
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        cache.insert("a", "a".to_string());
        assert_eq!(cache.get("a").as_deref(), Some("a"));
    }
}
