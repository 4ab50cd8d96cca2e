//! Cache tier configuration.
//!
//! Controls the in-process tier and the optional distributed tier via
//! `vellum.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_LOCAL_TTL_SECS: u64 = 300;
const DEFAULT_DISTRIBUTED_TTL_SECS: u64 = 300;
const DEFAULT_MAX_ENTRIES: usize = 100;
const DEFAULT_KEY_PREFIX: &str = "cms";

/// Cache configuration from `vellum.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Age after which a local entry is treated as absent.
    pub local_ttl_secs: u64,
    /// Maximum entries held by each local tier.
    pub max_entries: usize,
    /// Layer the local tier in front of the distributed cache.
    pub distributed_enabled: bool,
    /// TTL handed to the distributed cache on write.
    pub distributed_ttl_secs: u64,
    /// Prefix for every distributed key.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_ttl_secs: DEFAULT_LOCAL_TTL_SECS,
            max_entries: DEFAULT_MAX_ENTRIES,
            distributed_enabled: false,
            distributed_ttl_secs: DEFAULT_DISTRIBUTED_TTL_SECS,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            local_ttl_secs: settings.local_ttl.as_secs(),
            max_entries: settings.max_entries.get(),
            distributed_enabled: settings.distributed_enabled,
            distributed_ttl_secs: settings.distributed_ttl.as_secs(),
            key_prefix: settings.key_prefix.clone(),
        }
    }
}

impl CacheConfig {
    pub fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.local_ttl_secs)
    }

    pub fn distributed_ttl(&self) -> Duration {
        Duration::from_secs(self.distributed_ttl_secs)
    }

    /// Returns the entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.local_ttl(), Duration::from_secs(300));
        assert_eq!(config.distributed_ttl(), Duration::from_secs(300));
        assert_eq!(config.max_entries, 100);
        assert!(!config.distributed_enabled);
        assert_eq!(config.key_prefix, "cms");
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            max_entries: 0,
            ..Default::default()
        };
        assert_eq!(config.max_entries_non_zero().get(), 1);
    }
}
