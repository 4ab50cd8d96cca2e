//! Vellum cache tiers.
//!
//! Every cache is a [`CacheTier`]: either a bounded in-process
//! [`LocalCache`] or a [`LayeredCache`] that puts the local tier in front of
//! a [`DistributedCache`]. Which one a namespace gets is decided once, from
//! configuration, by [`build_tier`].
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! local_ttl_secs = 300
//! max_entries = 100
//! distributed_enabled = false
//! distributed_ttl_secs = 300
//! ```

mod config;
mod distributed;
mod keys;
mod layered;
pub(crate) mod lock;
mod store;
mod tier;

pub use config::CacheConfig;
pub use distributed::{CacheError, DistributedCache, MemoryDistributedCache};
pub use keys::{
    ALL_COLLECTIONS_KEY, CONTENT_STRUCTURE_KEY, Namespace, distributed_key, lazy_collection_key,
    source_key,
};
pub use layered::LayeredCache;
pub use store::LocalCache;
pub use tier::{CacheTier, build_tier};
