//! Cache namespaces and key construction.

use std::fmt;
use std::path::Path;

pub const ALL_COLLECTIONS_KEY: &str = "all_collections";
pub const CONTENT_STRUCTURE_KEY: &str = "content_structure";
/// Distributed key holding a namespace's current generation token.
pub(crate) const GENERATION_KEY: &str = "generation";

/// Logical tier a key belongs to. Namespaces keep identical keys in different
/// tiers apart once they reach the shared distributed store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Schema records keyed by source file, plus lazily loaded collections.
    Schema,
    /// SHA-256 of each source file's content.
    FileHash,
    /// Whole-pass results: collection list and category tree.
    Snapshot,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Schema => "schema",
            Namespace::FileHash => "file_hash",
            Namespace::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key under which a lazily loaded collection is cached.
pub fn lazy_collection_key(name: &str) -> String {
    format!("collection_{name}")
}

/// Key for per-file entries in the Schema and FileHash tiers.
pub fn source_key(file: &Path) -> String {
    file.to_string_lossy().into_owned()
}

/// Fully qualified key in the distributed store.
pub fn distributed_key(prefix: &str, namespace: Namespace, key: &str) -> String {
    format!("{prefix}:{namespace}:{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distributed_keys_are_namespaced() {
        assert_eq!(
            distributed_key("cms", Namespace::Snapshot, ALL_COLLECTIONS_KEY),
            "cms:snapshot:all_collections"
        );
        assert_ne!(
            distributed_key("cms", Namespace::Schema, "posts/news.js"),
            distributed_key("cms", Namespace::FileHash, "posts/news.js")
        );
        assert_eq!(lazy_collection_key("posts"), "collection_posts");
    }
}
