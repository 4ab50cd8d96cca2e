//! Persisted content-structure nodes.

use serde::{Deserialize, Serialize};

pub const FOLDER_ICON: &str = "bi:folder";
pub const FILE_ICON: &str = "bi:file";
const CATEGORY_ID_PREFIX: &str = "category:";

/// A category-or-collection row in the persisted content structure.
///
/// Collection nodes share the identifier of their schema. Pure categories
/// (intermediate path segments) carry a synthetic identifier derived from
/// their path, so re-running a pass never mints a second node for the same
/// segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentNode {
    pub id: String,
    pub path: String,
    pub name: String,
    pub icon: String,
    pub order: i32,
    pub is_collection: bool,
}

/// Fields of a node that may change across passes. The identifier never does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentNodeUpdate {
    pub path: String,
    pub name: String,
    pub icon: String,
    pub order: i32,
    pub is_collection: bool,
}

impl ContentNode {
    pub fn apply(&mut self, update: &ContentNodeUpdate) {
        self.path = update.path.clone();
        self.name = update.name.clone();
        self.icon = update.icon.clone();
        self.order = update.order;
        self.is_collection = update.is_collection;
    }

    pub fn matches(&self, update: &ContentNodeUpdate) -> bool {
        self.path == update.path
            && self.name == update.name
            && self.icon == update.icon
            && self.order == update.order
            && self.is_collection == update.is_collection
    }
}

/// Synthetic identifier for the pure category living at `path`.
pub fn category_id(path: &str) -> String {
    format!("{CATEGORY_ID_PREFIX}{path}")
}

pub fn is_category_id(id: &str) -> bool {
    id.starts_with(CATEGORY_ID_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_ids_are_stable_per_path() {
        assert_eq!(category_id("/posts"), category_id("/posts"));
        assert_ne!(category_id("/posts"), category_id("/pages"));
        assert!(is_category_id(&category_id("/posts")));
        assert!(!is_category_id("0f8fad5b-d9cb-469f-a165-70867728950e"));
    }

    #[test]
    fn apply_keeps_identifier() {
        let mut node = ContentNode {
            id: "abc".into(),
            path: "/old".into(),
            name: "old".into(),
            icon: FILE_ICON.into(),
            order: 1,
            is_collection: false,
        };
        let update = ContentNodeUpdate {
            path: "/new".into(),
            name: "new".into(),
            icon: FOLDER_ICON.into(),
            order: 3,
            is_collection: true,
        };

        assert!(!node.matches(&update));
        node.apply(&update);
        assert!(node.matches(&update));
        assert_eq!(node.id, "abc");
    }
}
