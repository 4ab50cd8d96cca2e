//! In-memory category tree served to consumers.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::paths::segments;
use super::schema::{SchemaRecord, Translation};

/// Root-level categories keyed by their path segment.
pub type ContentTree = BTreeMap<String, Category>;

/// A grouping folder or a leaf collection in the content tree.
///
/// Intermediate categories never carry collections themselves; only the
/// category at a schema's final path segment does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub path: String,
    pub order: i32,
    pub is_collection: bool,
    pub collections: Vec<SchemaRecord>,
    pub subcategories: ContentTree,
    pub translations: Vec<Translation>,
}

/// Walk `path` segment by segment and return the first collection found.
pub fn find_collection<'a>(tree: &'a ContentTree, path: &str) -> Option<&'a SchemaRecord> {
    let mut level = tree;
    for part in segments(path) {
        let category = level.get(part)?;
        if let Some(collection) = category.collections.first() {
            return Some(collection);
        }
        level = &category.subcategories;
    }
    None
}

/// Number of levels in the tree.
pub fn depth(tree: &ContentTree) -> usize {
    tree.values()
        .map(|category| 1 + depth(&category.subcategories))
        .max()
        .unwrap_or(0)
}

/// Indented one-line-per-category rendering, used by the CLI and tests.
pub fn outline(tree: &ContentTree) -> String {
    let mut out = String::new();
    write_outline(tree, 0, &mut out);
    out
}

fn write_outline(tree: &ContentTree, indent: usize, out: &mut String) {
    for (name, category) in tree {
        let _ = write!(
            out,
            "{:width$}{name} [{}] order={}",
            "",
            category.icon,
            category.order,
            width = indent * 2
        );
        for collection in &category.collections {
            let _ = write!(out, " -> {}", collection.id);
        }
        out.push('\n');
        write_outline(&category.subcategories, indent + 1, out);
    }
}
