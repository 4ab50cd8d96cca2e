//! Category tree construction from flat schema paths.

use std::collections::HashMap;

use crate::domain::category::{Category, ContentTree};
use crate::domain::paths::segments;
use crate::domain::schema::{SchemaRecord, Translation};
use crate::domain::structure::{FILE_ICON, FOLDER_ICON, category_id};

/// Metadata recorded for a tree position by the first schema reaching it.
#[derive(Debug, Clone)]
struct SegmentMeta {
    icon: String,
    order: i32,
    translations: Vec<Translation>,
}

pub struct TreeBuilder {
    default_language: String,
}

impl TreeBuilder {
    pub fn new(default_language: impl Into<String>) -> Self {
        Self {
            default_language: default_language.into(),
        }
    }

    /// Build the tree. Schemas are sorted by identifier first, so the result
    /// does not depend on discovery order.
    pub fn build(&self, schemas: &[SchemaRecord]) -> ContentTree {
        let mut sorted: Vec<&SchemaRecord> = schemas.iter().collect();
        sorted.sort_by(|left, right| left.id.cmp(&right.id));

        let overrides = collect_overrides(&sorted);
        let mut tree = ContentTree::new();

        for schema in sorted {
            let parts: Vec<&str> = segments(&schema.path).collect();
            let mut level = &mut tree;

            for (depth, part) in parts.iter().enumerate() {
                let position = format!("/{}", parts[..=depth].join("/"));
                let is_last = depth + 1 == parts.len();
                let meta = overrides.get(&position);

                let category = level.entry(part.to_string()).or_insert_with(|| Category {
                    id: if is_last {
                        schema.id.clone()
                    } else {
                        category_id(&position)
                    },
                    name: part.to_string(),
                    icon: meta
                        .map(|meta| meta.icon.clone())
                        .unwrap_or_else(|| structural_icon(is_last)),
                    path: position.clone(),
                    order: meta.map_or(schema.order, |meta| meta.order),
                    is_collection: is_last,
                    collections: Vec::new(),
                    subcategories: ContentTree::new(),
                    translations: meta
                        .map(|meta| meta.translations.clone())
                        .filter(|translations| !translations.is_empty())
                        .unwrap_or_else(|| {
                            vec![Translation::new(self.default_language.clone(), *part)]
                        }),
                });

                if is_last {
                    let mut collection = schema.clone();
                    if let Some(meta) = meta {
                        collection.icon = meta.icon.clone();
                        collection.order = meta.order;
                        if !meta.translations.is_empty() {
                            collection.translations = meta.translations.clone();
                        }
                    }
                    category.is_collection = true;
                    category.collections.push(collection);
                    break;
                }
                level = &mut category.subcategories;
            }
        }

        tree
    }
}

/// First pass: the first schema to reach a position decides its metadata.
fn collect_overrides(schemas: &[&SchemaRecord]) -> HashMap<String, SegmentMeta> {
    let mut overrides = HashMap::new();
    for schema in schemas {
        let parts: Vec<&str> = segments(&schema.path).collect();
        for depth in 0..parts.len() {
            let position = format!("/{}", parts[..=depth].join("/"));
            let is_last = depth + 1 == parts.len();
            overrides.entry(position).or_insert_with(|| SegmentMeta {
                icon: if is_last {
                    schema.icon.clone()
                } else {
                    FOLDER_ICON.to_string()
                },
                order: schema.order,
                translations: schema.translations.clone(),
            });
        }
    }
    overrides
}

fn structural_icon(is_last: bool) -> String {
    if is_last { FILE_ICON } else { FOLDER_ICON }.to_string()
}
