//! Collection schema records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::DomainError;
use super::paths::segments;

/// Order assigned to schemas and categories that do not declare one; sorts last.
pub const UNORDERED: i32 = 999;
pub const DEFAULT_COLLECTION_ICON: &str = "iconoir:info-empty";
pub const COLLECTION_MODEL_PREFIX: &str = "collection_";

/// Role → action → allowed.
pub type Permissions = BTreeMap<String, BTreeMap<String, bool>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub language_tag: String,
    pub translation_name: String,
}

impl Translation {
    pub fn new(language_tag: impl Into<String>, translation_name: impl Into<String>) -> Self {
        Self {
            language_tag: language_tag.into(),
            translation_name: translation_name.into(),
        }
    }
}

/// A field definition after its widget reference has been resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetDescriptor {
    pub widget: String,
    pub label: String,
    pub db_field_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub translated: bool,
    pub icon: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Declarative body of a compiled collection file, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchemaDocument {
    #[serde(alias = "_id")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub label: Option<String>,
    pub icon: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub order: Option<i32>,
    pub fields: Vec<WidgetDescriptor>,
    pub strict: bool,
    pub revision: bool,
    pub live_preview: bool,
    pub permissions: Permissions,
    pub translations: Vec<Translation>,
}

/// A content-collection definition with every default applied.
///
/// Records are replaced wholesale on each reconciliation pass and never
/// patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaRecord {
    pub id: String,
    pub name: String,
    pub label: String,
    pub icon: String,
    pub slug: String,
    pub description: String,
    pub path: String,
    pub file_path_name: String,
    pub order: i32,
    pub fields: Vec<WidgetDescriptor>,
    pub strict: bool,
    pub revision: bool,
    pub live_preview: bool,
    pub permissions: Permissions,
    pub translations: Vec<Translation>,
}

impl SchemaRecord {
    /// Build a record from an evaluated document.
    ///
    /// `path` always comes from the file location; a `path` key in the
    /// document is ignored.
    pub fn from_document(
        document: SchemaDocument,
        id: &str,
        file_stem: &str,
        path: String,
    ) -> Result<Self, DomainError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(DomainError::MissingIdentifier {
                file_stem: file_stem.to_string(),
            });
        }
        if file_stem.is_empty() {
            return Err(DomainError::EmptyFileName);
        }
        if segments(&path).next().is_none() {
            return Err(DomainError::EmptyPath { path });
        }

        let SchemaDocument {
            id: _,
            name,
            label,
            icon,
            slug,
            description,
            order,
            fields,
            strict,
            revision,
            live_preview,
            permissions,
            translations,
        } = document;

        Ok(Self {
            id: id.to_string(),
            name: non_empty(name).unwrap_or_else(|| file_stem.to_string()),
            label: non_empty(label).unwrap_or_else(|| file_stem.to_string()),
            icon: non_empty(icon).unwrap_or_else(|| DEFAULT_COLLECTION_ICON.to_string()),
            slug: non_empty(slug).unwrap_or_else(|| slug::slugify(file_stem)),
            description: description.unwrap_or_default(),
            path,
            file_path_name: file_stem.to_string(),
            order: order.unwrap_or(UNORDERED),
            fields,
            strict,
            revision,
            live_preview,
            permissions,
            translations,
        })
    }

    /// A schema with at least one field is backed by a collection model.
    pub fn is_collection(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Deterministic name of the physical store for this collection's documents.
    pub fn model_name(&self) -> String {
        format!("{COLLECTION_MODEL_PREFIX}{}", self.id)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_file_stem() {
        let record = SchemaRecord::from_document(
            SchemaDocument::default(),
            "0f8fad5b-d9cb-469f-a165-70867728950e",
            "Blog Posts",
            "/posts/Blog Posts".to_string(),
        )
        .expect("valid record");

        assert_eq!(record.name, "Blog Posts");
        assert_eq!(record.label, "Blog Posts");
        assert_eq!(record.slug, "blog-posts");
        assert_eq!(record.icon, DEFAULT_COLLECTION_ICON);
        assert_eq!(record.order, UNORDERED);
        assert!(!record.is_collection());
    }

    #[test]
    fn declared_values_win_over_defaults() {
        let document = SchemaDocument {
            name: Some("News".into()),
            icon: Some("mdi:newspaper".into()),
            order: Some(2),
            ..Default::default()
        };
        let record = SchemaRecord::from_document(document, "abc", "news", "/news".into())
            .expect("valid record");

        assert_eq!(record.name, "News");
        assert_eq!(record.icon, "mdi:newspaper");
        assert_eq!(record.order, 2);
        assert_eq!(record.model_name(), "collection_abc");
    }

    #[test]
    fn blank_identifier_is_rejected() {
        let err = SchemaRecord::from_document(SchemaDocument::default(), "  ", "news", "/news".into())
            .expect_err("identifier required");
        assert_eq!(
            err,
            DomainError::MissingIdentifier {
                file_stem: "news".into()
            }
        );
    }

    #[test]
    fn root_path_is_rejected() {
        let err = SchemaRecord::from_document(SchemaDocument::default(), "abc", "news", "/".into())
            .expect_err("path required");
        assert!(matches!(err, DomainError::EmptyPath { .. }));
    }
}
