//! Widget registry: turns widget references in schema files into field descriptors.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use crate::domain::schema::WidgetDescriptor;

#[derive(Debug, Error)]
pub enum WidgetError {
    #[error("widget registry has not been initialized")]
    NotInitialized,
    #[error("unknown widget `{name}`")]
    Unknown { name: String },
    #[error("invalid configuration for widget `{name}`: {message}")]
    InvalidConfig { name: String, message: String },
}

/// A widget reference captured from a schema file, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetPlaceholder {
    pub name: String,
    pub config: Map<String, Value>,
}

#[async_trait]
pub trait WidgetRegistry: Send + Sync {
    /// Build the widget table. Calling it again is a no-op.
    async fn initialize(&self) -> Result<(), WidgetError>;

    fn resolve_placeholder(
        &self,
        placeholder: &WidgetPlaceholder,
    ) -> Result<WidgetDescriptor, WidgetError>;
}

const BUILTIN_WIDGETS: &[(&str, &str)] = &[
    ("Input", "mdi:form-textbox"),
    ("RichText", "mdi:format-text"),
    ("Number", "mdi:numeric"),
    ("Email", "mdi:email"),
    ("Date", "mdi:calendar"),
    ("DateTime", "mdi:calendar-clock"),
    ("Checkbox", "mdi:checkbox-marked"),
    ("Radio", "mdi:radiobox-marked"),
    ("Select", "mdi:form-select"),
    ("Relation", "mdi:relation-many-to-many"),
    ("MediaUpload", "mdi:image-multiple"),
    ("Group", "mdi:group"),
    ("Slug", "mdi:link-variant"),
    ("Currency", "mdi:currency-usd"),
    ("ColorPicker", "mdi:palette"),
    ("Rating", "mdi:star"),
    ("PhoneNumber", "mdi:phone"),
    ("Address", "mdi:map-marker"),
    ("Seo", "mdi:search-web"),
    ("MegaMenu", "mdi:menu"),
];

/// Keys consumed into the descriptor itself rather than kept in `config`.
const DESCRIPTOR_KEYS: [&str; 5] = ["label", "db_fieldName", "dbFieldName", "required", "translated"];

/// Registry over the built-in widget set.
#[derive(Default)]
pub struct BuiltinWidgets {
    table: OnceCell<HashMap<&'static str, &'static str>>,
}

impl BuiltinWidgets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.table.initialized()
    }
}

#[async_trait]
impl WidgetRegistry for BuiltinWidgets {
    async fn initialize(&self) -> Result<(), WidgetError> {
        self.table
            .get_or_init(|| async {
                let table: HashMap<_, _> = BUILTIN_WIDGETS.iter().copied().collect();
                info!(count = table.len(), "Widget registry initialized");
                table
            })
            .await;
        Ok(())
    }

    fn resolve_placeholder(
        &self,
        placeholder: &WidgetPlaceholder,
    ) -> Result<WidgetDescriptor, WidgetError> {
        let table = self.table.get().ok_or(WidgetError::NotInitialized)?;
        let icon = table
            .get(placeholder.name.as_str())
            .ok_or_else(|| WidgetError::Unknown {
                name: placeholder.name.clone(),
            })?;
        describe(&placeholder.name, icon, &placeholder.config)
    }
}

fn describe(
    name: &str,
    icon: &str,
    config: &Map<String, Value>,
) -> Result<WidgetDescriptor, WidgetError> {
    let label = match config.get("label") {
        None | Some(Value::Null) => name.to_string(),
        Some(Value::String(label)) if !label.trim().is_empty() => label.clone(),
        Some(_) => return Err(invalid(name, "`label` must be a non-empty string")),
    };

    let db_field_name = match config.get("db_fieldName").or_else(|| config.get("dbFieldName")) {
        None | Some(Value::Null) => slug::slugify(&label).replace('-', "_"),
        Some(Value::String(field)) if !field.trim().is_empty() => field.clone(),
        Some(_) => return Err(invalid(name, "`db_fieldName` must be a non-empty string")),
    };

    let required = flag(name, config, "required")?;
    let translated = flag(name, config, "translated")?;

    let config = config
        .iter()
        .filter(|(key, _)| !DESCRIPTOR_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(WidgetDescriptor {
        widget: name.to_string(),
        label,
        db_field_name,
        required,
        translated,
        icon: icon.to_string(),
        config,
    })
}

fn flag(name: &str, config: &Map<String, Value>, key: &str) -> Result<bool, WidgetError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(value)) => Ok(*value),
        Some(_) => Err(invalid(name, format!("`{key}` must be a boolean"))),
    }
}

fn invalid(name: &str, message: impl Into<String>) -> WidgetError {
    WidgetError::InvalidConfig {
        name: name.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn placeholder(name: &str, config: Value) -> WidgetPlaceholder {
        WidgetPlaceholder {
            name: name.to_string(),
            config: config.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn resolution_requires_initialization() {
        let widgets = BuiltinWidgets::new();
        let err = widgets
            .resolve_placeholder(&placeholder("Input", json!({})))
            .expect_err("not initialized");
        assert!(matches!(err, WidgetError::NotInitialized));

        widgets.initialize().await.expect("init");
        widgets.initialize().await.expect("second init is a no-op");
        assert!(widgets.is_initialized());
    }

    #[tokio::test]
    async fn descriptor_derives_field_name_from_label() {
        let widgets = BuiltinWidgets::new();
        widgets.initialize().await.expect("init");

        let descriptor = widgets
            .resolve_placeholder(&placeholder(
                "Input",
                json!({"label": "First Name", "required": true, "placeholder": "Ada"}),
            ))
            .expect("resolved");

        assert_eq!(descriptor.widget, "Input");
        assert_eq!(descriptor.label, "First Name");
        assert_eq!(descriptor.db_field_name, "first_name");
        assert!(descriptor.required);
        assert!(!descriptor.translated);
        assert_eq!(descriptor.icon, "mdi:form-textbox");
        assert_eq!(descriptor.config.get("placeholder"), Some(&json!("Ada")));
        assert!(!descriptor.config.contains_key("label"));
    }

    #[tokio::test]
    async fn explicit_field_name_wins() {
        let widgets = BuiltinWidgets::new();
        widgets.initialize().await.expect("init");

        let descriptor = widgets
            .resolve_placeholder(&placeholder(
                "Email",
                json!({"label": "Contact", "db_fieldName": "contact_email"}),
            ))
            .expect("resolved");
        assert_eq!(descriptor.db_field_name, "contact_email");
    }

    #[tokio::test]
    async fn unknown_and_malformed_widgets_are_rejected() {
        let widgets = BuiltinWidgets::new();
        widgets.initialize().await.expect("init");

        let err = widgets
            .resolve_placeholder(&placeholder("Teleporter", json!({})))
            .expect_err("unknown");
        assert!(matches!(err, WidgetError::Unknown { ref name } if name == "Teleporter"));

        let err = widgets
            .resolve_placeholder(&placeholder("Input", json!({"required": "yes"})))
            .expect_err("bad flag");
        assert!(matches!(err, WidgetError::InvalidConfig { .. }));
    }
}
