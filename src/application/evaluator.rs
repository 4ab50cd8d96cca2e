//! Schema evaluation: compiled collection file text → schema document.
//!
//! Script bodies are never executed. Module syntax is stripped, widget calls
//! are rewritten into inert placeholders, and the remaining object literal is
//! normalized into JSON. TOML bodies are parsed directly.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex_lite::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use super::relaxed::{code_mask, matching_close, strip_comments, to_strict_json};
use super::widgets::{WidgetError, WidgetPlaceholder, WidgetRegistry};
use crate::domain::schema::SchemaDocument;

/// Longest prefix of the source echoed back in parse diagnostics.
pub const EXCERPT_LIMIT: usize = 500;

const PLACEHOLDER_NAME_KEY: &str = "__widget";
const PLACEHOLDER_CONFIG_KEY: &str = "__config";

static UUID_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?://|#)[ \t]*UUID:[ \t]*([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})\b",
    )
    .expect("valid marker pattern")
});
static IMPORT_STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*import\b(?:[^;{\n]|\{[^}]*\})*;?").expect("valid import pattern")
});
static EXPORT_DEFAULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bexport\s+default\s+").expect("valid export default pattern")
});
static EXPORT_BINDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bexport\s+(const|let|var)\s+").expect("valid export binding pattern")
});
static MODULE_EXPORTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bmodule\.exports\s*=\s*").expect("valid module.exports pattern")
});
static BINDING_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:const|let|var)\s+[A-Za-z_$][\w$]*\s*(?::[^=]+)?=\s*")
        .expect("valid binding pattern")
});
static OBJECT_BINDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:const|let|var)\s+[A-Za-z_$][\w$]*\s*(?::[^=]+)?=\s*\{")
        .expect("valid object binding pattern")
});
static DEFAULT_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bexport\s+default\s+\{").expect("valid default object pattern")
});
static WIDGET_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:globalThis\.)?\bwidgets\.([A-Za-z_$][\w$]*)\s*\(")
        .expect("valid widget call pattern")
});

#[derive(Debug, Error)]
pub enum EvaluateError {
    #[error("{reason}")]
    Parse { reason: String, excerpt: String },
    #[error("widget resolution failed: {source}")]
    Widget {
        #[source]
        source: WidgetError,
        excerpt: String,
    },
}

impl EvaluateError {
    /// Leading slice of the offending source.
    pub fn excerpt(&self) -> &str {
        match self {
            Self::Parse { excerpt, .. } | Self::Widget { excerpt, .. } => excerpt,
        }
    }
}

/// Body syntax of a compiled collection file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Script,
    Json,
    Toml,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("toml") => Self::Toml,
            Some("json") => Self::Json,
            _ => Self::Script,
        }
    }
}

/// Outcome of evaluating one file.
#[derive(Debug, Clone)]
pub struct EvaluatedSchema {
    /// Marker identifier if present, else the document's own `id`/`_id`.
    pub id: Option<String>,
    pub document: SchemaDocument,
}

pub struct SchemaEvaluator {
    widgets: Arc<dyn WidgetRegistry>,
}

impl SchemaEvaluator {
    pub fn new(widgets: Arc<dyn WidgetRegistry>) -> Self {
        Self { widgets }
    }

    /// Evaluate `source`. Pure: the same text always yields the same result.
    pub fn evaluate(
        &self,
        source: &str,
        format: SourceFormat,
    ) -> Result<EvaluatedSchema, EvaluateError> {
        let marker = extract_marker(source);

        let value = match format {
            SourceFormat::Toml => toml::from_str::<Value>(source)
                .map_err(|err| parse_error(format!("invalid TOML: {err}"), source))?,
            SourceFormat::Script | SourceFormat::Json => extract_object(source)?,
        };

        let Value::Object(mut object) = value else {
            return Err(parse_error("schema body is not an object", source));
        };

        if let Some(fields) = object.remove("fields") {
            let fields = self.resolve_fields(fields).map_err(|err| match err {
                FieldError::Widget(source_err) => EvaluateError::Widget {
                    source: source_err,
                    excerpt: excerpt(source),
                },
                FieldError::Shape(reason) => parse_error(reason, source),
            })?;
            object.insert("fields".to_string(), fields);
        }

        let document: SchemaDocument = serde_json::from_value(Value::Object(object))
            .map_err(|err| parse_error(format!("invalid schema document: {err}"), source))?;

        let id = marker.or_else(|| {
            document
                .id
                .as_ref()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
        });

        Ok(EvaluatedSchema { id, document })
    }

    fn resolve_fields(&self, fields: Value) -> Result<Value, FieldError> {
        let Value::Array(entries) = fields else {
            return Err(FieldError::Shape("`fields` must be an array".to_string()));
        };
        entries
            .into_iter()
            .map(|entry| self.resolve_field(entry))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn resolve_field(&self, entry: Value) -> Result<Value, FieldError> {
        let Value::Object(mut object) = entry else {
            return Err(FieldError::Shape(
                "field entries must be widget references".to_string(),
            ));
        };

        let (name, mut config) = if let Some(Value::String(name)) =
            object.remove(PLACEHOLDER_NAME_KEY)
        {
            let config = match object.remove(PLACEHOLDER_CONFIG_KEY) {
                Some(Value::Object(config)) => config,
                None | Some(Value::Null) => Map::new(),
                Some(_) => {
                    return Err(FieldError::Shape(format!(
                        "widget `{name}` must be called with an object"
                    )));
                }
            };
            (name, config)
        } else if let Some(Value::String(name)) = object.remove("widget") {
            (name, object)
        } else {
            return Err(FieldError::Shape(
                "field entry does not reference a widget".to_string(),
            ));
        };

        if let Some(nested) = config.remove("fields") {
            config.insert("fields".to_string(), self.resolve_fields(nested)?);
        }

        let descriptor = self
            .widgets
            .resolve_placeholder(&WidgetPlaceholder { name, config })
            .map_err(FieldError::Widget)?;
        serde_json::to_value(descriptor).map_err(|err| FieldError::Shape(err.to_string()))
    }
}

enum FieldError {
    Widget(WidgetError),
    Shape(String),
}

/// Identifier declared by a `// UUID: …` or `# UUID: …` comment, lowercased.
pub fn extract_marker(source: &str) -> Option<String> {
    UUID_MARKER
        .captures(source)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_ascii_lowercase())
}

fn extract_object(source: &str) -> Result<Value, EvaluateError> {
    let stripped = strip_module_syntax(source);
    let body = rewrite_widget_calls(&stripped);

    if let Some(value) = parse_assignment(&body) {
        return Ok(value);
    }
    if let Some(value) = first_object_binding(&body) {
        return Ok(value);
    }
    if let Some(value) = default_export_object(source) {
        return Ok(value);
    }

    Err(parse_error("no schema object found", source))
}

fn strip_module_syntax(source: &str) -> String {
    let without_imports = IMPORT_STATEMENT.replace_all(source, "");
    let without_default = EXPORT_DEFAULT.replace(&without_imports, "");
    let without_exports = EXPORT_BINDING.replace_all(&without_default, "$1 ");
    MODULE_EXPORTS.replace(&without_exports, "").into_owned()
}

/// The whole body read as one expression, optionally behind a single binding.
fn parse_assignment(body: &str) -> Option<Value> {
    let body = strip_comments(body);
    let trimmed = body.trim();
    let expression = match BINDING_PREFIX.find(trimmed) {
        Some(prefix) => &trimmed[prefix.end()..],
        None => trimmed,
    };
    let expression = expression.trim_end().trim_end_matches(';').trim_end();
    parse_object_literal(expression)
}

/// The first `const name = { … }` object literal in the body.
fn first_object_binding(body: &str) -> Option<Value> {
    let mask = code_mask(body);
    OBJECT_BINDING
        .find_iter(body)
        .filter(|found| mask.get(found.start()).copied().unwrap_or(false))
        .find_map(|found| {
            let open = found.end() - 1;
            let close = matching_close(body, &mask, open)?;
            parse_object_literal(&body[open..=close])
        })
}

/// An `export default { … }` literal that declares a `fields` array.
fn default_export_object(source: &str) -> Option<Value> {
    let source = rewrite_widget_calls(&IMPORT_STATEMENT.replace_all(source, ""));
    let mask = code_mask(&source);
    let found = DEFAULT_OBJECT
        .find_iter(&source)
        .find(|found| mask.get(found.start()).copied().unwrap_or(false))?;
    let open = found.end() - 1;
    let close = matching_close(&source, &mask, open)?;
    let value = parse_object_literal(&source[open..=close])?;
    value.get("fields").is_some_and(Value::is_array).then_some(value)
}

fn parse_object_literal(text: &str) -> Option<Value> {
    if !text.starts_with('{') {
        return None;
    }
    serde_json::from_str::<Value>(&to_strict_json(text))
        .ok()
        .filter(Value::is_object)
}

/// Replace `widgets.Name(config)` calls with `{"__widget": "Name", "__config": config}`.
fn rewrite_widget_calls(text: &str) -> String {
    let mask = code_mask(text);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    for captures in WIDGET_CALL.captures_iter(text) {
        let (Some(call), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if call.start() < cursor || !mask.get(call.start()).copied().unwrap_or(false) {
            continue;
        }
        let open = call.end() - 1;
        let Some(close) = matching_close(text, &mask, open) else {
            continue;
        };

        let arguments = rewrite_widget_calls(text[open + 1..close].trim());
        let config = if arguments.is_empty() {
            "{}"
        } else {
            arguments.as_str()
        };

        out.push_str(&text[cursor..call.start()]);
        out.push_str(&format!(
            "{{\"{PLACEHOLDER_NAME_KEY}\": \"{}\", \"{PLACEHOLDER_CONFIG_KEY}\": {config}}}",
            name.as_str()
        ));
        cursor = close + 1;
    }

    out.push_str(&text[cursor..]);
    out
}

fn excerpt(source: &str) -> String {
    source.chars().take(EXCERPT_LIMIT).collect()
}

fn parse_error(reason: impl Into<String>, source: &str) -> EvaluateError {
    EvaluateError::Parse {
        reason: reason.into(),
        excerpt: excerpt(source),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::widgets::BuiltinWidgets;

    const POSTS_ID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";

    async fn evaluator() -> SchemaEvaluator {
        let widgets = Arc::new(BuiltinWidgets::new());
        widgets.initialize().await.expect("widgets");
        SchemaEvaluator::new(widgets)
    }

    #[tokio::test]
    async fn script_module_with_marker_and_widget_calls() {
        let source = format!(
            r#"// UUID: {POSTS_ID}
import widgets from '../widgets';
import {{ helper }} from "./helper";

export const schema = {{
    icon: 'mdi:post',
    order: 1,
    fields: [
        globalThis.widgets.Input({{ label: 'Title', required: true }}),
        widgets.Group({{
            label: 'Meta',
            fields: [widgets.Date({{ label: 'Published At' }})],
        }}),
    ],
}};
export default schema;
"#
        );

        let evaluated = evaluator()
            .await
            .evaluate(&source, SourceFormat::Script)
            .expect("evaluated");

        assert_eq!(evaluated.id.as_deref(), Some(POSTS_ID));
        let document = evaluated.document;
        assert_eq!(document.icon.as_deref(), Some("mdi:post"));
        assert_eq!(document.order, Some(1));
        assert_eq!(document.fields.len(), 2);
        assert_eq!(document.fields[0].widget, "Input");
        assert_eq!(document.fields[0].db_field_name, "title");
        assert!(document.fields[0].required);

        let group = &document.fields[1];
        assert_eq!(group.widget, "Group");
        let nested = group.config.get("fields").expect("nested fields");
        assert_eq!(nested[0]["widget"], json!("Date"));
        assert_eq!(nested[0]["dbFieldName"], json!("published_at"));
    }

    #[tokio::test]
    async fn marker_wins_over_document_identifier() {
        let source = format!(
            "// uuid: {}\n{{\"_id\": \"11111111-2222-3333-4444-555555555555\", \"name\": \"News\"}}",
            POSTS_ID.to_uppercase()
        );
        let evaluated = evaluator()
            .await
            .evaluate(&source, SourceFormat::Json)
            .expect("evaluated");

        assert_eq!(evaluated.id.as_deref(), Some(POSTS_ID));
        assert_eq!(evaluated.document.name.as_deref(), Some("News"));
    }

    #[tokio::test]
    async fn document_identifier_is_used_without_marker() {
        let evaluated = evaluator()
            .await
            .evaluate(r#"{"id": "abc", "fields": []}"#, SourceFormat::Json)
            .expect("evaluated");
        assert_eq!(evaluated.id.as_deref(), Some("abc"));

        let evaluated = evaluator()
            .await
            .evaluate("{ name: 'Pages' }", SourceFormat::Script)
            .expect("evaluated");
        assert!(evaluated.id.is_none());
    }

    #[tokio::test]
    async fn typed_field_form_and_toml_bodies() {
        let source = format!(
            r#"# UUID: {POSTS_ID}
name = "About"
order = 3

[[fields]]
widget = "RichText"
label = "Body"
translated = true
"#
        );
        let evaluated = evaluator()
            .await
            .evaluate(&source, SourceFormat::Toml)
            .expect("evaluated");

        assert_eq!(evaluated.id.as_deref(), Some(POSTS_ID));
        assert_eq!(evaluated.document.order, Some(3));
        let field = &evaluated.document.fields[0];
        assert_eq!(field.widget, "RichText");
        assert_eq!(field.db_field_name, "body");
        assert!(field.translated);
    }

    #[tokio::test]
    async fn default_export_fallback_requires_fields() {
        let source = "const helper = () => 1;\nexport default { name: 'Menu', fields: [] };\nhelper();";
        let evaluated = evaluator()
            .await
            .evaluate(source, SourceFormat::Script)
            .expect("evaluated");
        assert_eq!(evaluated.document.name.as_deref(), Some("Menu"));

        let err = evaluator()
            .await
            .evaluate(
                "const helper = () => 1;\nexport default { name: 'Menu' };\nhelper();",
                SourceFormat::Script,
            )
            .expect_err("no fields array");
        assert!(matches!(err, EvaluateError::Parse { .. }));
    }

    #[tokio::test]
    async fn failure_reports_bounded_excerpt() {
        let source = format!("this is not a schema {}", "x".repeat(EXCERPT_LIMIT * 2));
        let err = evaluator()
            .await
            .evaluate(&source, SourceFormat::Script)
            .expect_err("parse failure");

        assert!(matches!(err, EvaluateError::Parse { .. }));
        assert_eq!(err.excerpt().chars().count(), EXCERPT_LIMIT);
        assert!(source.starts_with(err.excerpt()));
    }

    #[tokio::test]
    async fn unknown_widget_is_a_widget_error() {
        let err = evaluator()
            .await
            .evaluate(
                "export default { fields: [widgets.Hologram({ label: 'X' })] }",
                SourceFormat::Script,
            )
            .expect_err("unknown widget");
        assert!(matches!(
            err,
            EvaluateError::Widget {
                source: WidgetError::Unknown { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn evaluation_is_repeatable() {
        let evaluator = evaluator().await;
        let source = "{ name: 'Posts', fields: [widgets.Input({ label: 'Title' })] }";
        let first = evaluator.evaluate(source, SourceFormat::Script).expect("first");
        let second = evaluator.evaluate(source, SourceFormat::Script).expect("second");
        assert_eq!(first.document, second.document);
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(SourceFormat::from_path(Path::new("a/b.TOML")), SourceFormat::Toml);
        assert_eq!(SourceFormat::from_path(Path::new("a/b.json")), SourceFormat::Json);
        assert_eq!(SourceFormat::from_path(Path::new("a/b.js")), SourceFormat::Script);
    }
}
