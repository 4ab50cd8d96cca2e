//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::schema::{SchemaRecord, WidgetDescriptor};
use crate::domain::structure::{ContentNode, ContentNodeUpdate};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
    #[error("persistence layer not ready: {0}")]
    Unavailable(String),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Physical store description for one collection's documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionModelConfig {
    pub id: String,
    pub name: String,
    pub model_name: String,
    pub schema: CollectionModelSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionModelSchema {
    pub fields: Vec<WidgetDescriptor>,
    pub strict: bool,
    pub revision: bool,
    pub live_preview: bool,
}

impl From<&SchemaRecord> for CollectionModelConfig {
    fn from(schema: &SchemaRecord) -> Self {
        Self {
            id: schema.id.clone(),
            name: schema.name.clone(),
            model_name: schema.model_name(),
            schema: CollectionModelSchema {
                fields: schema.fields.clone(),
                strict: schema.strict,
                revision: schema.revision,
                live_preview: schema.live_preview,
            },
        }
    }
}

#[async_trait]
pub trait ContentStructureRepo: Send + Sync {
    /// Resolve once the persistence layer can serve requests.
    async fn wait_ready(&self) -> Result<(), RepoError>;

    async fn get_content_structure(&self) -> Result<Vec<ContentNode>, RepoError>;

    async fn create_content_structure(&self, node: ContentNode) -> Result<(), RepoError>;

    async fn update_content_structure(
        &self,
        id: &str,
        update: ContentNodeUpdate,
    ) -> Result<(), RepoError>;

    async fn delete_content_structure(&self, id: &str) -> Result<(), RepoError>;

    /// Create or refresh the backing store for a collection.
    async fn create_collection_model(&self, config: CollectionModelConfig)
    -> Result<(), RepoError>;
}
