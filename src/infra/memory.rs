//! Process-local persistence for running without a database.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::application::repos::{CollectionModelConfig, ContentStructureRepo, RepoError};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::structure::{ContentNode, ContentNodeUpdate};

const SOURCE: &str = "infra::memory";

/// Content-structure store held in memory.
///
/// Enforces the same constraints as the database schema: identifiers and
/// paths are both unique.
#[derive(Default)]
pub struct InMemoryContentStore {
    nodes: RwLock<BTreeMap<String, ContentNode>>,
    models: RwLock<BTreeMap<String, CollectionModelConfig>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, replacing whatever it held.
    pub fn with_nodes(nodes: impl IntoIterator<Item = ContentNode>) -> Self {
        let store = Self::new();
        {
            let mut guard = rw_write(&store.nodes, SOURCE, "with_nodes");
            for node in nodes {
                guard.insert(node.id.clone(), node);
            }
        }
        store
    }

    pub fn nodes(&self) -> Vec<ContentNode> {
        rw_read(&self.nodes, SOURCE, "nodes")
            .values()
            .cloned()
            .collect()
    }

    pub fn node_at(&self, path: &str) -> Option<ContentNode> {
        rw_read(&self.nodes, SOURCE, "node_at")
            .values()
            .find(|node| node.path == path)
            .cloned()
    }

    pub fn model(&self, model_name: &str) -> Option<CollectionModelConfig> {
        rw_read(&self.models, SOURCE, "model")
            .get(model_name)
            .cloned()
    }

    pub fn model_names(&self) -> Vec<String> {
        rw_read(&self.models, SOURCE, "model_names")
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ContentStructureRepo for InMemoryContentStore {
    async fn wait_ready(&self) -> Result<(), RepoError> {
        Ok(())
    }

    async fn get_content_structure(&self) -> Result<Vec<ContentNode>, RepoError> {
        Ok(self.nodes())
    }

    async fn create_content_structure(&self, node: ContentNode) -> Result<(), RepoError> {
        let mut nodes = rw_write(&self.nodes, SOURCE, "create_content_structure");
        if nodes.contains_key(&node.id) {
            return Err(RepoError::Duplicate {
                constraint: "content_structure_pkey".to_string(),
            });
        }
        if nodes.values().any(|existing| existing.path == node.path) {
            return Err(RepoError::Duplicate {
                constraint: "content_structure_path_key".to_string(),
            });
        }
        nodes.insert(node.id.clone(), node);
        Ok(())
    }

    async fn update_content_structure(
        &self,
        id: &str,
        update: ContentNodeUpdate,
    ) -> Result<(), RepoError> {
        let mut nodes = rw_write(&self.nodes, SOURCE, "update_content_structure");
        if nodes
            .values()
            .any(|existing| existing.id != id && existing.path == update.path)
        {
            return Err(RepoError::Duplicate {
                constraint: "content_structure_path_key".to_string(),
            });
        }
        let node = nodes.get_mut(id).ok_or(RepoError::NotFound)?;
        node.apply(&update);
        Ok(())
    }

    async fn delete_content_structure(&self, id: &str) -> Result<(), RepoError> {
        rw_write(&self.nodes, SOURCE, "delete_content_structure")
            .remove(id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }

    async fn create_collection_model(
        &self,
        config: CollectionModelConfig,
    ) -> Result<(), RepoError> {
        rw_write(&self.models, SOURCE, "create_collection_model")
            .insert(config.model_name.clone(), config);
        Ok(())
    }
}
