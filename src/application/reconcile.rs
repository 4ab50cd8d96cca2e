//! Reconciliation of discovered schemas against the persisted content structure.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use super::error::ContentError;
use super::repos::{CollectionModelConfig, ContentStructureRepo};
use crate::cache::{CacheTier, source_key};
use crate::domain::paths::{ancestors, segments};
use crate::domain::schema::{SchemaRecord, UNORDERED};
use crate::domain::structure::{
    ContentNode, ContentNodeUpdate, FOLDER_ICON, category_id, is_category_id,
};

pub(crate) const METRIC_ORPHANS_DELETED: &str = "vellum_orphans_deleted_total";

/// A compiled file found during discovery and what came of evaluating it.
///
/// Files whose evaluation failed still occupy their path, so the persisted
/// node for that path survives the pass.
#[derive(Debug)]
pub struct DiscoveredFile {
    pub file: PathBuf,
    pub path: String,
    pub outcome: Result<SchemaRecord, ContentError>,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub moved: usize,
    pub unchanged: usize,
    pub categories_created: usize,
    pub deleted: usize,
    pub models: usize,
    /// Paths whose schema was refused (no identifier, duplicate identifier
    /// or a node path already taken by an earlier file).
    pub rejected: Vec<String>,
    /// Source files behind `rejected`, in the same order.
    #[serde(skip)]
    pub rejected_files: Vec<PathBuf>,
    /// Collection models that could not be materialized.
    pub model_failures: Vec<String>,
    /// Files that failed to load, and node writes that failed.
    pub failures: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.model_failures.is_empty() && self.failures.is_empty()
    }

    /// Whether the record loaded from `file` was kept out of the structure.
    pub fn is_rejected(&self, file: &Path) -> bool {
        self.rejected_files.iter().any(|rejected| rejected == file)
    }

    fn reject(&mut self, file: &DiscoveredFile) {
        self.rejected.push(file.path.clone());
        self.rejected_files.push(file.file.clone());
    }
}

/// Persisted nodes indexed by identifier and by path.
#[derive(Default)]
struct NodeIndex {
    by_id: HashMap<String, ContentNode>,
    path_to_id: HashMap<String, String>,
}

impl NodeIndex {
    fn new(nodes: Vec<ContentNode>) -> Self {
        let mut index = Self::default();
        for node in nodes {
            index.insert(node);
        }
        index
    }

    fn insert(&mut self, node: ContentNode) {
        if let Some(previous) = self.by_id.get(&node.id) {
            self.path_to_id.remove(&previous.path);
        }
        self.path_to_id.insert(node.path.clone(), node.id.clone());
        self.by_id.insert(node.id.clone(), node);
    }

    fn remove(&mut self, id: &str) -> Option<ContentNode> {
        let node = self.by_id.remove(id)?;
        if self.path_to_id.get(&node.path).is_some_and(|owner| owner == id) {
            self.path_to_id.remove(&node.path);
        }
        Some(node)
    }

    fn by_path(&self, path: &str) -> Option<&ContentNode> {
        self.path_to_id.get(path).and_then(|id| self.by_id.get(id))
    }

    fn by_id(&self, id: &str) -> Option<&ContentNode> {
        self.by_id.get(id)
    }
}

pub struct StructureReconciler {
    repo: Arc<dyn ContentStructureRepo>,
    schema_cache: Arc<dyn CacheTier<SchemaRecord>>,
}

impl StructureReconciler {
    pub fn new(
        repo: Arc<dyn ContentStructureRepo>,
        schema_cache: Arc<dyn CacheTier<SchemaRecord>>,
    ) -> Self {
        Self { repo, schema_cache }
    }

    /// Bring the persisted structure in line with `discovered`.
    ///
    /// Only the initial structure read is fatal. Individual node, model and
    /// file failures are logged and collected in the report.
    #[instrument(skip_all, fields(files = discovered.len()))]
    pub async fn reconcile(
        &self,
        discovered: &[DiscoveredFile],
    ) -> Result<ReconcileReport, ContentError> {
        let persisted = self.repo.get_content_structure().await?;
        let mut index = NodeIndex::new(persisted);
        let mut report = ReconcileReport::default();
        let mut claimed: HashMap<String, String> = HashMap::new();
        let mut claimed_paths: HashMap<String, PathBuf> = HashMap::new();

        let discovered_paths: HashSet<&str> =
            discovered.iter().map(|file| file.path.as_str()).collect();
        let record_paths: HashSet<&str> = discovered
            .iter()
            .filter(|file| file.outcome.is_ok())
            .map(|file| file.path.as_str())
            .collect();
        let ancestor_paths: BTreeSet<String> = discovered
            .iter()
            .flat_map(|file| ancestors(&file.path))
            .collect();

        for file in discovered {
            match &file.outcome {
                Ok(record) => {
                    if let Some(owner) = claimed_paths.get(&file.path) {
                        warn!(
                            path = %file.path,
                            file = %file.file.display(),
                            owner = %owner.display(),
                            "Node path already taken by another file; skipping"
                        );
                        report.reject(file);
                        continue;
                    }
                    if let Some(owner) = claimed.get(&record.id) {
                        warn!(
                            path = %file.path,
                            id = %record.id,
                            owner = %owner,
                            "Duplicate schema identifier; skipping"
                        );
                        report.reject(file);
                        continue;
                    }
                    claimed.insert(record.id.clone(), file.path.clone());
                    claimed_paths.insert(file.path.clone(), file.file.clone());
                    self.apply_record(file, record, &mut index, &mut report)
                        .await;
                }
                Err(err @ ContentError::Validation { .. }) => {
                    warn!(path = %file.path, error = %err, "Schema rejected");
                    report.reject(file);
                }
                Err(err) => {
                    warn!(path = %file.path, error = %err, "Schema failed to load");
                    report.failures.push(format!("{}: {err}", file.path));
                }
            }
        }

        // Records first, so a node moving off an ancestor path is not claimed as a category.
        for path in &ancestor_paths {
            if record_paths.contains(path.as_str()) {
                continue;
            }
            self.ensure_category(path, &mut index, &mut claimed, &mut report)
                .await;
        }

        let orphans: Vec<ContentNode> = index
            .by_id
            .values()
            .filter(|node| {
                !discovered_paths.contains(node.path.as_str())
                    && !ancestor_paths.contains(&node.path)
                    && !claimed.contains_key(&node.id)
            })
            .cloned()
            .collect();

        for orphan in orphans {
            match self.repo.delete_content_structure(&orphan.id).await {
                Ok(()) => {
                    debug!(
                        id = %orphan.id,
                        path = %orphan.path,
                        category = is_category_id(&orphan.id),
                        "Orphan node deleted"
                    );
                    index.remove(&orphan.id);
                    report.deleted += 1;
                    counter!(METRIC_ORPHANS_DELETED).increment(1);
                }
                Err(err) => {
                    error!(id = %orphan.id, path = %orphan.path, error = %err, "Failed to delete orphan node");
                    report
                        .failures
                        .push(format!("{}: delete failed: {err}", orphan.path));
                }
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            moved = report.moved,
            unchanged = report.unchanged,
            categories_created = report.categories_created,
            deleted = report.deleted,
            models = report.models,
            rejected = report.rejected.len(),
            model_failures = report.model_failures.len(),
            failures = report.failures.len(),
            "Content structure reconciled"
        );

        Ok(report)
    }

    async fn ensure_category(
        &self,
        path: &str,
        index: &mut NodeIndex,
        claimed: &mut HashMap<String, String>,
        report: &mut ReconcileReport,
    ) {
        if let Some(existing) = index.by_path(path) {
            claimed.insert(existing.id.clone(), path.to_string());
            return;
        }

        let node = ContentNode {
            id: category_id(path),
            path: path.to_string(),
            name: segments(path).last().unwrap_or(path).to_string(),
            icon: FOLDER_ICON.to_string(),
            order: UNORDERED,
            is_collection: false,
        };
        claimed.insert(node.id.clone(), path.to_string());

        match self.repo.create_content_structure(node.clone()).await {
            Ok(()) => {
                debug!(path, "Category node created");
                index.insert(node);
                report.categories_created += 1;
            }
            Err(err) => {
                error!(path, error = %err, "Failed to create category node");
                report
                    .failures
                    .push(format!("{path}: category create failed: {err}"));
            }
        }
    }

    async fn apply_record(
        &self,
        file: &DiscoveredFile,
        record: &SchemaRecord,
        index: &mut NodeIndex,
        report: &mut ReconcileReport,
    ) {
        let update = ContentNodeUpdate {
            path: record.path.clone(),
            name: record.name.clone(),
            icon: record.icon.clone(),
            order: record.order,
            is_collection: record.is_collection(),
        };

        if let Err(err) = self.write_node(record, &update, index, report).await {
            error!(path = %record.path, id = %record.id, error = %err, "Failed to persist content node");
            report.failures.push(format!("{}: {err}", record.path));
            return;
        }

        if record.is_collection() {
            let model = CollectionModelConfig::from(record);
            let model_name = model.model_name.clone();
            match self.repo.create_collection_model(model).await {
                Ok(()) => report.models += 1,
                Err(err) => {
                    error!(
                        path = %record.path,
                        id = %record.id,
                        model = %model_name,
                        fields = record.fields.len(),
                        error = %err,
                        "Failed to materialize collection model"
                    );
                    report
                        .model_failures
                        .push(format!("{model_name}: {err}"));
                }
            }
        }

        self.schema_cache
            .set(&source_key(&file.file), record.clone())
            .await;
    }

    async fn write_node(
        &self,
        record: &SchemaRecord,
        update: &ContentNodeUpdate,
        index: &mut NodeIndex,
        report: &mut ReconcileReport,
    ) -> Result<(), ContentError> {
        if let Some(existing) = index.by_path(&record.path).cloned() {
            if existing.id == record.id {
                if existing.matches(update) {
                    report.unchanged += 1;
                } else {
                    self.repo
                        .update_content_structure(&record.id, update.clone())
                        .await?;
                    let mut node = existing;
                    node.apply(update);
                    index.insert(node);
                    report.updated += 1;
                }
                return Ok(());
            }

            // One node per path: the old occupant gives way.
            self.repo.delete_content_structure(&existing.id).await?;
            debug!(path = %record.path, replaced = %existing.id, id = %record.id, "Replaced node with foreign identifier");
            index.remove(&existing.id);
            report.deleted += 1;
        }

        if let Some(existing) = index.by_id(&record.id).cloned() {
            self.repo
                .update_content_structure(&record.id, update.clone())
                .await?;
            debug!(from = %existing.path, to = %record.path, id = %record.id, "Content node moved");
            let mut node = existing;
            node.apply(update);
            index.insert(node);
            report.moved += 1;
            return Ok(());
        }

        let node = ContentNode {
            id: record.id.clone(),
            path: update.path.clone(),
            name: update.name.clone(),
            icon: update.icon.clone(),
            order: update.order,
            is_collection: update.is_collection,
        };
        self.repo.create_content_structure(node.clone()).await?;
        index.insert(node);
        report.created += 1;
        Ok(())
    }
}
