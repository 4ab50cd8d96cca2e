//! Content manager: discovery → evaluation → reconciliation → tree → cache.
//!
//! One [`ContentManager`] is shared (behind an `Arc`) by every consumer in the
//! process. Passes are serialised by an async mutex; readers only ever see a
//! complete [`ContentSnapshot`], swapped in with a single assignment once a
//! pass has fully succeeded.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use dashmap::DashMap;
use futures::{StreamExt, stream};
use metrics::{counter, histogram};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::error::ContentError;
use super::evaluator::{SchemaEvaluator, SourceFormat};
use super::reconcile::{DiscoveredFile, ReconcileReport, StructureReconciler};
use super::repos::ContentStructureRepo;
use super::retry::RetryPolicy;
use super::sources::{SchemaSource, SourceError};
use super::tree::TreeBuilder;
use super::widgets::WidgetRegistry;
use crate::cache::lock::{rw_read, rw_write};
use crate::cache::{
    ALL_COLLECTIONS_KEY, CONTENT_STRUCTURE_KEY, CacheConfig, CacheTier, DistributedCache,
    Namespace, build_tier, lazy_collection_key, source_key,
};
use crate::config::Settings;
use crate::domain::category::{ContentTree, find_collection};
use crate::domain::paths::{file_stem, node_path};
use crate::domain::schema::SchemaRecord;
use crate::domain::structure::ContentNode;

const SOURCE: &str = "application::content";
pub(crate) const METRIC_RELOAD_MS: &str = "vellum_reload_ms";
pub(crate) const METRIC_PARSE_FAILURES: &str = "vellum_schema_parse_failures_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ManagerState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

/// Result of the last successful pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContentSnapshot {
    pub collections: Vec<SchemaRecord>,
    pub tree: ContentTree,
    pub report: ReconcileReport,
}

#[derive(Debug, Clone)]
pub struct ContentOptions {
    pub root_dir: PathBuf,
    pub extensions: Vec<String>,
    pub default_language: String,
    pub lazy_dir: PathBuf,
    pub load_concurrency: NonZeroUsize,
    pub retry: RetryPolicy,
}

impl From<&Settings> for ContentOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            root_dir: settings.content.root_dir.clone(),
            extensions: settings.content.extensions.clone(),
            default_language: settings.content.default_language.clone(),
            lazy_dir: settings.content.lazy_dir.clone(),
            load_concurrency: settings.content.load_concurrency,
            retry: RetryPolicy::from(&settings.retry),
        }
    }
}

/// Collaborators the manager drives.
#[derive(Clone)]
pub struct ContentPorts {
    pub source: Arc<dyn SchemaSource>,
    pub repo: Arc<dyn ContentStructureRepo>,
    pub widgets: Arc<dyn WidgetRegistry>,
}

/// Cache tiers used by a manager, one per namespace and value type.
#[derive(Clone)]
pub struct ContentCaches {
    pub schemas: Arc<dyn CacheTier<SchemaRecord>>,
    pub file_hashes: Arc<dyn CacheTier<String>>,
    pub collections: Arc<dyn CacheTier<Vec<SchemaRecord>>>,
    pub structure: Arc<dyn CacheTier<ContentTree>>,
}

impl ContentCaches {
    pub fn build(config: &CacheConfig, remote: Option<Arc<dyn DistributedCache>>) -> Self {
        Self {
            schemas: build_tier(Namespace::Schema, config, remote.clone()),
            file_hashes: build_tier(Namespace::FileHash, config, remote.clone()),
            collections: build_tier(Namespace::Snapshot, config, remote.clone()),
            structure: build_tier(Namespace::Snapshot, config, remote),
        }
    }
}

pub struct ContentManager {
    options: ContentOptions,
    ports: ContentPorts,
    caches: ContentCaches,
    evaluator: SchemaEvaluator,
    reconciler: StructureReconciler,
    tree_builder: TreeBuilder,
    state: RwLock<ManagerState>,
    pass: Mutex<()>,
    snapshot: RwLock<Arc<ContentSnapshot>>,
    access_counts: DashMap<String, u64>,
}

impl ContentManager {
    pub fn new(options: ContentOptions, ports: ContentPorts, caches: ContentCaches) -> Self {
        let evaluator = SchemaEvaluator::new(ports.widgets.clone());
        let reconciler = StructureReconciler::new(ports.repo.clone(), caches.schemas.clone());
        let tree_builder = TreeBuilder::new(options.default_language.clone());
        Self {
            options,
            ports,
            caches,
            evaluator,
            reconciler,
            tree_builder,
            state: RwLock::new(ManagerState::Uninitialized),
            pass: Mutex::new(()),
            snapshot: RwLock::new(Arc::new(ContentSnapshot::default())),
            access_counts: DashMap::new(),
        }
    }

    pub fn state(&self) -> ManagerState {
        *rw_read(&self.state, SOURCE, "state")
    }

    fn set_state(&self, state: ManagerState) {
        *rw_write(&self.state, SOURCE, "set_state") = state;
    }

    /// Bring the manager to `Ready`. A no-op once ready; retried after a failure.
    #[instrument(skip(self), fields(root = %self.options.root_dir.display()))]
    pub async fn initialize(&self) -> Result<(), ContentError> {
        let _pass = self.pass.lock().await;
        if self.state() == ManagerState::Ready {
            return Ok(());
        }
        self.set_state(ManagerState::Initializing);

        match self.initialize_locked().await {
            Ok(snapshot) => {
                self.set_state(ManagerState::Ready);
                info!(
                    collections = snapshot.collections.len(),
                    categories = snapshot.tree.len(),
                    "Content manager ready"
                );
                Ok(())
            }
            Err(err) => {
                self.set_state(ManagerState::Failed);
                error!(error = %err, "Content manager initialization failed");
                Err(err)
            }
        }
    }

    async fn initialize_locked(&self) -> Result<Arc<ContentSnapshot>, ContentError> {
        self.ports.widgets.initialize().await?;
        self.ports.repo.wait_ready().await.map_err(|err| {
            ContentError::initialization(format!("persistence layer not ready: {err}"))
        })?;
        self.reload_locked(false).await
    }

    /// Re-run a full pass. With `recompile`, the Schema and FileHash tiers are
    /// purged first so every file is evaluated again.
    #[instrument(skip(self))]
    pub async fn update_collections(
        &self,
        recompile: bool,
    ) -> Result<Arc<ContentSnapshot>, ContentError> {
        let _pass = self.pass.lock().await;
        self.ports.widgets.initialize().await?;
        if recompile {
            self.caches.schemas.clear_all().await;
            self.caches.file_hashes.clear_all().await;
            debug!("Schema and file hash tiers purged");
        }
        self.reload_locked(recompile).await
    }

    async fn reload_locked(&self, recompile: bool) -> Result<Arc<ContentSnapshot>, ContentError> {
        let started = Instant::now();
        let root = &self.options.root_dir;

        let files = self
            .ports
            .source
            .list_files_recursively(root)
            .await
            .map_err(|source| ContentError::Discovery {
                root: root.clone(),
                source,
            })?;

        let discovered: Vec<DiscoveredFile> = stream::iter(files)
            .map(|file| self.load_file(file, recompile))
            .buffered(self.options.load_concurrency.get())
            .collect()
            .await;

        let report = self.reconciler.reconcile(&discovered).await?;

        let collections: Vec<SchemaRecord> = discovered
            .into_iter()
            .filter(|file| !report.is_rejected(&file.file))
            .filter_map(|file| file.outcome.ok())
            .collect();
        let tree = self.tree_builder.build(&collections);

        self.caches
            .collections
            .set(ALL_COLLECTIONS_KEY, collections.clone())
            .await;
        self.caches
            .structure
            .set(CONTENT_STRUCTURE_KEY, tree.clone())
            .await;

        let snapshot = Arc::new(ContentSnapshot {
            collections,
            tree,
            report,
        });
        *rw_write(&self.snapshot, SOURCE, "swap_snapshot") = Arc::clone(&snapshot);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_RELOAD_MS).record(elapsed_ms);
        info!(
            collections = snapshot.collections.len(),
            elapsed_ms,
            recompile,
            "Collections reloaded"
        );

        Ok(snapshot)
    }

    async fn load_file(&self, file: PathBuf, recompile: bool) -> DiscoveredFile {
        let Some(path) = node_path(&self.options.root_dir, &file) else {
            let path = file.display().to_string();
            return DiscoveredFile {
                outcome: Err(ContentError::validation(&file, "file has no usable name")),
                file,
                path,
            };
        };
        let outcome = self.load_record(&file, &path, recompile).await;
        DiscoveredFile {
            file,
            path,
            outcome,
        }
    }

    async fn load_record(
        &self,
        file: &Path,
        path: &str,
        recompile: bool,
    ) -> Result<SchemaRecord, ContentError> {
        let text = self
            .ports
            .source
            .read_file_text(file)
            .await
            .map_err(|source| ContentError::Discovery {
                root: file.to_path_buf(),
                source,
            })?;

        let key = source_key(file);
        let hash = content_hash(&text);

        if !recompile
            && self.caches.file_hashes.get(&key).await.as_deref() == Some(hash.as_str())
            && let Some(record) = self.caches.schemas.get(&key).await
            && record.path == path
        {
            debug!(path, "Schema unchanged; evaluation skipped");
            return Ok(record);
        }

        let record = self.evaluate_file(file, &text, path)?;
        self.caches.file_hashes.set(&key, hash).await;
        Ok(record)
    }

    fn evaluate_file(&self, file: &Path, text: &str, path: &str) -> Result<SchemaRecord, ContentError> {
        let evaluated = self
            .evaluator
            .evaluate(text, SourceFormat::from_path(file))
            .map_err(|err| {
                counter!(METRIC_PARSE_FAILURES).increment(1);
                warn!(
                    file = %file.display(),
                    error = %err,
                    excerpt = err.excerpt(),
                    "Schema evaluation failed"
                );
                ContentError::Parse {
                    path: file.to_path_buf(),
                    message: err.to_string(),
                    excerpt: err.excerpt().to_string(),
                }
            })?;

        let id = evaluated.id.ok_or_else(|| {
            ContentError::validation(file, "schema has no identifier (UUID marker or `id`)")
        })?;
        let stem = file_stem(file)
            .ok_or_else(|| ContentError::validation(file, "file has no usable name"))?;

        SchemaRecord::from_document(evaluated.document, &id, &stem, path.to_string())
            .map_err(|err| ContentError::validation(file, err.to_string()))
    }

    /// First collection along `path`, e.g. `/posts/news` or `posts/news`.
    pub fn get_collection(&self, path: &str) -> Option<SchemaRecord> {
        let snapshot = self.get_collection_data();
        find_collection(&snapshot.tree, path).cloned()
    }

    /// The current snapshot. It is not updated in place by later passes.
    pub fn get_collection_data(&self) -> Arc<ContentSnapshot> {
        Arc::clone(&rw_read(&self.snapshot, SOURCE, "get_collection_data"))
    }

    /// Persisted nodes keyed by path.
    pub async fn get_content_structure_map(
        &self,
    ) -> Result<BTreeMap<String, ContentNode>, ContentError> {
        let nodes = self.ports.repo.get_content_structure().await?;
        Ok(nodes
            .into_iter()
            .map(|node| (node.path.clone(), node))
            .collect())
    }

    /// Load one definition from the lazy directory, retrying transient I/O failures.
    #[instrument(skip(self))]
    pub async fn load_collection(&self, name: &str) -> Result<SchemaRecord, ContentError> {
        let name = name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(ContentError::validation(
                self.options.lazy_dir.join(name),
                "collection name must be a plain file stem",
            ));
        }
        *self.access_counts.entry(name.to_string()).or_insert(0) += 1;

        let key = lazy_collection_key(name);
        if let Some(record) = self.caches.schemas.get(&key).await {
            return Ok(record);
        }

        let (file, text) = self
            .options
            .retry
            .run("load_collection", SourceError::is_transient, || {
                self.read_lazy_file(name)
            })
            .await
            .map_err(|failure| {
                if failure.error.is_not_found() {
                    ContentError::not_found(format!("collection `{name}`"))
                } else {
                    ContentError::LazyLoad {
                        name: name.to_string(),
                        attempts: failure.attempts,
                        source: failure.error,
                    }
                }
            })?;

        let path = node_path(&self.options.lazy_dir, &file).unwrap_or_else(|| format!("/{name}"));
        let record = self.evaluate_file(&file, &text, &path)?;
        self.caches.schemas.set(&key, record.clone()).await;
        debug!(name, id = %record.id, "Collection loaded on demand");
        Ok(record)
    }

    async fn read_lazy_file(&self, name: &str) -> Result<(PathBuf, String), SourceError> {
        for extension in &self.options.extensions {
            let file = self.options.lazy_dir.join(format!("{name}.{extension}"));
            match self.ports.source.read_file_text(&file).await {
                Ok(text) => return Ok((file, text)),
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }
        Err(SourceError::NotFound {
            path: self.options.lazy_dir.join(name),
        })
    }

    /// Times `load_collection` has been asked for `name`.
    pub fn access_count(&self, name: &str) -> u64 {
        self.access_counts
            .get(name)
            .map(|count| *count)
            .unwrap_or(0)
    }
}

fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
