//! Local file-system schema source.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use walkdir::WalkDir;

use crate::application::sources::{SchemaSource, SourceError};

/// Enumerates compiled collection files with one of the configured extensions.
#[derive(Debug, Clone)]
pub struct LocalSchemaSource {
    extensions: Vec<String>,
}

impl LocalSchemaSource {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.into().to_ascii_lowercase())
                .collect(),
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        !hidden
            && extension.is_some_and(|ext| self.extensions.iter().any(|allowed| *allowed == ext))
    }

    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>, SourceError> {
        if !root.exists() {
            return Err(SourceError::NotFound {
                path: root.to_path_buf(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|err| SourceError::Walk {
                root: root.to_path_buf(),
                message: err.to_string(),
            })?;
            if entry.file_type().is_file() && self.accepts(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl SchemaSource for LocalSchemaSource {
    async fn list_files_recursively(&self, root: &Path) -> Result<Vec<PathBuf>, SourceError> {
        let source = self.clone();
        let owned_root = root.to_path_buf();
        let files = tokio::task::spawn_blocking(move || source.walk(&owned_root))
            .await
            .map_err(|err| SourceError::Walk {
                root: root.to_path_buf(),
                message: format!("walker task failed: {err}"),
            })??;
        debug!(root = %root.display(), count = files.len(), "Schema files discovered");
        Ok(files)
    }

    async fn read_file_text(&self, path: &Path) -> Result<String, SourceError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|err| SourceError::from_io(path, err))
    }
}
