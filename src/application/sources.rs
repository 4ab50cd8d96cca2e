//! File-system port for compiled collection definitions.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source `{}` not found", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to enumerate `{}`: {message}", root.display())]
    Walk { root: PathBuf, message: String },
}

impl SourceError {
    /// Classify an I/O failure, keeping "not found" distinct.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Worth retrying: anything but a missing file.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn list_files_recursively(&self, root: &Path) -> Result<Vec<PathBuf>, SourceError>;

    async fn read_file_text(&self, path: &Path) -> Result<String, SourceError>;
}
