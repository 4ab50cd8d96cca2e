use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

use crate::{
    application::{repos::RepoError, sources::SourceError, widgets::WidgetError},
    config::LoadError,
    infra::error::InfraError,
};

/// Flattened error chain, outermost first, for structured log output.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn chain(&self) -> String {
        self.messages.join(": ")
    }
}

/// Failures raised while loading and reconciling content definitions.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("parse error in `{}`: {message}", path.display())]
    Parse {
        path: PathBuf,
        message: String,
        excerpt: String,
    },
    #[error("validation error in `{}`: {message}", path.display())]
    Validation { path: PathBuf, message: String },
    #[error("persistence error: {0}")]
    Persistence(#[from] RepoError),
    #[error("discovery error under `{}`: {source}", root.display())]
    Discovery {
        root: PathBuf,
        #[source]
        source: SourceError,
    },
    #[error("initialization error: {0}")]
    Initialization(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("lazy load of `{name}` failed after {attempts} attempt(s): {source}")]
    LazyLoad {
        name: String,
        attempts: u32,
        #[source]
        source: SourceError,
    },
}

impl ContentError {
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization(message.into())
    }

    pub fn validation(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<WidgetError> for ContentError {
    fn from(error: WidgetError) -> Self {
        Self::Initialization(format!("widget registry: {error}"))
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("resource not found")]
    NotFound,
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit status reported by the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Content(ContentError::Validation { .. })
            | AppError::Content(ContentError::Parse { .. }) => 65,
            AppError::NotFound | AppError::Content(ContentError::NotFound(_)) => 66,
            AppError::Config(_) | AppError::Infra(InfraError::Configuration { .. }) => 78,
            AppError::Infra(InfraError::Database { .. } | InfraError::Migration { .. })
            | AppError::Content(ContentError::Persistence(_)) => 69,
            AppError::Infra(_) | AppError::Content(_) | AppError::Unexpected(_) => 70,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_walks_the_source_chain() {
        let error = ContentError::Discovery {
            root: PathBuf::from("compiled"),
            source: SourceError::Walk {
                root: PathBuf::from("compiled"),
                message: "permission denied".to_string(),
            },
        };
        let report = ErrorReport::from_error("test", &error);

        assert_eq!(report.messages.len(), 2);
        assert!(report.messages[0].starts_with("discovery error under `compiled`"));
        assert!(report.chain().ends_with("permission denied"));
    }

    #[test]
    fn exit_codes_separate_user_and_system_failures() {
        assert_eq!(AppError::from(ContentError::not_found("/x")).exit_code(), 66);
        assert_eq!(
            AppError::from(ContentError::validation("a.js", "missing id")).exit_code(),
            65
        );
        assert_eq!(
            AppError::from(ContentError::Persistence(RepoError::Timeout)).exit_code(),
            69
        );
    }
}
