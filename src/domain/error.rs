use thiserror::Error;

/// Reasons an evaluated document cannot become a schema record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("schema `{file_stem}` has no identifier")]
    MissingIdentifier { file_stem: String },
    #[error("schema file name is empty")]
    EmptyFileName,
    #[error("content path `{path}` has no segments")]
    EmptyPath { path: String },
}
