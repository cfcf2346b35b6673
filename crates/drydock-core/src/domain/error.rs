//! Domain-level error taxonomy for drydock.

use drydock_state::ProjectId;

/// Errors in project configuration and identity.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("invalid repository url: {0}")]
    InvalidRepoUrl(String),

    #[error("project id {0:?} must be a single path segment of [A-Za-z0-9._-]")]
    InvalidProjectId(String),

    #[error("duplicate project id in catalog: {0}")]
    DuplicateProject(ProjectId),

    #[error("project {0} has an empty build command")]
    EmptyBuildCommand(ProjectId),

    #[error("catalog parse error: {0}")]
    CatalogParse(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
