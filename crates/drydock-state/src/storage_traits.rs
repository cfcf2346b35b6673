//! Storage trait definitions for drydock
//!
//! `BuildStore` is the authoritative record of every build. Implementations:
//! - `GitBuildStore`: JSON records in a git repository (see `git_store`)
//! - `MemoryBuildStore`: in-memory fake for tests (see `fakes`)

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::{Build, ProjectId};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Durable build history.
///
/// Guarantees:
/// - `add_or_update_build` is idempotent on `(project_id, number)`: writing
///   the same number twice replaces the earlier record.
/// - `list_builds` returns every record previously written for the project.
///   Order is unspecified; callers sort when they care.
/// - A successful `commit_changes` makes every prior write durable.
#[async_trait]
pub trait BuildStore: Send + Sync {
    /// List all builds recorded for a project.
    async fn list_builds(&self, project: &ProjectId) -> StorageResult<Vec<Build>>;

    /// Insert a build, or replace the record with the same number.
    async fn add_or_update_build(&self, build: &Build) -> StorageResult<()>;

    /// Durably commit all outstanding writes.
    async fn commit_changes(&self, message: &str) -> StorageResult<()>;
}
