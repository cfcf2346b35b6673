//! Local working copies of project repositories.
//!
//! A [`RepoWorkspace`] is the single shared checkout of a project: the poller
//! fetches into it, walks its remote branches and checks each one out to read
//! the tip. Builds never run in that checkout. Each build gets its own
//! [`BuildTree`], a detached tree pinned to the exact commit, so a poller
//! checkout cannot change the files under a running build.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use drydock_state::CommitId;

use crate::domain::Project;

/// Errors from workspace operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("workspace io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected git output: {0}")]
    InvalidOutput(String),
}

pub type WorkspaceResult<T> = std::result::Result<T, WorkspaceError>;

/// A branch on a remote, as seen after the last fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBranch {
    /// Short name, e.g. `origin/main`.
    pub name: String,

    /// Commit the branch pointed at when enumerated.
    pub head: CommitId,

    /// True when the ref is an alias for another ref (e.g. `origin/HEAD`).
    pub symbolic: bool,
}

impl RemoteBranch {
    pub fn new(name: impl Into<String>, head: CommitId) -> Self {
        Self {
            name: name.into(),
            head,
            symbolic: false,
        }
    }

    /// Pseudo-branches that point at another ref rather than at a branch head.
    pub fn is_symbolic(&self) -> bool {
        self.symbolic
            || self.name == "HEAD"
            || self.name.ends_with("/HEAD")
            || self.name.contains("->")
    }
}

/// An isolated tree checked out at one commit for the lifetime of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTree {
    pub path: PathBuf,
    pub sha: CommitId,
}

/// A project's local git working copy.
#[async_trait]
pub trait RepoWorkspace: Send + Sync {
    /// Root directory of the shared checkout.
    fn root(&self) -> PathBuf;

    /// Fetch all remotes, discovering new branches as well as new commits.
    async fn fetch(&self) -> WorkspaceResult<()>;

    /// Enumerate remote branches, symbolic entries included.
    async fn remote_branches(&self) -> WorkspaceResult<Vec<RemoteBranch>>;

    /// Check out `branch` in the shared checkout, detaching HEAD.
    async fn checkout(&self, branch: &str) -> WorkspaceResult<()>;

    /// Commit at HEAD of the shared checkout.
    async fn current_head(&self) -> WorkspaceResult<CommitId>;

    /// Create an isolated tree at `sha` for a build to run in.
    async fn prepare_build_tree(&self, sha: &CommitId) -> WorkspaceResult<BuildTree>;

    /// Remove a tree created by [`RepoWorkspace::prepare_build_tree`].
    async fn release_build_tree(&self, tree: BuildTree) -> WorkspaceResult<()>;
}

/// Hands out the workspace that belongs to a project.
pub trait WorkspaceProvider: Send + Sync {
    fn workspace(&self, project: &Project) -> Arc<dyn RepoWorkspace>;
}
