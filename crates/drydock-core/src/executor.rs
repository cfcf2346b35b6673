//! Executing a project's build command for one commit.

use std::sync::Arc;

use async_trait::async_trait;
use drydock_ci::{CommandResult, CommandRunner, ExecutionError};
use drydock_state::CommitId;

use crate::domain::Project;
use crate::workspace::WorkspaceProvider;

/// What a build produced. A non-zero exit is an outcome, not an error.
pub type BuildOutcome = CommandResult;

#[async_trait]
pub trait BuildExecutor: Send + Sync {
    async fn execute(
        &self,
        project: &Project,
        sha: &CommitId,
    ) -> Result<BuildOutcome, ExecutionError>;
}

/// Runs builds in a fresh tree from the project's workspace.
///
/// The tree is released on every path out of `execute`, including spawn
/// failures and timeouts.
pub struct WorkspaceExecutor {
    workspaces: Arc<dyn WorkspaceProvider>,
}

impl WorkspaceExecutor {
    pub fn new(workspaces: Arc<dyn WorkspaceProvider>) -> Self {
        Self { workspaces }
    }
}

/// Environment every build sees on top of the project's own.
pub fn build_env(project: &Project, sha: &CommitId) -> Vec<(String, String)> {
    vec![
        ("CI".to_string(), "true".to_string()),
        ("DRYDOCK_PROJECT".to_string(), project.id.to_string()),
        ("DRYDOCK_COMMIT".to_string(), sha.to_string()),
    ]
}

#[async_trait]
impl BuildExecutor for WorkspaceExecutor {
    async fn execute(
        &self,
        project: &Project,
        sha: &CommitId,
    ) -> Result<BuildOutcome, ExecutionError> {
        let workspace = self.workspaces.workspace(project);
        let tree = workspace
            .prepare_build_tree(sha)
            .await
            .map_err(|e| ExecutionError::Workspace(e.to_string()))?;

        tracing::debug!(
            project = %project.id,
            sha = %sha.short(),
            tree = %tree.path.display(),
            command = %project.build.display(),
            "running build command"
        );
        let result = CommandRunner::execute(&project.build, &tree.path, &build_env(project, sha)).await;

        let path = tree.path.clone();
        if let Err(e) = workspace.release_build_tree(tree).await {
            tracing::warn!(
                project = %project.id,
                tree = %path.display(),
                error = %e,
                "failed to release build tree"
            );
        }

        result
    }
}
