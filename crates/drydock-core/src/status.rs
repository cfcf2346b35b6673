//! Remote commit status reporting.

use async_trait::async_trait;
use drydock_state::{BuildStatus, CommitId};

use crate::github::GitHubError;

/// Errors from a status report. Always non-fatal to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error("status service unavailable: {0}")]
    Unavailable(String),
}

/// Publishes a build's state against a commit on the code host.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn set_status(
        &self,
        repo_url: &str,
        sha: &CommitId,
        state: BuildStatus,
        target_url: Option<&str>,
    ) -> Result<(), ReportError>;
}

/// Reporter that drops every status. Used when no code host is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStatusReporter;

#[async_trait]
impl StatusReporter for NoopStatusReporter {
    async fn set_status(
        &self,
        repo_url: &str,
        sha: &CommitId,
        state: BuildStatus,
        _target_url: Option<&str>,
    ) -> Result<(), ReportError> {
        tracing::debug!(repo = %repo_url, sha = %sha.short(), state = %state, "status reporting disabled");
        Ok(())
    }
}
