//! Which projects a session may poll.

use async_trait::async_trait;

use crate::catalog::ProjectCatalog;
use crate::domain::{Project, Session};
use crate::github::{GitHubClient, GitHubError};

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error("access check unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Projects the session can see at all.
    async fn projects_visible_to(&self, session: &Session) -> Result<Vec<Project>, AccessError>;

    /// Whether the session currently has access to `project`.
    async fn has_access(&self, session: &Session, project: &Project) -> Result<bool, AccessError>;
}

/// Catalog projects, filtered by what the session's token can see on GitHub.
///
/// An anonymous session (empty token) is trusted with every catalog project;
/// the daemon runs with its operator's checkouts and has no user to check.
#[derive(Debug, Clone)]
pub struct GitHubAccessControl {
    catalog: ProjectCatalog,
    client: GitHubClient,
}

impl GitHubAccessControl {
    pub fn new(catalog: ProjectCatalog, client: GitHubClient) -> Self {
        Self { catalog, client }
    }
}

#[async_trait]
impl AccessControl for GitHubAccessControl {
    async fn projects_visible_to(&self, _session: &Session) -> Result<Vec<Project>, AccessError> {
        Ok(self.catalog.projects().to_vec())
    }

    async fn has_access(&self, session: &Session, project: &Project) -> Result<bool, AccessError> {
        if session.token().is_empty() {
            return Ok(true);
        }
        let slug = project.repo_slug().map_err(GitHubError::from)?;
        Ok(self.client.can_see_repo(session.token(), &slug).await?)
    }
}
