//! Wiring of the concrete adapters into a runnable controller.
//!
//! Data directory layout:
//!
//! ```text
//! <data_dir>/records      GitBuildStore root (commit history when it is a git repo)
//! <data_dir>/workspaces   per-project checkouts and build trees
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use drydock_state::{GitBuildStore, StorageError};

use crate::access::GitHubAccessControl;
use crate::build_runner::BuildRunner;
use crate::catalog::ProjectCatalog;
use crate::domain::{DomainError, Session};
use crate::executor::WorkspaceExecutor;
use crate::git::GitWorkspaceProvider;
use crate::github::{GitHubClient, GitHubStatusReporter, DEFAULT_API_URL, DEFAULT_STATUS_CONTEXT};
use crate::poller::CommitPoller;
use crate::status::{NoopStatusReporter, StatusReporter};
use crate::workspace::WorkspaceProvider;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("failed to load project catalog: {0}")]
    Catalog(#[from] DomainError),

    #[error("failed to open build records: {0}")]
    Store(#[from] StorageError),
}

/// Everything needed to assemble a controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub catalog_path: PathBuf,
    pub data_dir: PathBuf,
    pub github_api_url: String,
    pub github_token: String,
    pub status_context: String,
    pub dashboard_url: Option<String>,
    pub push_build_records: bool,
    pub user: String,
}

impl ControllerConfig {
    pub fn new(catalog_path: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog_path: catalog_path.into(),
            data_dir: data_dir.into(),
            github_api_url: DEFAULT_API_URL.to_string(),
            github_token: String::new(),
            status_context: DEFAULT_STATUS_CONTEXT.to_string(),
            dashboard_url: None,
            push_build_records: false,
            user: "drydock".to_string(),
        }
    }

    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("records")
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.data_dir.join("workspaces")
    }

    pub fn session(&self) -> Session {
        Session::new(self.user.clone(), self.github_token.clone())
    }
}

/// A fully wired controller.
pub struct Controller {
    pub catalog: ProjectCatalog,
    pub store: Arc<GitBuildStore>,
    pub workspaces: Arc<dyn WorkspaceProvider>,
    pub runner: Arc<BuildRunner>,
    pub poller: CommitPoller,
}

impl Controller {
    pub fn open(config: &ControllerConfig) -> Result<Self, ControllerError> {
        let catalog = ProjectCatalog::load(&config.catalog_path)?;
        let store = Arc::new(
            GitBuildStore::open(config.records_dir())?.with_push(config.push_build_records),
        );
        let workspaces: Arc<dyn WorkspaceProvider> =
            Arc::new(GitWorkspaceProvider::new(config.workspaces_dir()));

        let client = GitHubClient::new(config.github_api_url.clone());
        let reporter: Arc<dyn StatusReporter> = if config.github_token.is_empty() {
            tracing::info!("no GitHub token configured, commit statuses will not be posted");
            Arc::new(NoopStatusReporter)
        } else {
            Arc::new(
                GitHubStatusReporter::new(client.clone(), config.github_token.clone())
                    .with_context(config.status_context.clone()),
            )
        };

        let mut runner = BuildRunner::new(
            store.clone(),
            reporter,
            Arc::new(WorkspaceExecutor::new(workspaces.clone())),
        );
        if let Some(url) = &config.dashboard_url {
            runner = runner.with_dashboard_url(url.clone());
        }
        let runner = Arc::new(runner);

        let poller = CommitPoller::new(
            Arc::new(GitHubAccessControl::new(catalog.clone(), client)),
            workspaces.clone(),
            runner.clone(),
        );

        Ok(Self {
            catalog,
            store,
            workspaces,
            runner,
            poller,
        })
    }
}
