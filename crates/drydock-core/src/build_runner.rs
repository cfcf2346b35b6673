//! Build execution and status reconciliation.
//!
//! A run allocates the next build number, records the build as `pending`,
//! executes it and records the terminal status. Every state change is
//! reconciled in two steps: the local store first (fatal on failure), then
//! the remote status mirror (logged and ignored on failure).

use std::sync::Arc;
use std::time::Instant;

use drydock_state::{
    next_build_number, Build, BuildStatus, BuildStore, CommitId, ProjectId, RecordError,
    StorageError, StorageResult,
};
use tracing::Instrument;

use crate::domain::Project;
use crate::executor::BuildExecutor;
use crate::locks::ProjectLocks;
use crate::metrics::METRICS;
use crate::obs;
use crate::status::StatusReporter;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("could not read build history of {project}: {source}")]
    HistoryUnavailable {
        project: ProjectId,
        #[source]
        source: StorageError,
    },

    #[error("failed to persist build {number} of {project}: {source}")]
    LocalPersistenceFailed {
        project: ProjectId,
        number: u64,
        #[source]
        source: StorageError,
    },

    #[error(transparent)]
    InvalidTransition(#[from] RecordError),
}

/// Runs builds for projects and keeps the store and status mirror in step.
pub struct BuildRunner {
    store: Arc<dyn BuildStore>,
    reporter: Arc<dyn StatusReporter>,
    executor: Arc<dyn BuildExecutor>,
    locks: ProjectLocks,
    dashboard_url: Option<String>,
}

impl BuildRunner {
    pub fn new(
        store: Arc<dyn BuildStore>,
        reporter: Arc<dyn StatusReporter>,
        executor: Arc<dyn BuildExecutor>,
    ) -> Self {
        Self {
            store,
            reporter,
            executor,
            locks: ProjectLocks::new(),
            dashboard_url: None,
        }
    }

    /// Share a lock registry with other runners in the process.
    pub fn with_locks(mut self, locks: ProjectLocks) -> Self {
        self.locks = locks;
        self
    }

    /// Base URL status reports link back to.
    pub fn with_dashboard_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        let url = url.trim_end_matches('/');
        self.dashboard_url = (!url.is_empty()).then(|| url.to_string());
        self
    }

    pub fn store(&self) -> &Arc<dyn BuildStore> {
        &self.store
    }

    /// Build `project` at `sha` and return the terminal record.
    ///
    /// Number allocation, execution and persistence happen under the
    /// project's lock, so concurrent runs of one project are numbered
    /// without gaps or repeats.
    pub async fn run(&self, project: &Project, sha: &CommitId) -> Result<Build, RunnerError> {
        self.run_locked(project, sha)
            .instrument(obs::build_span(&project.id, sha))
            .await
    }

    async fn run_locked(&self, project: &Project, sha: &CommitId) -> Result<Build, RunnerError> {
        let _guard = self.locks.lock(&project.id).await;

        let history = self.store.list_builds(&project.id).await.map_err(|source| {
            RunnerError::HistoryUnavailable {
                project: project.id.clone(),
                source,
            }
        })?;

        let mut build = Build::pending(project.id.clone(), next_build_number(&history), sha.clone());
        self.update_status(project, &build).await?;
        METRICS.inc_builds_started();
        obs::emit_build_started(&build);

        let start = Instant::now();
        let status = match self.executor.execute(project, sha).await {
            Ok(outcome) if outcome.passed() => BuildStatus::Success,
            Ok(outcome) => {
                tracing::info!(
                    exit_code = outcome.exit_code,
                    stderr_tail = %tail_lines(&outcome.stderr, 5),
                    "build command failed"
                );
                BuildStatus::Failure
            }
            Err(e) => {
                obs::emit_execution_error(&build, &e);
                BuildStatus::Failure
            }
        };
        let elapsed = start.elapsed();
        build.finish(status, elapsed)?;

        METRICS.record_build_finished(build.status);
        obs::emit_build_finished(&build, elapsed);

        self.update_status(project, &build).await?;
        Ok(build)
    }

    /// Make `build`'s current state visible: store first, then the mirror.
    async fn update_status(&self, project: &Project, build: &Build) -> Result<(), RunnerError> {
        if let Err(source) = self.persist(build).await {
            obs::emit_local_persist_failed(build, &source);
            return Err(RunnerError::LocalPersistenceFailed {
                project: build.project_id.clone(),
                number: build.number,
                source,
            });
        }

        let target_url = self.target_url(build);
        if let Err(e) = self
            .reporter
            .set_status(&project.repo_url, &build.sha, build.status, target_url.as_deref())
            .await
        {
            METRICS.inc_status_report_failures();
            obs::emit_status_report_failed(build, &e);
        }
        Ok(())
    }

    async fn persist(&self, build: &Build) -> StorageResult<()> {
        self.store.add_or_update_build(build).await?;
        self.store
            .commit_changes(&format!(
                "Build #{} of {} is {} ({})",
                build.number,
                build.project_id,
                build.status,
                build.sha.short()
            ))
            .await
    }

    fn target_url(&self, build: &Build) -> Option<String> {
        self.dashboard_url.as_ref().map(|base| {
            format!(
                "{base}/projects/{}/builds/{}",
                build.project_id, build.number
            )
        })
    }
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
