//! Commit polling.
//!
//! Each tick walks every project the session can access, fetches it, and
//! builds the tip of every real remote branch that has moved since it was
//! last built. A broken project or branch is logged and skipped; it never
//! stops the rest of the tick.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use drydock_state::{Build, CommitId, ProjectId};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::access::AccessControl;
use crate::build_runner::{BuildRunner, RunnerError};
use crate::domain::{Project, Session};
use crate::locks::ProjectLocks;
use crate::metrics::METRICS;
use crate::obs;
use crate::workspace::{RemoteBranch, RepoWorkspace, WorkspaceError, WorkspaceProvider};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Counts of what one tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub projects_seen: usize,
    pub skipped_no_access: usize,
    pub failed_projects: usize,
    pub builds_triggered: usize,
    pub skipped_already_built: usize,
    pub branch_errors: usize,
}

/// Last commit built per `(project, branch)`.
///
/// Held in memory only: after a restart every branch tip is built once more.
#[derive(Debug, Clone, Default)]
pub struct BuiltCommits {
    inner: Arc<Mutex<HashMap<(ProjectId, String), CommitId>>>,
}

impl BuiltCommits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn already_built(&self, project: &ProjectId, branch: &str, sha: &CommitId) -> bool {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&(project.clone(), branch.to_string())) == Some(sha)
    }

    pub fn record(&self, project: &ProjectId, branch: &str, sha: &CommitId) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.insert((project.clone(), branch.to_string()), sha.clone());
    }

    pub fn last_built(&self, project: &ProjectId, branch: &str) -> Option<CommitId> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&(project.clone(), branch.to_string())).cloned()
    }

    /// Drop the entry for `(project, branch)` if it still points at `sha`.
    pub fn forget(&self, project: &ProjectId, branch: &str, sha: &CommitId) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let key = (project.clone(), branch.to_string());
        if map.get(&key) == Some(sha) {
            map.remove(&key);
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, thiserror::Error)]
enum BranchError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("build task ended without a result")]
    TaskLost(#[from] oneshot::error::RecvError),
}

enum BranchOutcome {
    Built,
    AlreadyBuilt,
}

pub struct CommitPoller {
    access: Arc<dyn AccessControl>,
    workspaces: Arc<dyn WorkspaceProvider>,
    runner: Arc<BuildRunner>,
    built: BuiltCommits,
    workspace_locks: ProjectLocks,
    builds: Mutex<Vec<JoinHandle<()>>>,
}

impl CommitPoller {
    pub fn new(
        access: Arc<dyn AccessControl>,
        workspaces: Arc<dyn WorkspaceProvider>,
        runner: Arc<BuildRunner>,
    ) -> Self {
        Self {
            access,
            workspaces,
            runner,
            built: BuiltCommits::new(),
            workspace_locks: ProjectLocks::new(),
            builds: Mutex::new(Vec::new()),
        }
    }

    pub fn with_built_commits(mut self, built: BuiltCommits) -> Self {
        self.built = built;
        self
    }

    pub fn built_commits(&self) -> &BuiltCommits {
        &self.built
    }

    /// One pass over every project visible to `session`.
    pub async fn tick(&self, session: &Session) -> TickReport {
        let start = Instant::now();
        METRICS.inc_poll_ticks();
        let mut report = TickReport::default();

        let projects = match self.access.projects_visible_to(session).await {
            Ok(projects) => projects,
            Err(e) => {
                tracing::error!(user = %session.user, error = %e, "could not list projects");
                return report;
            }
        };

        for project in &projects {
            report.projects_seen += 1;

            match self.access.has_access(session, project).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(project = %project.id, user = %session.user, "no access, skipping");
                    report.skipped_no_access += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(project = %project.id, error = %e, "access check failed");
                    report.failed_projects += 1;
                    continue;
                }
            }

            if let Err(e) = self.poll_project(project, &mut report).await {
                tracing::warn!(project = %project.id, error = %e, "polling project failed");
                report.failed_projects += 1;
            }
        }

        obs::emit_tick_finished(&report, start.elapsed());
        METRICS.flush();
        report
    }

    async fn poll_project(
        &self,
        project: &Project,
        report: &mut TickReport,
    ) -> Result<(), WorkspaceError> {
        let _guard = self.workspace_locks.lock(&project.id).await;
        let workspace = self.workspaces.workspace(project);

        workspace.fetch().await?;
        let branches = workspace.remote_branches().await?;

        for branch in branches.iter().filter(|b| !b.is_symbolic()) {
            match self.poll_branch(project, workspace.as_ref(), branch).await {
                Ok(BranchOutcome::Built) => report.builds_triggered += 1,
                Ok(BranchOutcome::AlreadyBuilt) => report.skipped_already_built += 1,
                Err(e) => {
                    tracing::warn!(
                        project = %project.id,
                        branch = %branch.name,
                        error = %e,
                        "branch skipped"
                    );
                    report.branch_errors += 1;
                }
            }
        }
        Ok(())
    }

    async fn poll_branch(
        &self,
        project: &Project,
        workspace: &dyn RepoWorkspace,
        branch: &RemoteBranch,
    ) -> Result<BranchOutcome, BranchError> {
        workspace.checkout(&branch.name).await?;
        let sha = workspace.current_head().await?;

        if self.built.already_built(&project.id, &branch.name, &sha) {
            tracing::trace!(project = %project.id, branch = %branch.name, sha = %sha.short(), "already built");
            return Ok(BranchOutcome::AlreadyBuilt);
        }

        let build = self.spawn_build(project, &branch.name, &sha).await??;
        tracing::debug!(
            project = %project.id,
            branch = %branch.name,
            build = build.number,
            status = %build.status,
            "branch built"
        );
        Ok(BranchOutcome::Built)
    }

    /// Run the build in its own task and wait for its result.
    ///
    /// If the tick is dropped while waiting, the build still runs to its
    /// terminal record; [`CommitPoller::drain`] waits for such builds. The
    /// ledger entry is taken before the build starts so later ticks do not
    /// queue the same commit again, and is dropped if the run fails or its task
    /// dies.
    async fn spawn_build(
        &self,
        project: &Project,
        branch: &str,
        sha: &CommitId,
    ) -> Result<Result<Build, RunnerError>, oneshot::error::RecvError> {
        self.built.record(&project.id, branch, sha);

        let (tx, rx) = oneshot::channel();
        let runner = self.runner.clone();
        let built = self.built.clone();
        let (task_project, task_branch, task_sha) =
            (project.clone(), branch.to_string(), sha.clone());
        let handle = tokio::spawn(async move {
            let result = runner.run(&task_project, &task_sha).await;
            if result.is_err() {
                built.forget(&task_project.id, &task_branch, &task_sha);
            }
            let _ = tx.send(result);
        });

        {
            let mut builds = lock(&self.builds);
            builds.retain(|h| !h.is_finished());
            builds.push(handle);
        }

        let result = rx.await;
        if result.is_err() {
            self.built.forget(&project.id, branch, sha);
        }
        result
    }

    /// Wait for every build started by earlier ticks, including builds whose
    /// tick was abandoned.
    pub async fn drain(&self) {
        loop {
            let pending = std::mem::take(&mut *lock(&self.builds));
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "build task failed");
                }
            }
        }
    }
}

/// How often to tick and how long a tick may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Minimum idle time between the end of one tick and the start of the next.
    pub interval: Duration,

    /// Stop waiting for a tick that runs longer than this. Builds it started
    /// keep running in the background and still record a terminal status.
    pub tick_timeout: Option<Duration>,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            tick_timeout: None,
        }
    }
}

/// Tick sequentially until `shutdown` resolves. Returns the number of ticks run.
///
/// Shutdown is only observed between ticks; an in-flight tick always runs to
/// completion (or to its timeout). Builds still running at shutdown are
/// awaited before returning.
pub async fn run_forever<F>(
    poller: &CommitPoller,
    session: &Session,
    schedule: PollSchedule,
    shutdown: F,
) -> u64
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut ticks = 0u64;

    loop {
        match schedule.tick_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, poller.tick(session)).await.is_err() {
                    tracing::warn!(timeout_secs = limit.as_secs(), "poll tick abandoned");
                }
            }
            None => {
                poller.tick(session).await;
            }
        }
        ticks += 1;

        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(schedule.interval) => {}
        }
    }

    poller.drain().await;
    tracing::info!(ticks, "poller stopped");
    ticks
}
