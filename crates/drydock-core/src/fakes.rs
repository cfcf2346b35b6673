//! In-memory collaborators for tests.
//!
//! Each fake records what it was asked to do and can be told to fail, so
//! runner and poller behaviour can be checked without git or the network.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use drydock_ci::{BuildCommand, CommandResult, ExecutionError};
use drydock_state::{BuildStatus, CommitId, ProjectId};

use crate::access::{AccessControl, AccessError};
use crate::domain::{Project, Session};
use crate::executor::{BuildExecutor, BuildOutcome};
use crate::status::{ReportError, StatusReporter};
use crate::workspace::{
    BuildTree, RemoteBranch, RepoWorkspace, WorkspaceError, WorkspaceProvider, WorkspaceResult,
};

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A project fixture with a trivially passing build command.
pub fn project(id: &str) -> Project {
    Project {
        id: ProjectId::new(id),
        name: id.to_string(),
        repo_url: format!("https://github.com/drydock-fixtures/{id}"),
        local_repo_path: PathBuf::from(format!("/srv/drydock/{id}")),
        build: BuildCommand::new(vec!["true".to_string()]),
    }
}

// ---------------------------------------------------------------------------
// Workspaces
// ---------------------------------------------------------------------------

#[derive(Default)]
struct WorkspaceState {
    branches: Vec<RemoteBranch>,
    head: Option<CommitId>,
    fetches: usize,
    checkouts: Vec<String>,
    fail_fetch: bool,
    fail_checkout: HashSet<String>,
    fail_trees: bool,
    prepared: usize,
    live: HashSet<PathBuf>,
}

/// Scriptable `RepoWorkspace`. Build trees are real directories under `root`.
pub struct FakeWorkspace {
    root: PathBuf,
    state: Mutex<WorkspaceState>,
}

impl FakeWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: Mutex::new(WorkspaceState::default()),
        }
    }

    /// Point `name` at `sha`, adding the branch if it is new.
    pub fn set_branch(&self, name: &str, sha: &str) {
        let mut state = locked(&self.state);
        let head = CommitId::new(sha);
        match state.branches.iter_mut().find(|b| b.name == name) {
            Some(branch) => branch.head = head,
            None => state.branches.push(RemoteBranch::new(name, head)),
        }
    }

    /// Add a symbolic ref such as `origin/HEAD`.
    pub fn set_symbolic(&self, name: &str, sha: &str) {
        let mut state = locked(&self.state);
        state.branches.push(RemoteBranch {
            name: name.to_string(),
            head: CommitId::new(sha),
            symbolic: true,
        });
    }

    pub fn fail_fetch(&self, fail: bool) {
        locked(&self.state).fail_fetch = fail;
    }

    pub fn fail_checkout(&self, branch: &str) {
        locked(&self.state).fail_checkout.insert(branch.to_string());
    }

    pub fn fail_trees(&self, fail: bool) {
        locked(&self.state).fail_trees = fail;
    }

    pub fn fetch_count(&self) -> usize {
        locked(&self.state).fetches
    }

    pub fn checkouts(&self) -> Vec<String> {
        locked(&self.state).checkouts.clone()
    }

    pub fn prepared_trees(&self) -> usize {
        locked(&self.state).prepared
    }

    pub fn live_trees(&self) -> usize {
        locked(&self.state).live.len()
    }
}

#[async_trait]
impl RepoWorkspace for FakeWorkspace {
    fn root(&self) -> PathBuf {
        self.root.clone()
    }

    async fn fetch(&self) -> WorkspaceResult<()> {
        let mut state = locked(&self.state);
        if state.fail_fetch {
            return Err(WorkspaceError::Git {
                command: "fetch".to_string(),
                stderr: "fatal: could not read from remote repository".to_string(),
            });
        }
        state.fetches += 1;
        Ok(())
    }

    async fn remote_branches(&self) -> WorkspaceResult<Vec<RemoteBranch>> {
        Ok(locked(&self.state).branches.clone())
    }

    async fn checkout(&self, branch: &str) -> WorkspaceResult<()> {
        let mut state = locked(&self.state);
        if state.fail_checkout.contains(branch) {
            return Err(WorkspaceError::Git {
                command: "checkout".to_string(),
                stderr: format!("error: pathspec '{branch}' did not match"),
            });
        }
        let head = state
            .branches
            .iter()
            .find(|b| b.name == branch)
            .map(|b| b.head.clone())
            .ok_or_else(|| WorkspaceError::Git {
                command: "checkout".to_string(),
                stderr: format!("unknown branch {branch}"),
            })?;
        state.head = Some(head);
        state.checkouts.push(branch.to_string());
        Ok(())
    }

    async fn current_head(&self) -> WorkspaceResult<CommitId> {
        locked(&self.state)
            .head
            .clone()
            .ok_or_else(|| WorkspaceError::InvalidOutput("HEAD is not set".to_string()))
    }

    async fn prepare_build_tree(&self, sha: &CommitId) -> WorkspaceResult<BuildTree> {
        if locked(&self.state).fail_trees {
            return Err(WorkspaceError::Git {
                command: "worktree".to_string(),
                stderr: "fatal: invalid reference".to_string(),
            });
        }
        let path = self
            .root
            .join("trees")
            .join(format!("{}-{}", sha.short(), uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&path)?;

        let mut state = locked(&self.state);
        state.prepared += 1;
        state.live.insert(path.clone());
        Ok(BuildTree {
            path,
            sha: sha.clone(),
        })
    }

    async fn release_build_tree(&self, tree: BuildTree) -> WorkspaceResult<()> {
        if tree.path.exists() {
            std::fs::remove_dir_all(&tree.path)?;
        }
        locked(&self.state).live.remove(&tree.path);
        Ok(())
    }
}

/// Hands out one `FakeWorkspace` per project, rooted at `<base>/<project>`.
pub struct FakeWorkspaces {
    base: PathBuf,
    workspaces: Mutex<HashMap<ProjectId, Arc<FakeWorkspace>>>,
}

impl FakeWorkspaces {
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
            workspaces: Mutex::new(HashMap::new()),
        }
    }

    pub fn workspace_for(&self, project: &Project) -> Arc<FakeWorkspace> {
        locked(&self.workspaces)
            .entry(project.id.clone())
            .or_insert_with(|| Arc::new(FakeWorkspace::new(self.base.join(project.id.as_str()))))
            .clone()
    }

    pub fn get(&self, id: &ProjectId) -> Option<Arc<FakeWorkspace>> {
        locked(&self.workspaces).get(id).cloned()
    }
}

impl WorkspaceProvider for FakeWorkspaces {
    fn workspace(&self, project: &Project) -> Arc<dyn RepoWorkspace> {
        self.workspace_for(project)
    }
}

// ---------------------------------------------------------------------------
// Status reporting
// ---------------------------------------------------------------------------

/// One call to `set_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub repo_url: String,
    pub sha: CommitId,
    pub state: BuildStatus,
    pub target_url: Option<String>,
}

/// Records reports. When failing, calls are still recorded before erroring.
#[derive(Default)]
pub struct RecordingStatusReporter {
    reports: Mutex<Vec<StatusReport>>,
    fail: AtomicBool,
}

impl RecordingStatusReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn reports(&self) -> Vec<StatusReport> {
        locked(&self.reports).clone()
    }

    pub fn states(&self) -> Vec<BuildStatus> {
        self.reports().into_iter().map(|r| r.state).collect()
    }
}

#[async_trait]
impl StatusReporter for RecordingStatusReporter {
    async fn set_status(
        &self,
        repo_url: &str,
        sha: &CommitId,
        state: BuildStatus,
        target_url: Option<&str>,
    ) -> Result<(), ReportError> {
        locked(&self.reports).push(StatusReport {
            repo_url: repo_url.to_string(),
            sha: sha.clone(),
            state,
            target_url: target_url.map(str::to_string),
        });
        if self.fail.load(Ordering::SeqCst) {
            return Err(ReportError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Script {
    Pass,
    Exit(i32),
    Error,
}

/// Executor returning a fixed outcome, optionally after a delay.
pub struct ScriptedExecutor {
    script: Script,
    delay: Option<Duration>,
    calls: Mutex<Vec<(ProjectId, CommitId)>>,
}

impl ScriptedExecutor {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn passing() -> Self {
        Self::with_script(Script::Pass)
    }

    /// The command runs and exits with `code`.
    pub fn exiting(code: i32) -> Self {
        Self::with_script(Script::Exit(code))
    }

    /// The command cannot be run at all.
    pub fn erroring() -> Self {
        Self::with_script(Script::Error)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(ProjectId, CommitId)> {
        locked(&self.calls).clone()
    }
}

#[async_trait]
impl BuildExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        project: &Project,
        sha: &CommitId,
    ) -> Result<BuildOutcome, ExecutionError> {
        locked(&self.calls).push((project.id.clone(), sha.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let exit_code = match self.script {
            Script::Pass => 0,
            Script::Exit(code) => code,
            Script::Error => {
                return Err(ExecutionError::Workspace("injected failure".to_string()))
            }
        };
        Ok(CommandResult {
            exit_code,
            stdout: String::new(),
            stderr: if exit_code == 0 {
                String::new()
            } else {
                "tests failed".to_string()
            },
            duration: self.delay.unwrap_or_default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Access control
// ---------------------------------------------------------------------------

/// Fixed project list with per-project access decisions.
#[derive(Default)]
pub struct StaticAccessControl {
    projects: Vec<Project>,
    denied: HashSet<ProjectId>,
    broken: HashSet<ProjectId>,
    fail_listing: bool,
}

impl StaticAccessControl {
    pub fn new(projects: Vec<Project>) -> Self {
        Self {
            projects,
            ..Self::default()
        }
    }

    pub fn deny(mut self, id: &str) -> Self {
        self.denied.insert(ProjectId::new(id));
        self
    }

    /// Access checks for `id` error out.
    pub fn broken(mut self, id: &str) -> Self {
        self.broken.insert(ProjectId::new(id));
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }
}

#[async_trait]
impl AccessControl for StaticAccessControl {
    async fn projects_visible_to(&self, _session: &Session) -> Result<Vec<Project>, AccessError> {
        if self.fail_listing {
            return Err(AccessError::Unavailable("injected failure".to_string()));
        }
        Ok(self.projects.clone())
    }

    async fn has_access(&self, _session: &Session, project: &Project) -> Result<bool, AccessError> {
        if self.broken.contains(&project.id) {
            return Err(AccessError::Unavailable("injected failure".to_string()));
        }
        Ok(!self.denied.contains(&project.id))
    }
}
