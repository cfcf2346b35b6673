//! `RepoWorkspace` backed by the `git` command-line client.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use drydock_state::{path_segment, CommitId};
use tokio::process::Command;

use crate::domain::Project;
use crate::workspace::{
    BuildTree, RemoteBranch, RepoWorkspace, WorkspaceError, WorkspaceProvider, WorkspaceResult,
};

/// Run `git` in `dir` and return trimmed stdout.
pub async fn run_git(dir: &Path, args: &[&str]) -> WorkspaceResult<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .await?;

    if !output.status.success() {
        return Err(WorkspaceError::Git {
            command: subcommand(args).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn subcommand<'a>(args: &[&'a str]) -> &'a str {
    args.iter()
        .copied()
        .find(|a| !a.starts_with('-') && !a.contains('='))
        .unwrap_or("git")
}

// git runs elsewhere than the process cwd; clone and worktree targets must be absolute.
fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

/// Parse a full hex commit id, e.g. `git rev-parse HEAD` output.
pub fn parse_sha(output: &str) -> WorkspaceResult<CommitId> {
    let sha = CommitId::new(output.trim());
    if !sha.is_full_sha() {
        return Err(WorkspaceError::InvalidOutput(format!(
            "expected a commit id, got {:?}",
            sha.as_str()
        )));
    }
    Ok(sha)
}

/// Parse `for-each-ref --format=%(refname)%09%(objectname)%09%(symref)` output.
fn parse_remote_refs(output: &str) -> WorkspaceResult<Vec<RemoteBranch>> {
    let mut branches = Vec::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let mut fields = line.split('\t');
        let (Some(refname), Some(object)) = (fields.next(), fields.next()) else {
            return Err(WorkspaceError::InvalidOutput(format!(
                "malformed ref line {line:?}"
            )));
        };
        let symref = fields.next().unwrap_or("").trim();
        let name = refname.strip_prefix("refs/remotes/").unwrap_or(refname);

        branches.push(RemoteBranch {
            name: name.to_string(),
            head: parse_sha(object)?,
            symbolic: !symref.is_empty(),
        });
    }
    Ok(branches)
}

/// A project's shared checkout plus a directory of per-build worktrees.
#[derive(Debug, Clone)]
pub struct GitWorkspace {
    root: PathBuf,
    repo_url: String,
    trees_dir: PathBuf,
}

impl GitWorkspace {
    /// `root` is cloned from `repo_url` on first fetch when it is not yet a
    /// repository. Build trees are created under `trees_dir`.
    pub fn new(
        root: impl Into<PathBuf>,
        repo_url: impl Into<String>,
        trees_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            root: absolutize(root.into()),
            repo_url: repo_url.into(),
            trees_dir: absolutize(trees_dir.into()),
        }
    }

    pub fn trees_dir(&self) -> &Path {
        &self.trees_dir
    }

    async fn ensure_clone(&self) -> WorkspaceResult<()> {
        if self.root.join(".git").exists() {
            return Ok(());
        }

        let parent = self
            .root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        tokio::fs::create_dir_all(&parent).await?;

        let target = self.root.to_string_lossy().to_string();
        tracing::info!(repo = %self.repo_url, path = %target, "cloning repository");
        run_git(&parent, &["clone", "--quiet", &self.repo_url, &target]).await?;
        Ok(())
    }
}

#[async_trait]
impl RepoWorkspace for GitWorkspace {
    fn root(&self) -> PathBuf {
        self.root.clone()
    }

    async fn fetch(&self) -> WorkspaceResult<()> {
        self.ensure_clone().await?;
        run_git(&self.root, &["fetch", "--all", "--prune", "--quiet"]).await?;
        Ok(())
    }

    async fn remote_branches(&self) -> WorkspaceResult<Vec<RemoteBranch>> {
        let out = run_git(
            &self.root,
            &[
                "for-each-ref",
                "--format=%(refname)%09%(objectname)%09%(symref)",
                "refs/remotes",
            ],
        )
        .await?;
        parse_remote_refs(&out)
    }

    async fn checkout(&self, branch: &str) -> WorkspaceResult<()> {
        run_git(&self.root, &["checkout", "--quiet", "--detach", branch]).await?;
        Ok(())
    }

    async fn current_head(&self) -> WorkspaceResult<CommitId> {
        let out = run_git(&self.root, &["rev-parse", "HEAD"]).await?;
        parse_sha(&out)
    }

    async fn prepare_build_tree(&self, sha: &CommitId) -> WorkspaceResult<BuildTree> {
        tokio::fs::create_dir_all(&self.trees_dir).await?;
        let path = self
            .trees_dir
            .join(format!("{}-{}", sha.short(), uuid::Uuid::new_v4().simple()));
        let target = path.to_string_lossy().to_string();

        run_git(
            &self.root,
            &["worktree", "add", "--detach", "--quiet", &target, sha.as_str()],
        )
        .await?;

        Ok(BuildTree {
            path,
            sha: sha.clone(),
        })
    }

    async fn release_build_tree(&self, tree: BuildTree) -> WorkspaceResult<()> {
        let target = tree.path.to_string_lossy().to_string();
        if let Err(e) = run_git(&self.root, &["worktree", "remove", "--force", &target]).await {
            tracing::warn!(path = %target, error = %e, "worktree remove failed, deleting directory");
            if tree.path.exists() {
                tokio::fs::remove_dir_all(&tree.path).await?;
            }
        }
        run_git(&self.root, &["worktree", "prune"]).await?;
        Ok(())
    }
}

/// Lays projects out as `<base>/<project>/checkout` with build trees in
/// `<base>/<project>/trees`, unless the project names its own checkout.
/// The project id is reduced to a single path segment first.
#[derive(Debug, Clone)]
pub struct GitWorkspaceProvider {
    base: PathBuf,
}

impl GitWorkspaceProvider {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl WorkspaceProvider for GitWorkspaceProvider {
    fn workspace(&self, project: &Project) -> Arc<dyn RepoWorkspace> {
        let project_dir = self.base.join(path_segment(project.id.as_str()));
        let root = if project.local_repo_path.as_os_str().is_empty() {
            project_dir.join("checkout")
        } else {
            project.local_repo_path.clone()
        };
        Arc::new(GitWorkspace::new(
            root,
            project.repo_url.clone(),
            project_dir.join("trees"),
        ))
    }
}
