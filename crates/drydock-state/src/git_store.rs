//! Git-backed `BuildStore`.
//!
//! Layout under the data directory:
//!
//! ```text
//! <root>/projects/<project id>/builds/<number>.json
//! ```
//!
//! Records are written atomically (temp file in the same directory, then
//! rename). When `<root>` is a git repository, `commit_changes` stages the
//! `projects/` tree and commits it, optionally pushing to the upstream.
//! A plain directory is also accepted; commits are then a no-op.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::error::StorageError;
use crate::schema::{Build, ProjectId};
use crate::storage_traits::{BuildStore, StorageResult};

const PROJECTS_DIR: &str = "projects";

/// Build history persisted as JSON files in a (git) directory.
#[derive(Debug, Clone)]
pub struct GitBuildStore {
    root: PathBuf,
    push: bool,
    author_name: String,
    author_email: String,
}

impl GitBuildStore {
    /// Open a store rooted at `root`. Creates `root/projects/` if needed.
    pub fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(PROJECTS_DIR))?;
        Ok(Self {
            root,
            push: false,
            author_name: "drydock".to_string(),
            author_email: "drydock@localhost".to_string(),
        })
    }

    /// Push to the upstream after every commit.
    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    /// Identity used for record commits.
    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn builds_dir(&self, project: &ProjectId) -> PathBuf {
        self.root
            .join(PROJECTS_DIR)
            .join(path_segment(project.as_str()))
            .join("builds")
    }

    fn record_path(&self, project: &ProjectId, number: u64) -> PathBuf {
        self.builds_dir(project).join(format!("{number}.json"))
    }

    fn is_git_repo(&self) -> bool {
        self.root.join(".git").exists()
    }

    async fn git(&self, args: &[&str]) -> StorageResult<std::process::Output> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .await?;
        if !output.status.success() {
            // skip `-c key=value` overrides when naming the subcommand
            let command = args
                .iter()
                .find(|a| !a.starts_with('-') && !a.contains('='))
                .copied()
                .unwrap_or("git");
            return Err(StorageError::Git {
                command: command.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// `true` when the index differs from HEAD (something to commit).
    async fn has_staged_changes(&self) -> StorageResult<bool> {
        let status = Command::new("git")
            .args(["diff", "--cached", "--quiet"])
            .current_dir(&self.root)
            .status()
            .await?;
        // --quiet exits 1 when there are differences
        Ok(!status.success())
    }
}

/// Map a project id onto a single path segment.
///
/// Separators become `_`; ids that would name the current or parent
/// directory are escaped the same way.
pub fn path_segment(id: &str) -> String {
    let segment: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match segment.as_str() {
        "" | "." | ".." => segment.replace('.', "_") + "_",
        _ => segment,
    }
}

#[async_trait]
impl BuildStore for GitBuildStore {
    async fn list_builds(&self, project: &ProjectId) -> StorageResult<Vec<Build>> {
        let dir = self.builds_dir(project);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut builds = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            builds.push(read_record(&path, project)?);
        }
        builds.sort_by_key(|b| b.number);
        Ok(builds)
    }

    async fn add_or_update_build(&self, build: &Build) -> StorageResult<()> {
        let dir = self.builds_dir(&build.project_id);
        std::fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, build)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.record_path(&build.project_id, build.number))
            .map_err(|e| e.error)?;

        tracing::debug!(
            project = %build.project_id,
            build = build.number,
            status = %build.status,
            "build record written"
        );
        Ok(())
    }

    async fn commit_changes(&self, message: &str) -> StorageResult<()> {
        if !self.is_git_repo() {
            tracing::debug!(root = %self.root.display(), "data dir is not a git repo, skipping commit");
            return Ok(());
        }

        self.git(&["add", "--all", "--", PROJECTS_DIR]).await?;
        if !self.has_staged_changes().await? {
            return Ok(());
        }

        let name = format!("user.name={}", self.author_name);
        let email = format!("user.email={}", self.author_email);
        self.git(&["-c", &name, "-c", &email, "commit", "--quiet", "-m", message])
            .await?;

        if self.push {
            self.git(&["push", "--quiet"]).await?;
        }
        Ok(())
    }
}
