//! Build record schema for the drydock build history
//!
//! Records:
//! - `Build`: one execution of a project's build command against a commit
//! - `ProjectId` / `CommitId`: identifiers shared by every layer above this one
//!
//! Builds are append-only. A record is created `pending` and moves exactly
//! once to a terminal status (`success` or `failure`).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// Duration value meaning "not yet measured".
pub const UNMEASURED_DURATION: f64 = -1.0;

/// Stable identifier of a project under CI management
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        ProjectId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commit identifier (hex SHA as printed by git)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl CommitId {
    pub fn new(sha: impl Into<String>) -> Self {
        CommitId(sha.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 chars) for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(12) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }

    /// `true` for a full hex object id (SHA-1 or SHA-256).
    pub fn is_full_sha(&self) -> bool {
        matches!(self.0.len(), 40 | 64) && self.0.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Success,
    Failure,
}

impl BuildStatus {
    /// `success` and `failure` are terminal; nothing moves out of them.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BuildStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Pending => "pending",
            BuildStatus::Success => "success",
            BuildStatus::Failure => "failure",
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded execution of a project's build against a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    /// Owning project
    pub project_id: ProjectId,
    /// Per-project build number, starting at 1
    pub number: u64,
    /// Commit the build ran against
    pub sha: CommitId,
    /// Current status
    pub status: BuildStatus,
    /// When the build was created
    pub timestamp: DateTime<Utc>,
    /// Elapsed seconds, or [`UNMEASURED_DURATION`]
    pub duration: f64,
}

impl Build {
    /// Create a new build in `pending` state with an unmeasured duration.
    pub fn pending(project_id: ProjectId, number: u64, sha: CommitId) -> Self {
        Self {
            project_id,
            number,
            sha,
            status: BuildStatus::Pending,
            timestamp: Utc::now(),
            duration: UNMEASURED_DURATION,
        }
    }

    /// Move a pending build to a terminal status, recording its duration.
    pub fn finish(&mut self, status: BuildStatus, elapsed: Duration) -> Result<(), RecordError> {
        if self.status.is_terminal() || !status.is_terminal() {
            return Err(RecordError::InvalidStatusTransition {
                current: self.status,
                requested: status,
            });
        }
        self.status = status;
        self.duration = elapsed.as_secs_f64();
        Ok(())
    }

    /// Measured duration, `None` while the sentinel is still set.
    pub fn measured_duration(&self) -> Option<Duration> {
        if self.duration < 0.0 {
            None
        } else {
            Some(Duration::from_secs_f64(self.duration))
        }
    }
}

/// Number the next build of a project should get.
///
/// `max(existing) + 1`, or 1 for an empty history. Gaps are never filled.
pub fn next_build_number(builds: &[Build]) -> u64 {
    builds.iter().map(|b| b.number).max().map_or(1, |n| n + 1)
}
