//! Projects under CI management and the sessions that poll them.

use std::path::PathBuf;

use drydock_ci::BuildCommand;
use drydock_state::ProjectId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::error::{DomainError, Result};

fn repo_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:https?://[^/]+/|ssh://git@[^/]+/|git@[^:]+:)([^/\s]+)/([^/\s]+?)(?:\.git)?/?$",
        )
        .expect("repo url pattern is valid")
    })
}

/// A source repository under CI management.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    /// Stable identifier, used as the build history key.
    pub id: ProjectId,

    /// Display name.
    pub name: String,

    /// Remote identity used for cloning and status reporting.
    pub repo_url: String,

    /// Local working copy.
    pub local_repo_path: PathBuf,

    /// How to build a commit.
    pub build: BuildCommand,
}

impl Project {
    /// `owner/name` of the remote repository.
    pub fn repo_slug(&self) -> Result<RepoSlug> {
        RepoSlug::parse(&self.repo_url)
    }
}

/// Owner and name of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    /// Parse `https://host/owner/name(.git)`, `git@host:owner/name(.git)`
    /// or `ssh://git@host/owner/name(.git)`.
    pub fn parse(url: &str) -> Result<Self> {
        let caps = repo_url_pattern()
            .captures(url.trim())
            .ok_or_else(|| DomainError::InvalidRepoUrl(url.to_string()))?;
        Ok(Self {
            owner: caps[1].to_string(),
            name: caps[2].to_string(),
        })
    }
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Credentials a poll runs under.
#[derive(Clone)]
pub struct Session {
    /// Login the session belongs to.
    pub user: String,
    token: String,
}

impl Session {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
        }
    }

    /// API token; empty when the session is anonymous.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}
