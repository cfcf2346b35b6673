//! GitHub REST client: commit statuses and repository visibility checks.

use async_trait::async_trait;
use drydock_state::{BuildStatus, CommitId};
use reqwest::StatusCode;

use crate::domain::{DomainError, RepoSlug};
use crate::status::{ReportError, StatusReporter};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_STATUS_CONTEXT: &str = "drydock";

const USER_AGENT: &str = concat!("drydock/", env!("CARGO_PKG_VERSION"));

/// Errors talking to the GitHub API.
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error(transparent)]
    Repo(#[from] DomainError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("github api returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Thin wrapper over `reqwest::Client` bound to one API base URL.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// `POST /repos/{owner}/{repo}/statuses/{sha}`.
    pub async fn post_status(
        &self,
        token: &str,
        slug: &RepoSlug,
        sha: &CommitId,
        payload: &StatusPayload,
    ) -> Result<(), GitHubError> {
        let url = format!("{}/repos/{slug}/statuses/{sha}", self.api_url);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .json(payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GitHubError::Api { status, body });
        }
        Ok(())
    }

    /// `GET /repos/{owner}/{repo}` with the caller's token.
    ///
    /// 401, 403 and 404 mean "not visible to this token"; other failures are
    /// errors.
    pub async fn can_see_repo(&self, token: &str, slug: &RepoSlug) -> Result<bool, GitHubError> {
        let url = format!("{}/repos/{slug}", self.api_url);
        let mut req = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT);
        if !token.is_empty() {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        let resp = req.send().await?;

        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(false),
            s => {
                let body = resp.text().await.unwrap_or_default();
                Err(GitHubError::Api {
                    status: s.as_u16(),
                    body,
                })
            }
        }
    }
}

/// Request body of the commit status endpoint.
#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq)]
pub struct StatusPayload {
    pub state: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    pub context: String,
}

impl StatusPayload {
    pub fn new(state: BuildStatus, target_url: Option<&str>, context: &str) -> Self {
        let description = match state {
            BuildStatus::Pending => "Build is running",
            BuildStatus::Success => "Build passed",
            BuildStatus::Failure => "Build failed",
        };
        Self {
            state: state.as_str().to_string(),
            description: description.to_string(),
            target_url: target_url.map(str::to_string),
            context: context.to_string(),
        }
    }
}

/// Publishes build states as GitHub commit statuses.
#[derive(Debug, Clone)]
pub struct GitHubStatusReporter {
    client: GitHubClient,
    token: String,
    context: String,
}

impl GitHubStatusReporter {
    pub fn new(client: GitHubClient, token: impl Into<String>) -> Self {
        Self {
            client,
            token: token.into(),
            context: DEFAULT_STATUS_CONTEXT.to_string(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

#[async_trait]
impl StatusReporter for GitHubStatusReporter {
    async fn set_status(
        &self,
        repo_url: &str,
        sha: &CommitId,
        state: BuildStatus,
        target_url: Option<&str>,
    ) -> Result<(), ReportError> {
        if self.token.is_empty() {
            tracing::debug!("GitHub token not set, skipping status update");
            return Ok(());
        }

        let slug = RepoSlug::parse(repo_url).map_err(GitHubError::from)?;
        let payload = StatusPayload::new(state, target_url, &self.context);
        self.client
            .post_status(&self.token, &slug, sha, &payload)
            .await?;

        tracing::debug!(repo = %slug, sha = %sha.short(), state = %state, "commit status posted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_shape() {
        let payload = StatusPayload::new(
            BuildStatus::Failure,
            Some("https://ci.example.com/projects/demo/builds/7"),
            "drydock",
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["state"], "failure");
        assert_eq!(json["context"], "drydock");
        assert_eq!(
            json["target_url"],
            "https://ci.example.com/projects/demo/builds/7"
        );
    }

    #[test]
    fn payload_omits_missing_target_url() {
        let payload = StatusPayload::new(BuildStatus::Pending, None, "drydock");
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("target_url").is_none());
        assert_eq!(json["state"], "pending");
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = GitHubClient::new("https://ghe.example.com/api/v3/");
        assert_eq!(client.api_url(), "https://ghe.example.com/api/v3");
    }

    #[tokio::test]
    async fn empty_token_skips_reporting() {
        let reporter = GitHubStatusReporter::new(GitHubClient::default(), "");
        reporter
            .set_status(
                "not even a url",
                &CommitId::new("a".repeat(40)),
                BuildStatus::Success,
                None,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bad_repo_url_is_a_report_error() {
        let reporter = GitHubStatusReporter::new(GitHubClient::default(), "token");
        let err = reporter
            .set_status(
                "/srv/git/local.git",
                &CommitId::new("a".repeat(40)),
                BuildStatus::Pending,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::GitHub(GitHubError::Repo(_))));
    }
}
