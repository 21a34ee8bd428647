use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::github::visibility::Visibility;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("jib-gateway/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("Repository not found")]
    NotFound,

    #[error("GitHub API returned status {0}")]
    Status(u16),

    #[error("GitHub request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct RepoResponse {
    visibility: Option<String>,
}

/// Upstream repository metadata lookup
#[async_trait]
pub trait VisibilityApi: Send + Sync {
    /// `Ok(None)` when the response carries no recognised visibility
    async fn fetch_visibility(
        &self,
        owner: &str,
        repo: &str,
        token: &str,
    ) -> Result<Option<Visibility>, GitHubError>;
}

/// GitHub REST client for `GET /repos/{owner}/{repo}`
pub struct GitHubClient {
    api_base: String,
    http_client: Client,
}

impl GitHubClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, GitHubError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl VisibilityApi for GitHubClient {
    async fn fetch_visibility(
        &self,
        owner: &str,
        repo: &str,
        token: &str,
    ) -> Result<Option<Visibility>, GitHubError> {
        let url = format!("{}/repos/{}/{}", self.api_base, owner, repo);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .header("accept", "application/vnd.github+json")
            .header("x-github-api-version", "2022-11-28")
            .send()
            .await
            .map_err(|e| if e.is_timeout() { GitHubError::Timeout } else { e.into() })?;

        match response.status() {
            status if status.is_success() => {
                let body: RepoResponse = response.json().await?;
                Ok(body.visibility.as_deref().and_then(Visibility::from_api))
            }
            StatusCode::NOT_FOUND => Err(GitHubError::NotFound),
            status => Err(GitHubError::Status(status.as_u16())),
        }
    }
}
