//! GitHub REST v3 client
//!
//! Implements `CommitSource` and `IssueTracker` over reqwest. Retries are left
//! to the caller: the watcher retries implicitly on its next poll.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{ApiCommit, ApiCommitWithFiles, ApiSearchResult};
use super::{ChangedFile, CommitSource, CommitSummary, CreatedIssue, GithubError, IssueTracker, NewIssue};
use crate::config::GithubConfig;

const API_VERSION: &str = "2022-11-28";

/// GitHub REST API client
#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    http: Client,
}

impl RestClient {
    /// Create a client from configuration
    ///
    /// The token is read from the environment variable named in config; without
    /// one the client makes anonymous requests.
    pub fn from_config(config: &GithubConfig) -> Result<Self, GithubError> {
        debug!(base_url = %config.base_url, token_env = %config.token_env, "RestClient::from_config: called");
        Self::new(&config.base_url, config.get_token().as_deref(), config.timeout())
    }

    /// Create a client against `base_url` with an optional token
    pub fn new(base_url: &str, token: Option<&str>, timeout: std::time::Duration) -> Result<Self, GithubError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("sharin/", env!("CARGO_PKG_VERSION"))),
        );
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        if let Some(token) = token {
            debug!("RestClient::new: using token authentication");
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| GithubError::InvalidResponse(format!("Invalid token: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        } else {
            debug!("RestClient::new: no token, anonymous requests");
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(GithubError::Network)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a response into `T`, mapping non-success statuses to errors
    async fn decode<T: DeserializeOwned>(response: Response, resource: &str) -> Result<T, GithubError> {
        let status = response.status();
        if status.is_success() {
            let text = response.text().await?;
            return Ok(serde_json::from_str(&text)?);
        }

        let header_u64 = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
        };
        let remaining = header_u64("x-ratelimit-remaining");
        let reset = header_u64("x-ratelimit-reset");
        let body = response.text().await.unwrap_or_default();

        debug!(status = status.as_u16(), %resource, "RestClient::decode: API error");
        Err(GithubError::from_status(status.as_u16(), &body, resource, remaining, reset))
    }
}

#[async_trait]
impl CommitSource for RestClient {
    async fn list_recent_commits(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        limit: u32,
    ) -> Result<Vec<CommitSummary>, GithubError> {
        debug!(%owner, %repo, %branch, limit, "RestClient::list_recent_commits: called");
        let limit = limit.to_string();
        let response = self
            .http
            .get(self.url(&format!("/repos/{}/{}/commits", owner, repo)))
            .query(&[("sha", branch), ("per_page", limit.as_str())])
            .send()
            .await?;

        let commits: Vec<ApiCommit> = Self::decode(response, &format!("{}/{}@{}", owner, repo, branch)).await?;
        debug!(count = commits.len(), "RestClient::list_recent_commits: received");
        Ok(commits.into_iter().map(CommitSummary::from).collect())
    }

    async fn get_commit_files(&self, owner: &str, repo: &str, sha: &str) -> Result<Vec<ChangedFile>, GithubError> {
        debug!(%owner, %repo, %sha, "RestClient::get_commit_files: called");
        let response = self
            .http
            .get(self.url(&format!("/repos/{}/{}/commits/{}", owner, repo, sha)))
            .send()
            .await?;

        let commit: ApiCommitWithFiles = Self::decode(response, &format!("{}/{}@{}", owner, repo, sha)).await?;
        Ok(commit.files)
    }
}

#[async_trait]
impl IssueTracker for RestClient {
    async fn count_issues(&self, query: &str) -> Result<u64, GithubError> {
        debug!(%query, "RestClient::count_issues: called");
        let response = self
            .http
            .get(self.url("/search/issues"))
            .query(&[("q", query), ("per_page", "1")])
            .send()
            .await?;

        let result: ApiSearchResult = Self::decode(response, "search/issues").await?;
        Ok(result.total_count)
    }

    async fn create_issue(&self, owner: &str, repo: &str, issue: &NewIssue) -> Result<CreatedIssue, GithubError> {
        debug!(%owner, %repo, title = %issue.title, "RestClient::create_issue: called");
        let response = self
            .http
            .post(self.url(&format!("/repos/{}/{}/issues", owner, repo)))
            .json(issue)
            .send()
            .await?;

        Self::decode(response, &format!("{}/{}", owner, repo)).await
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_from_config_anonymous() {
        let config = GithubConfig {
            token_env: "SHARIN_TEST_UNSET_TOKEN_VAR".to_string(),
            ..Default::default()
        };
        let client = RestClient::from_config(&config).unwrap();
        assert_eq!(client.url("/rate_limit"), "https://api.github.com/rate_limit");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = RestClient::new("https://ghe.example.com/api/v3/", Some("t0ken"), Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.url("/repos/acme/widgets/commits"),
            "https://ghe.example.com/api/v3/repos/acme/widgets/commits"
        );
    }

    #[test]
    fn test_invalid_token_rejected() {
        let result = RestClient::new("https://api.github.com", Some("bad\ntoken"), Duration::from_secs(5));
        assert!(matches!(result, Err(GithubError::InvalidResponse(_))));
    }

    #[test]
    fn test_debug_hides_client_internals() {
        let client = RestClient::new("https://api.github.com", Some("secret"), Duration::from_secs(5)).unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("api.github.com"));
        assert!(!debug.contains("secret"));
    }
}
