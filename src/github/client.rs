//! Capability traits over the GitHub API
//!
//! The watcher only needs `CommitSource`; the issue notifier only needs
//! `IssueTracker`. `RestClient` implements both.

use async_trait::async_trait;

use super::{ChangedFile, CommitSummary, CreatedIssue, GithubError, NewIssue};

/// Read access to branch history
#[async_trait]
pub trait CommitSource: Send + Sync {
    /// List the most recent `limit` commits reachable from `branch`
    async fn list_recent_commits(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        limit: u32,
    ) -> Result<Vec<CommitSummary>, GithubError>;

    /// List the files changed by commit `sha`
    async fn get_commit_files(&self, owner: &str, repo: &str, sha: &str) -> Result<Vec<ChangedFile>, GithubError>;
}

/// Issue search and creation
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Count issues matching a search query
    async fn count_issues(&self, query: &str) -> Result<u64, GithubError>;

    /// Create an issue on `owner/repo`
    async fn create_issue(&self, owner: &str, repo: &str, issue: &NewIssue) -> Result<CreatedIssue, GithubError>;
}
