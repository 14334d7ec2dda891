//! GitHub API data types
//!
//! The public types are what the rest of the crate works with. The `Api*`
//! types mirror the REST payloads and are converted at the client boundary.

use serde::{Deserialize, Serialize};

/// A commit as listed on a branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    pub html_url: String,
    pub message: String,
}

/// A file touched by a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
}

impl ChangedFile {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }
}

/// Issue to be created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub labels: Vec<String>,
}

/// Issue returned after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub number: u64,
    pub html_url: String,
}

/// `GET /repos/{owner}/{repo}/commits` element
#[derive(Debug, Deserialize)]
pub(crate) struct ApiCommit {
    pub sha: String,
    pub html_url: String,
    pub commit: ApiCommitDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiCommitDetail {
    pub message: String,
}

impl From<ApiCommit> for CommitSummary {
    fn from(c: ApiCommit) -> Self {
        Self {
            sha: c.sha,
            html_url: c.html_url,
            message: c.commit.message,
        }
    }
}

/// `GET /repos/{owner}/{repo}/commits/{sha}`
///
/// `files` is omitted by the API for some merge commits.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiCommitWithFiles {
    #[serde(default)]
    pub files: Vec<ChangedFile>,
}

/// `GET /search/issues`
#[derive(Debug, Deserialize)]
pub(crate) struct ApiSearchResult {
    pub total_count: u64,
}
