//! Signals emitted by the BranchWatcher

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::github::GithubError;

/// A commit not seen before on a watched branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCommit {
    pub owner: String,
    pub repo: String,
    /// Commit SHA
    pub commit: String,
    /// Web URL of the commit
    pub link: String,
    /// Full commit message
    pub message: String,
    /// Changed files passing the target's path filter; empty without a filter
    pub filenames: Vec<String>,
}

impl NewCommit {
    /// First line of the commit message
    pub fn title(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// Errors raised while watching
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to fetch commits for {owner}/{repo}@{branch}: {source}")]
    Fetch {
        owner: String,
        repo: String,
        branch: String,
        #[source]
        source: GithubError,
    },

    #[error("Failed to check commit {sha} on {owner}/{repo}: {source}")]
    CommitCheck {
        owner: String,
        repo: String,
        sha: String,
        #[source]
        source: GithubError,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("{operation} panicked: {reason}")]
    Panicked { operation: String, reason: String },

    #[error("Tick aborted: {0}")]
    TickAborted(String),
}

impl WatchError {
    /// Whether this error ends scheduling
    pub fn is_fatal(&self) -> bool {
        matches!(self, WatchError::TickAborted(_))
    }

    /// Whether the next poll can be expected to succeed
    ///
    /// Every non-fatal error is retried anyway; this only tells transient
    /// failures apart from ones that need attention.
    pub fn is_retryable(&self) -> bool {
        match self {
            WatchError::Fetch { source, .. } | WatchError::CommitCheck { source, .. } => source.is_retryable(),
            WatchError::Timeout { .. } => true,
            WatchError::Panicked { .. } => false,
            WatchError::TickAborted(_) => false,
        }
    }
}

/// Signal sent to watcher subscribers
#[derive(Debug, Clone)]
pub enum WatchSignal {
    /// Fatal; no further ticks are scheduled
    Error(Arc<WatchError>),
    /// Recoverable failure of one commit or one target
    Warning(Arc<WatchError>),
    /// A new commit was offered to the listeners
    NewCommit { commit: NewCommit, accepted: bool },
    /// A tick finished; every target scan has settled
    End { tick: u64 },
}

impl WatchSignal {
    /// Short name of the signal kind
    pub fn kind(&self) -> &'static str {
        match self {
            WatchSignal::Error(_) => "error",
            WatchSignal::Warning(_) => "warning",
            WatchSignal::NewCommit { .. } => "new-commit",
            WatchSignal::End { .. } => "end",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(message: &str) -> NewCommit {
        NewCommit {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            commit: "abc123".to_string(),
            link: "https://github.com/acme/widgets/commit/abc123".to_string(),
            message: message.to_string(),
            filenames: vec![],
        }
    }

    #[test]
    fn test_title_is_first_line() {
        assert_eq!(commit("Fix typo (#12)\n\nDetails here").title(), "Fix typo (#12)");
        assert_eq!(commit("Single line").title(), "Single line");
        assert_eq!(commit("").title(), "");
    }

    #[test]
    fn test_new_commit_json_field_names() {
        let json = serde_json::to_value(commit("msg")).unwrap();
        for field in ["owner", "repo", "commit", "link", "message", "filenames"] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
    }

    #[test]
    fn test_watch_error_messages() {
        let err = WatchError::Fetch {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            branch: "main".to_string(),
            source: GithubError::NotFound {
                resource: "acme/widgets@main".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("acme/widgets@main"));
        assert!(!err.is_fatal());

        let err = WatchError::Timeout {
            operation: "list commits".to_string(),
            after: Duration::from_secs(3),
        };
        assert!(err.to_string().contains("3s"));

        assert!(WatchError::TickAborted("panic".to_string()).is_fatal());
    }

    #[test]
    fn test_watch_error_retryable() {
        let fetch = |source| WatchError::Fetch {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            branch: "main".to_string(),
            source,
        };
        assert!(fetch(GithubError::RateLimited { reset: None }).is_retryable());
        assert!(!fetch(GithubError::Unauthorized).is_retryable());

        let check = WatchError::CommitCheck {
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            sha: "abc123".to_string(),
            source: GithubError::Api {
                status: 502,
                message: "Bad gateway".to_string(),
            },
        };
        assert!(check.is_retryable());

        let timeout = WatchError::Timeout {
            operation: "list commits".to_string(),
            after: Duration::from_secs(3),
        };
        assert!(timeout.is_retryable());

        let panicked = WatchError::Panicked {
            operation: "Checking commit abc123".to_string(),
            reason: "boom".to_string(),
        };
        assert!(!panicked.is_retryable());
        assert!(!panicked.is_fatal());
        assert_eq!(panicked.to_string(), "Checking commit abc123 panicked: boom");
    }

    #[test]
    fn test_signal_kind() {
        assert_eq!(WatchSignal::End { tick: 1 }.kind(), "end");
        assert_eq!(
            WatchSignal::Warning(Arc::new(WatchError::TickAborted("x".to_string()))).kind(),
            "warning"
        );
    }
}
