//! GitHub API error types

use thiserror::Error;

/// Errors that can occur while talking to the GitHub REST API
#[derive(Debug, Error)]
pub enum GithubError {
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Rate limited (reset at {reset:?})")]
    RateLimited { reset: Option<u64> },

    #[error("Unauthorized: check the GitHub token")]
    Unauthorized,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GithubError {
    /// Map a non-success HTTP status and response body to an error
    ///
    /// `resource` names what was requested, for `NotFound` messages.
    /// `rate_remaining` and `rate_reset` come from the `x-ratelimit-*` headers.
    pub fn from_status(
        status: u16,
        body: &str,
        resource: &str,
        rate_remaining: Option<u64>,
        rate_reset: Option<u64>,
    ) -> Self {
        match status {
            401 => GithubError::Unauthorized,
            404 | 422 if body.contains("No commit found") => GithubError::NotFound {
                resource: resource.to_string(),
            },
            404 => GithubError::NotFound {
                resource: resource.to_string(),
            },
            429 => GithubError::RateLimited { reset: rate_reset },
            403 if rate_remaining == Some(0) => GithubError::RateLimited { reset: rate_reset },
            _ => GithubError::Api {
                status,
                message: extract_message(body),
            },
        }
    }

    /// Check if this error is worth retrying on a later poll
    pub fn is_retryable(&self) -> bool {
        match self {
            GithubError::RateLimited { .. } => true,
            GithubError::Api { status, .. } => *status >= 500,
            GithubError::Network(_) => true,
            GithubError::NotFound { .. } => false,
            GithubError::Unauthorized => false,
            GithubError::InvalidResponse(_) => false,
            GithubError::Json(_) => false,
        }
    }
}

/// GitHub error bodies look like `{"message": "...", "documentation_url": "..."}`
fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
