//! GitHub access for sharin
//!
//! The watcher and the notifier depend on the `CommitSource` and
//! `IssueTracker` traits; `RestClient` is the production implementation.

mod client;
mod error;
mod rest;
mod types;

pub use client::{CommitSource, IssueTracker};
pub use error::GithubError;
pub use rest::RestClient;
pub use types::{ChangedFile, CommitSummary, CreatedIssue, NewIssue};
