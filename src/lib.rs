//! sharin - upstream branch watcher
//!
//! sharin polls a set of GitHub branches, detects commits it has not seen
//! before, optionally narrows them to those touching a path prefix, and hands
//! each one to listeners. The bundled listener opens a tracking issue on an
//! origin repository, which is how translation projects keep up with upstream
//! documentation.
//!
//! # Modules
//!
//! - [`watcher`] - target registry, polling scheduler, signals and listeners
//! - [`github`] - GitHub capability traits and the REST client
//! - [`notifier`] - issue-creating and logging listeners
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod github;
pub mod notifier;
pub mod watcher;

// Re-export commonly used types
pub use config::{Config, GithubConfig, IssueConfig, OriginConfig, UpstreamConfig};
pub use github::{ChangedFile, CommitSource, CommitSummary, GithubError, IssueTracker, RestClient};
pub use notifier::{IssueNotifier, LogNotifier};
pub use watcher::{
    BranchWatcher, CommitListener, NewCommit, PathFilter, TickReport, WatchError, WatchSignal, WatcherConfig,
    WatcherHandle,
};
