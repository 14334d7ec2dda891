//! Listener that only logs new commits

use async_trait::async_trait;
use tracing::info;

use crate::watcher::{CommitListener, NewCommit};

/// Accepts every commit after logging it; used for dry runs
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl CommitListener for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn accept(&self, commit: &NewCommit) -> bool {
        info!(
            owner = %commit.owner,
            repo = %commit.repo,
            sha = %commit.commit,
            link = %commit.link,
            files = commit.filenames.len(),
            "New commit on upstream: {}",
            commit.title()
        );
        true
    }
}
