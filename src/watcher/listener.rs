//! New-commit delivery boundary

use async_trait::async_trait;

use super::NewCommit;

/// Receives new commits from the watcher
///
/// The returned bool decides the commit's fate: if any listener accepts, the
/// commit is recorded as seen; if none does, it is offered again on the next
/// poll.
#[async_trait]
pub trait CommitListener: Send + Sync {
    /// Listener name, for logs
    fn name(&self) -> &str;

    /// Handle a new commit; return true once the work is done
    async fn accept(&self, commit: &NewCommit) -> bool;
}
