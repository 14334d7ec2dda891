//! Watched targets and their dedup state

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Parse `owner/repo` into its two components
///
/// Exactly one `/` and two non-empty components are required.
pub fn parse_target(target: &str) -> Option<(&str, &str)> {
    let mut parts = target.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => Some((owner, repo)),
        _ => None,
    }
}

/// Stable identifier of a registered target (its registration order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(usize);

impl TargetId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target-{}", self.0)
    }
}

/// Predicate over changed-file paths
#[derive(Clone)]
pub struct PathFilter {
    predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    description: String,
}

impl PathFilter {
    /// Wrap an arbitrary predicate
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            description: description.into(),
        }
    }

    /// Match paths starting with `prefix`
    pub fn prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let description = format!("starts-with:{}", prefix);
        Self::new(description, move |path| path.starts_with(prefix.as_str()))
    }

    pub fn matches(&self, path: &str) -> bool {
        (self.predicate)(path)
    }
}

impl fmt::Debug for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathFilter").field(&self.description).finish()
    }
}

/// Commits already handled for one target, plus commits currently being checked
#[derive(Debug, Default)]
struct SeenCommits {
    seen: HashSet<String>,
    in_flight: HashSet<String>,
}

/// A repository branch being watched
#[derive(Debug)]
pub struct Target {
    id: TargetId,
    owner: String,
    repo: String,
    branch: String,
    filter: Option<PathFilter>,
    seen: Mutex<SeenCommits>,
}

impl Target {
    fn new(id: TargetId, owner: &str, repo: &str, branch: &str, filter: Option<PathFilter>) -> Self {
        Self {
            id,
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            filter,
            seen: Mutex::new(SeenCommits::default()),
        }
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn filter(&self) -> Option<&PathFilter> {
        self.filter.as_ref()
    }

    /// `owner/repo@branch`, for logs
    pub fn slug(&self) -> String {
        format!("{}/{}@{}", self.owner, self.repo, self.branch)
    }

    /// Whether `sha` has been delivered or excluded
    pub async fn is_seen(&self, sha: &str) -> bool {
        self.seen.lock().await.seen.contains(sha)
    }

    /// Number of commits delivered or excluded so far
    pub async fn seen_count(&self) -> usize {
        self.seen.lock().await.seen.len()
    }

    /// Claim `sha` for checking
    ///
    /// Returns false if it is already seen or another scan is checking it.
    /// A successful claim must be ended with `mark_seen` or `release`.
    pub(crate) async fn claim(&self, sha: &str) -> bool {
        let mut state = self.seen.lock().await;
        if state.seen.contains(sha) || state.in_flight.contains(sha) {
            return false;
        }
        state.in_flight.insert(sha.to_string())
    }

    /// Record `sha` as handled and end its claim
    pub(crate) async fn mark_seen(&self, sha: &str) {
        let mut state = self.seen.lock().await;
        state.in_flight.remove(sha);
        state.seen.insert(sha.to_string());
    }

    /// End the claim on `sha` without recording it, so a later scan retries it
    pub(crate) async fn release(&self, sha: &str) {
        self.seen.lock().await.in_flight.remove(sha);
    }
}

/// Append-only list of watched targets
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: RwLock<Vec<Arc<Target>>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a target with empty dedup state
    pub async fn add(&self, owner: &str, repo: &str, branch: &str, filter: Option<PathFilter>) -> Arc<Target> {
        let mut targets = self.targets.write().await;
        let id = TargetId(targets.len());
        let target = Arc::new(Target::new(id, owner, repo, branch, filter));
        debug!(%id, slug = %target.slug(), "TargetRegistry::add: registered");
        targets.push(target.clone());
        target
    }

    /// Targets registered so far
    ///
    /// Targets added after this call are not included.
    pub async fn snapshot(&self) -> Vec<Arc<Target>> {
        self.targets.read().await.clone()
    }

    pub async fn get(&self, id: TargetId) -> Option<Arc<Target>> {
        self.targets.read().await.get(id.0).cloned()
    }

    pub async fn len(&self) -> usize {
        self.targets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.targets.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_valid() {
        assert_eq!(parse_target("acme/widgets"), Some(("acme", "widgets")));
        assert_eq!(parse_target("nuxt/docs"), Some(("nuxt", "docs")));
    }

    #[test]
    fn test_parse_target_invalid() {
        for input in ["not-a-valid-target", "", "/", "/widgets", "acme/", "a/b/c", "acme//widgets"] {
            assert_eq!(parse_target(input), None, "{:?} should be rejected", input);
        }
    }

    #[test]
    fn test_prefix_filter() {
        let filter = PathFilter::prefix("docs/");
        assert!(filter.matches("docs/guide.md"));
        assert!(!filter.matches("src/app.ts"));
        assert!(!filter.matches("README.md"));
        assert_eq!(format!("{:?}", filter), "PathFilter(\"starts-with:docs/\")");
    }

    #[test]
    fn test_custom_filter() {
        let filter = PathFilter::new("markdown", |p| p.ends_with(".md"));
        assert!(filter.matches("docs/guide.md"));
        assert!(!filter.matches("docs/logo.png"));
    }

    #[tokio::test]
    async fn test_registry_assigns_sequential_ids() {
        let registry = TargetRegistry::new();
        assert!(registry.is_empty().await);

        let a = registry.add("acme", "widgets", "main", None).await;
        let b = registry.add("acme", "gadgets", "dev", None).await;

        assert_eq!(a.id().index(), 0);
        assert_eq!(b.id().index(), 1);
        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.get(b.id()).await.unwrap().slug(), "acme/gadgets@dev");
    }

    #[tokio::test]
    async fn test_snapshot_excludes_later_targets() {
        let registry = TargetRegistry::new();
        registry.add("acme", "widgets", "main", None).await;

        let snapshot = registry.snapshot().await;
        registry.add("acme", "gadgets", "main", None).await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_claim_mark_release() {
        let registry = TargetRegistry::new();
        let target = registry.add("acme", "widgets", "main", None).await;

        assert!(target.claim("aaa").await);
        // Second claim while in flight is refused
        assert!(!target.claim("aaa").await);
        assert!(!target.is_seen("aaa").await);

        target.release("aaa").await;
        assert!(target.claim("aaa").await);

        target.mark_seen("aaa").await;
        assert!(target.is_seen("aaa").await);
        assert!(!target.claim("aaa").await);
        assert_eq!(target.seen_count().await, 1);
    }

    #[tokio::test]
    async fn test_dedup_state_is_per_target() {
        let registry = TargetRegistry::new();
        let a = registry.add("acme", "widgets", "main", None).await;
        let b = registry.add("acme", "widgets", "dev", None).await;

        assert!(a.claim("aaa").await);
        a.mark_seen("aaa").await;

        assert!(!b.is_seen("aaa").await);
        assert!(b.claim("aaa").await);
    }
}
