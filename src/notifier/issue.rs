//! Opens an issue on the origin repository for each new upstream commit

use std::sync::Arc;

use async_trait::async_trait;
use eyre::{Result, eyre};
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::config::IssueConfig;
use crate::github::{IssueTracker, NewIssue};
use crate::watcher::{CommitListener, NewCommit, parse_target};

/// Matches a trailing pull request reference such as ` (#123)`
const PR_REFERENCE_PATTERN: &str = r"( )?\(#.*\)";

/// Commit listener that files one issue per upstream commit
pub struct IssueNotifier {
    tracker: Arc<dyn IssueTracker>,
    owner: String,
    repo: String,
    config: IssueConfig,
    pr_reference: Regex,
}

impl IssueNotifier {
    /// Create a notifier filing issues on `origin` (`owner/repo`)
    pub fn new(tracker: Arc<dyn IssueTracker>, origin: &str, config: IssueConfig) -> Result<Self> {
        debug!(%origin, "IssueNotifier::new: called");
        let (owner, repo) =
            parse_target(origin).ok_or_else(|| eyre!("Origin repo '{}' is not of the form owner/repo", origin))?;

        Ok(Self {
            tracker,
            owner: owner.to_string(),
            repo: repo.to_string(),
            config,
            pr_reference: Regex::new(PR_REFERENCE_PATTERN)?,
        })
    }

    /// Issue title for a commit title: prefix added, PR reference removed
    pub fn issue_title(&self, commit_title: &str) -> String {
        format!(
            "{}{}",
            self.config.title_prefix,
            self.pr_reference.replace(commit_title, "")
        )
    }

    /// Issue body from the configured template
    pub fn issue_body(&self, commit: &NewCommit) -> String {
        self.config
            .body_template
            .replace("{link}", &commit.link)
            .replace("{sha}", &commit.commit)
            .replace("{title}", commit.title())
    }

    /// Search query finding issues that already mention the commit
    fn existing_issue_query(&self, commit: &NewCommit) -> String {
        format!("is:issue repo:{}/{} {}", self.owner, self.repo, commit.commit)
    }
}

#[async_trait]
impl CommitListener for IssueNotifier {
    fn name(&self) -> &str {
        "issue"
    }

    async fn accept(&self, commit: &NewCommit) -> bool {
        let title = commit.title();
        info!(%title, sha = %commit.commit, "New commit on upstream");

        match self.tracker.count_issues(&self.existing_issue_query(commit)).await {
            Ok(0) => {}
            Ok(count) => {
                info!(%title, count, "Already issued");
                return true;
            }
            Err(e) => {
                warn!(%title, error = %e, "Issue search failed, will retry");
                return false;
            }
        }

        let issue = NewIssue {
            title: self.issue_title(title),
            body: self.issue_body(commit),
            labels: self.config.labels.clone(),
        };

        match self.tracker.create_issue(&self.owner, &self.repo, &issue).await {
            Ok(created) => {
                info!(number = created.number, url = %created.html_url, %title, "Created issue");
                true
            }
            Err(e) => {
                error!(%title, error = %e, "Create issue failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{CreatedIssue, GithubError};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    #[derive(Default)]
    struct MockTracker {
        existing: AtomicU64,
        fail_search: AtomicBool,
        fail_create: AtomicBool,
        queries: Mutex<Vec<String>>,
        created: Mutex<Vec<(String, String, NewIssue)>>,
    }

    #[async_trait]
    impl IssueTracker for MockTracker {
        async fn count_issues(&self, query: &str) -> Result<u64, GithubError> {
            self.queries.lock().unwrap().push(query.to_string());
            if self.fail_search.load(Ordering::SeqCst) {
                return Err(GithubError::Api {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(self.existing.load(Ordering::SeqCst))
        }

        async fn create_issue(&self, owner: &str, repo: &str, issue: &NewIssue) -> Result<CreatedIssue, GithubError> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(GithubError::Unauthorized);
            }
            let mut created = self.created.lock().unwrap();
            created.push((owner.to_string(), repo.to_string(), issue.clone()));
            Ok(CreatedIssue {
                number: created.len() as u64,
                html_url: format!("https://github.com/{}/{}/issues/{}", owner, repo, created.len()),
            })
        }
    }

    fn commit() -> NewCommit {
        NewCommit {
            owner: "nuxt".to_string(),
            repo: "docs".to_string(),
            commit: "6dcb09b".to_string(),
            link: "https://github.com/nuxt/docs/commit/6dcb09b".to_string(),
            message: "Update routing guide (#1234)\n\nMore words".to_string(),
            filenames: vec!["en/guide/routing.md".to_string()],
        }
    }

    fn notifier(tracker: Arc<MockTracker>) -> IssueNotifier {
        IssueNotifier::new(tracker, "vuejs-jp/ja.docs", IssueConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_malformed_origin() {
        let tracker = Arc::new(MockTracker::default());
        assert!(IssueNotifier::new(tracker, "ja.docs", IssueConfig::default()).is_err());
    }

    #[test]
    fn test_issue_title_strips_pr_reference() {
        let notifier = notifier(Arc::new(MockTracker::default()));
        assert_eq!(notifier.issue_title("Update routing guide (#1234)"), "[doc] Update routing guide");
        assert_eq!(notifier.issue_title("Plain title"), "[doc] Plain title");
    }

    #[test]
    fn test_issue_body_substitutes_placeholders() {
        let tracker = Arc::new(MockTracker::default());
        let config = IssueConfig {
            body_template: "{title} ({sha})\n{link}".to_string(),
            ..Default::default()
        };
        let notifier = IssueNotifier::new(tracker, "vuejs-jp/ja.docs", config).unwrap();

        assert_eq!(
            notifier.issue_body(&commit()),
            "Update routing guide (#1234) (6dcb09b)\nhttps://github.com/nuxt/docs/commit/6dcb09b"
        );
    }

    #[tokio::test]
    async fn test_accept_creates_issue() {
        let tracker = Arc::new(MockTracker::default());
        let notifier = notifier(tracker.clone());

        assert!(notifier.accept(&commit()).await);

        assert_eq!(
            tracker.queries.lock().unwrap().as_slice(),
            ["is:issue repo:vuejs-jp/ja.docs 6dcb09b"]
        );
        let created = tracker.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        let (owner, repo, issue) = &created[0];
        assert_eq!(owner, "vuejs-jp");
        assert_eq!(repo, "ja.docs");
        assert_eq!(issue.title, "[doc] Update routing guide");
        assert!(issue.body.contains("https://github.com/nuxt/docs/commit/6dcb09b"));
        assert_eq!(issue.labels, vec!["help wanted"]);
    }

    #[tokio::test]
    async fn test_accept_skips_existing_issue() {
        let tracker = Arc::new(MockTracker::default());
        tracker.existing.store(1, Ordering::SeqCst);
        let notifier = notifier(tracker.clone());

        assert!(notifier.accept(&commit()).await);
        assert!(tracker.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_rejects() {
        let tracker = Arc::new(MockTracker::default());
        tracker.fail_search.store(true, Ordering::SeqCst);
        let notifier = notifier(tracker.clone());

        assert!(!notifier.accept(&commit()).await);
        assert!(tracker.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_rejects() {
        let tracker = Arc::new(MockTracker::default());
        tracker.fail_create.store(true, Ordering::SeqCst);
        let notifier = notifier(tracker);

        assert!(!notifier.accept(&commit()).await);
    }
}
