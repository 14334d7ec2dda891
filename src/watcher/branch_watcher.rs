//! Branch watcher implementation
//!
//! One tick scans every registered target concurrently, and each target checks
//! its recent commits concurrently. Failures, panics included, are contained to
//! the commit or target that raised them and reported as warnings. Only a
//! failure of the tick itself is fatal.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use eyre::{Result, eyre};
use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::config::WatcherConfig;
use super::listener::CommitListener;
use super::signal::{NewCommit, WatchError, WatchSignal};
use super::target::{PathFilter, Target, TargetRegistry, parse_target};
use crate::github::{CommitSource, CommitSummary, GithubError};

/// Outcome counts of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub targets: usize,
    /// Commits accepted by a listener
    pub delivered: usize,
    /// Commits no listener accepted
    pub rejected: usize,
    /// Commits dropped by a path filter
    pub excluded: usize,
    pub warnings: usize,
}

#[derive(Default)]
struct TickCounters {
    delivered: AtomicUsize,
    rejected: AtomicUsize,
    excluded: AtomicUsize,
    warnings: AtomicUsize,
}

/// What happened to one checked commit
enum CommitOutcome {
    Delivered,
    Rejected,
    Excluded,
}

/// Watches GitHub branches for new commits
pub struct BranchWatcher {
    source: Arc<dyn CommitSource>,
    config: WatcherConfig,
    registry: TargetRegistry,
    listeners: RwLock<Vec<Arc<dyn CommitListener>>>,
    signal_tx: broadcast::Sender<WatchSignal>,
    ticks: AtomicU64,
    completed: AtomicU64,
    halted: AtomicBool,
}

impl BranchWatcher {
    /// Create an idle watcher; nothing is polled until `start` or `tick`
    pub fn new(source: Arc<dyn CommitSource>, config: WatcherConfig) -> Arc<Self> {
        debug!(?config, "BranchWatcher::new: called");
        let (signal_tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Arc::new(Self {
            source,
            config,
            registry: TargetRegistry::new(),
            listeners: RwLock::new(Vec::new()),
            signal_tx,
            ticks: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            halted: AtomicBool::new(false),
        })
    }

    /// Subscribe to watcher signals
    ///
    /// Only signals sent after subscribing are received.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchSignal> {
        self.signal_tx.subscribe()
    }

    /// Add a listener for new commits
    pub async fn add_listener(&self, listener: Arc<dyn CommitListener>) {
        debug!(listener = listener.name(), "BranchWatcher::add_listener: called");
        self.listeners.write().await.push(listener);
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Whether a fatal error stopped the watcher
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Number of ticks started so far
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Number of ticks that ran to their `End` signal
    pub fn completed_ticks(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Watch `branch` of `owner/repo`
    ///
    /// Returns false, registering nothing, if `target` is not `owner/repo`.
    /// On success every registered target is scanned right away in the
    /// background, so the new one does not wait for the next interval.
    pub async fn register(self: &Arc<Self>, target: &str, branch: &str, filter: Option<PathFilter>) -> bool {
        debug!(%target, %branch, ?filter, "BranchWatcher::register: called");
        let Some((owner, repo)) = parse_target(target) else {
            debug!(%target, "BranchWatcher::register: not owner/repo, rejecting");
            return false;
        };

        let added = self.registry.add(owner, repo, branch, filter).await;
        info!(id = %added.id(), slug = %added.slug(), "Watching target");

        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            watcher.dispatch_tick().await;
        });
        true
    }

    /// Start polling every `poll-interval-secs`
    pub fn start(self: &Arc<Self>) -> Result<WatcherHandle> {
        self.start_every(self.config.poll_interval())
    }

    /// Start polling with an explicit period
    ///
    /// The first tick fires one period after the call. A tick still running
    /// when the next one is due delays it; missed ticks are skipped. A zero
    /// period is rejected.
    pub fn start_every(self: &Arc<Self>, period: Duration) -> Result<WatcherHandle> {
        if period.is_zero() {
            return Err(eyre!("Poll period must be greater than zero"));
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let watcher = Arc::clone(self);

        let join = tokio::spawn(async move {
            info!(period_ms = period.as_millis() as u64, "BranchWatcher started");

            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if watcher.dispatch_tick().await.is_none() {
                            break;
                        }
                    }
                    Some(()) = shutdown_rx.recv() => {
                        info!("BranchWatcher stop requested");
                        break;
                    }
                }
            }

            info!(ticks = watcher.tick_count(), halted = watcher.is_halted(), "BranchWatcher stopped");
        });

        Ok(WatcherHandle { shutdown_tx, join })
    }

    /// Run one tick on its own task
    ///
    /// A tick that fails outright (panics or is cancelled) sends `Error` and
    /// halts the watcher. Returns None once halted.
    pub async fn dispatch_tick(self: &Arc<Self>) -> Option<TickReport> {
        let watcher = Arc::clone(self);
        self.dispatch(async move { watcher.tick().await }).await
    }

    async fn dispatch<F>(&self, tick: F) -> Option<TickReport>
    where
        F: Future<Output = TickReport> + Send + 'static,
    {
        if self.is_halted() {
            debug!("BranchWatcher::dispatch: halted, skipping");
            return None;
        }

        match tokio::spawn(tick).await {
            Ok(report) => Some(report),
            Err(e) => {
                let reason = join_error_reason(e);
                error!(%reason, "Tick aborted, halting watcher");
                self.halted.store(true, Ordering::SeqCst);
                self.emit(WatchSignal::Error(Arc::new(WatchError::TickAborted(reason))));
                None
            }
        }
    }

    /// Scan every registered target once, then send `End`
    pub async fn tick(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        let targets = self.registry.snapshot().await;
        debug!(tick, targets = targets.len(), "BranchWatcher::tick: called");

        let counters = TickCounters::default();
        join_all(targets.iter().map(|target| {
            let counters = &counters;
            async move {
                let scanned = AssertUnwindSafe(self.scan_one(target, counters))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        Err(WatchError::Panicked {
                            operation: format!("Scanning {}", target.slug()),
                            reason: panic_reason(payload),
                        })
                    });
                if let Err(e) = scanned {
                    counters.warnings.fetch_add(1, Ordering::Relaxed);
                    self.report_failure(&target.slug(), None, e);
                }
            }
        }))
        .await;

        let report = TickReport {
            tick,
            targets: targets.len(),
            delivered: counters.delivered.into_inner(),
            rejected: counters.rejected.into_inner(),
            excluded: counters.excluded.into_inner(),
            warnings: counters.warnings.into_inner(),
        };
        info!(
            tick,
            targets = report.targets,
            delivered = report.delivered,
            rejected = report.rejected,
            excluded = report.excluded,
            warnings = report.warnings,
            "Tick complete"
        );

        self.completed.fetch_add(1, Ordering::SeqCst);
        self.emit(WatchSignal::End { tick });
        report
    }

    /// Fetch one target's recent commits and check each of them
    async fn scan_one(&self, target: &Target, counters: &TickCounters) -> Result<(), WatchError> {
        debug!(slug = %target.slug(), "BranchWatcher::scan_one: called");
        let commits = self
            .fetch(
                || format!("Listing commits of {}", target.slug()),
                self.source.list_recent_commits(
                    target.owner(),
                    target.repo(),
                    target.branch(),
                    self.config.page_size,
                ),
            )
            .await?
            .map_err(|source| WatchError::Fetch {
                owner: target.owner().to_string(),
                repo: target.repo().to_string(),
                branch: target.branch().to_string(),
                source,
            })?;
        debug!(slug = %target.slug(), count = commits.len(), "BranchWatcher::scan_one: fetched");

        join_all(commits.into_iter().map(|summary| async move {
            let sha = summary.sha.clone();
            if !target.claim(&sha).await {
                debug!(%sha, "BranchWatcher::scan_one: seen or in flight, skipping");
                return;
            }

            let checked = AssertUnwindSafe(self.check_commit(target, summary))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(WatchError::Panicked {
                        operation: format!("Checking commit {} on {}", sha, target.slug()),
                        reason: panic_reason(payload),
                    })
                });

            match checked {
                Ok(CommitOutcome::Delivered) => {
                    target.mark_seen(&sha).await;
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Ok(CommitOutcome::Excluded) => {
                    target.mark_seen(&sha).await;
                    counters.excluded.fetch_add(1, Ordering::Relaxed);
                }
                Ok(CommitOutcome::Rejected) => {
                    target.release(&sha).await;
                    counters.rejected.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    target.release(&sha).await;
                    counters.warnings.fetch_add(1, Ordering::Relaxed);
                    self.report_failure(&target.slug(), Some(&sha), e);
                }
            }
        }))
        .await;

        Ok(())
    }

    /// Apply the path filter and offer the commit to the listeners
    async fn check_commit(&self, target: &Target, summary: CommitSummary) -> Result<CommitOutcome, WatchError> {
        let filenames = match target.filter() {
            Some(filter) => {
                let files = self
                    .fetch(
                        || format!("Fetching files of {} on {}", summary.sha, target.slug()),
                        self.source
                            .get_commit_files(target.owner(), target.repo(), &summary.sha),
                    )
                    .await?
                    .map_err(|source| WatchError::CommitCheck {
                        owner: target.owner().to_string(),
                        repo: target.repo().to_string(),
                        sha: summary.sha.clone(),
                        source,
                    })?;

                let matched: Vec<String> = files
                    .into_iter()
                    .map(|f| f.filename)
                    .filter(|name| filter.matches(name))
                    .collect();

                if matched.is_empty() {
                    debug!(sha = %summary.sha, ?filter, "BranchWatcher::check_commit: no file matches filter");
                    return Ok(CommitOutcome::Excluded);
                }
                matched
            }
            None => Vec::new(),
        };

        let commit = NewCommit {
            owner: target.owner().to_string(),
            repo: target.repo().to_string(),
            commit: summary.sha,
            link: summary.html_url,
            message: summary.message,
            filenames,
        };

        let accepted = self.deliver(&commit).await;
        debug!(sha = %commit.commit, accepted, "BranchWatcher::check_commit: delivered");
        self.emit(WatchSignal::NewCommit { commit, accepted });

        Ok(if accepted {
            CommitOutcome::Delivered
        } else {
            CommitOutcome::Rejected
        })
    }

    /// Offer a commit to every listener; true if any accepted
    async fn deliver(&self, commit: &NewCommit) -> bool {
        let listeners = self.listeners.read().await.clone();
        if listeners.is_empty() {
            debug!(sha = %commit.commit, "BranchWatcher::deliver: no listeners");
            return false;
        }

        let results = join_all(listeners.iter().map(|l| l.accept(commit))).await;
        results.into_iter().any(|accepted| accepted)
    }

    /// Run a GitHub call under the fetch timeout
    async fn fetch<T, F>(
        &self,
        operation: impl FnOnce() -> String,
        call: F,
    ) -> Result<Result<T, GithubError>, WatchError>
    where
        F: Future<Output = Result<T, GithubError>>,
    {
        let after = self.config.fetch_timeout();
        tokio::time::timeout(after, call).await.map_err(|_| WatchError::Timeout {
            operation: operation(),
            after,
        })
    }

    /// Log a recoverable failure and send it as `Warning`
    fn report_failure(&self, slug: &str, sha: Option<&str>, error: WatchError) {
        if error.is_retryable() {
            warn!(%slug, ?sha, error = %error, "Transient failure, retrying next poll");
        } else {
            error!(%slug, ?sha, error = %error, "Failure unlikely to clear on retry");
        }
        self.emit(WatchSignal::Warning(Arc::new(error)));
    }

    fn emit(&self, signal: WatchSignal) {
        debug!(kind = signal.kind(), "BranchWatcher::emit");
        // No subscribers is fine
        let _ = self.signal_tx.send(signal);
    }
}

fn join_error_reason(err: JoinError) -> String {
    if !err.is_panic() {
        return "tick task cancelled".to_string();
    }
    panic_reason(err.into_panic())
}

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panicked".to_string()
    }
}

/// Control handle for a started watcher
pub struct WatcherHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl WatcherHandle {
    /// Stop scheduling; a tick already running finishes first
    pub async fn stop(self) -> Result<()> {
        debug!("WatcherHandle::stop: called");
        // The scheduler may already have exited after a fatal error
        let _ = self.shutdown_tx.send(()).await;
        self.join.await.map_err(|e| eyre!("Watcher task failed: {}", e))
    }

    /// Whether the scheduler loop has exited
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the scheduler to exit on its own (after a fatal error)
    pub async fn join(self) -> Result<()> {
        self.join.await.map_err(|e| eyre!("Watcher task failed: {}", e))
    }
}
