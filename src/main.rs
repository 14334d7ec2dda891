//! sharin - upstream branch watcher
//!
//! CLI entry point: loads configuration, registers the upstream branches and
//! runs the watcher until interrupted.

use std::fs;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use sharin::cli::{Cli, Command, OutputFormat, get_log_path};
use sharin::config::Config;
use sharin::github::RestClient;
use sharin::notifier::{IssueNotifier, LogNotifier};
use sharin::watcher::{BranchWatcher, CommitListener, PathFilter, WatchSignal};

fn setup_logging(verbose: bool) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Some(Command::Watch { once, dry_run }) => cmd_watch(&config, once, dry_run).await,
        Some(Command::Config { format }) => cmd_config(&config, format),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Show the effective configuration
fn cmd_config(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", serde_yaml::to_string(config)?),
    }

    if let Err(e) = config.validate() {
        eprintln!("{} {}", "invalid:".red(), e);
    }
    Ok(())
}

/// Build the listener that receives new commits
fn build_listener(config: &Config, client: Arc<RestClient>, dry_run: bool) -> Result<Arc<dyn CommitListener>> {
    if dry_run {
        info!("Dry run: new commits are only logged");
        return Ok(Arc::new(LogNotifier));
    }

    let origin = config
        .origin
        .repo
        .as_deref()
        .ok_or_else(|| eyre!("origin.repo is not configured; set SHARIN_ORIGIN_REPO or use --dry-run"))?;

    if config.github.get_token().is_none() {
        warn!(token_env = %config.github.token_env, "No GitHub token; creating issues will fail");
        eprintln!(
            "{} {} is not set; creating issues will fail",
            "warning:".yellow(),
            config.github.token_env
        );
    }

    Ok(Arc::new(IssueNotifier::new(client, origin, config.issue.clone())?))
}

/// Run the watcher over every configured upstream
async fn cmd_watch(config: &Config, once: bool, dry_run: bool) -> Result<()> {
    config.validate()?;

    let client = Arc::new(RestClient::from_config(&config.github).context("Failed to create GitHub client")?);
    let watcher = BranchWatcher::new(client.clone(), config.watcher.clone());
    watcher.add_listener(build_listener(config, client, dry_run)?).await;

    // Subscribe before registering so the first scans are observed
    let mut signals = watcher.subscribe();

    let upstreams = config.upstreams();
    for upstream in &upstreams {
        let filter = upstream.path_prefix.clone().map(PathFilter::prefix);
        if !watcher.register(&upstream.repo, &upstream.branch, filter).await {
            return Err(eyre!("Cannot watch '{}': expected owner/repo", upstream.repo));
        }
        println!("Watching {}@{}", upstream.repo.bold(), upstream.branch);
    }

    let handle = watcher.start()?;
    info!(
        upstreams = upstreams.len(),
        interval_secs = config.watcher.poll_interval_secs,
        once,
        "Watcher running"
    );

    // Each registration triggers one scan; with --once, stop after all of them.
    // Completed ticks are counted by the watcher, so lagged signals cannot hide an End.
    let registration_scans = upstreams.len() as u64;
    let once_done = || once && watcher.completed_ticks() >= registration_scans;
    let mut fatal = None;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = signals.recv() => match signal {
                Ok(WatchSignal::NewCommit { commit, accepted }) => {
                    let status = if accepted { "new".green() } else { "retry".yellow() };
                    println!("{} {} {}", status, commit.title(), commit.link.dimmed());
                }
                Ok(WatchSignal::Warning(e)) => {
                    eprintln!("{} {}", "W:".yellow(), e);
                }
                Ok(WatchSignal::Error(e)) => {
                    eprintln!("{} {}", "E:".red(), e);
                    fatal = Some(eyre!("Watcher stopped: {}", e));
                    break;
                }
                Ok(WatchSignal::End { tick }) => {
                    info!(tick, "Scan finished");
                    if once_done() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Signal receiver lagged");
                    if once_done() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "Signal handler failed");
                }
                break;
            }
        }
    }

    info!("Shutting down watcher");
    handle.stop().await?;

    match fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Resolve on SIGINT or SIGTERM (Ctrl+C elsewhere)
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        warn!("Ctrl+C received");
    }

    Ok(())
}
