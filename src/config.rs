//! sharin configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::watcher::{WatcherConfig, parse_target};

/// Environment variable overriding `upstream.repo`
pub const ENV_UPSTREAM_REPO: &str = "SHARIN_UPSTREAM_REPO";
/// Environment variable overriding `upstream.branch`
pub const ENV_UPSTREAM_BRANCH: &str = "SHARIN_UPSTREAM_BRANCH";
/// Environment variable overriding `upstream.path-prefix`
pub const ENV_UPSTREAM_PATH_PREFIX: &str = "SHARIN_UPSTREAM_CHANGED_FILEPATH_STARTS_WITH";
/// Environment variable overriding `origin.repo`
pub const ENV_ORIGIN_REPO: &str = "SHARIN_ORIGIN_REPO";
/// Environment variable overriding `watcher.poll-interval-secs`
pub const ENV_POLL_INTERVAL_SECS: &str = "SHARIN_POLL_INTERVAL_SECS";

/// Main sharin configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GitHub API access
    pub github: GithubConfig,

    /// Primary upstream branch to watch
    pub upstream: UpstreamConfig,

    /// Further upstream branches watched alongside the primary one
    #[serde(rename = "extra-upstreams")]
    pub extra_upstreams: Vec<UpstreamConfig>,

    /// Repository receiving the issues
    pub origin: OriginConfig,

    /// Polling behaviour
    pub watcher: WatcherConfig,

    /// Issue formatting
    pub issue: IssueConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        let upstreams = self.upstreams();
        if upstreams.is_empty() {
            return Err(eyre!(
                "No upstream repository configured. Set upstream.repo or {}.",
                ENV_UPSTREAM_REPO
            ));
        }

        for upstream in &upstreams {
            if parse_target(&upstream.repo).is_none() {
                return Err(eyre!("Upstream repo '{}' is not of the form owner/repo", upstream.repo));
            }
            if upstream.branch.is_empty() {
                return Err(eyre!("Upstream '{}' has an empty branch", upstream.repo));
            }
        }

        if let Some(origin) = &self.origin.repo
            && parse_target(origin).is_none()
        {
            return Err(eyre!("Origin repo '{}' is not of the form owner/repo", origin));
        }

        if self.watcher.poll_interval_secs == 0 {
            return Err(eyre!("watcher.poll-interval-secs must be greater than zero"));
        }
        if self.watcher.page_size == 0 {
            return Err(eyre!("watcher.page-size must be greater than zero"));
        }

        Ok(())
    }

    /// Every configured upstream with a repo set, primary first
    pub fn upstreams(&self) -> Vec<&UpstreamConfig> {
        std::iter::once(&self.upstream)
            .chain(self.extra_upstreams.iter())
            .filter(|u| !u.repo.is_empty())
            .collect()
    }

    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env();
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .sharin.yml
        let local_config = PathBuf::from(".sharin.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/sharin/sharin.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("sharin").join("sharin.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply `SHARIN_*` environment variable overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    ///
    /// Empty values are treated as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(repo) = get(ENV_UPSTREAM_REPO) {
            tracing::debug!(%repo, "Config: upstream repo from environment");
            self.upstream.repo = repo;
        }
        if let Some(branch) = get(ENV_UPSTREAM_BRANCH) {
            self.upstream.branch = branch;
        }
        if let Some(prefix) = get(ENV_UPSTREAM_PATH_PREFIX) {
            self.upstream.path_prefix = Some(prefix);
        }
        if let Some(origin) = get(ENV_ORIGIN_REPO) {
            self.origin.repo = Some(origin);
        }
        if let Some(secs) = get(ENV_POLL_INTERVAL_SECS) {
            match secs.parse::<u64>() {
                Ok(secs) => self.watcher.poll_interval_secs = secs,
                Err(e) => tracing::warn!("Ignoring {}={}: {}", ENV_POLL_INTERVAL_SECS, secs, e),
            }
        }
    }
}

/// GitHub API access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable containing the access token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            token_env: "SHARIN_TOKEN_GITHUB".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl GithubConfig {
    /// Read the token from the configured environment variable
    ///
    /// Anonymous access works for public repositories, so a missing token is
    /// not an error here.
    pub fn get_token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// An upstream branch to watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Repository as `owner/repo`
    pub repo: String,

    /// Branch name
    pub branch: String,

    /// Only report commits touching paths with this prefix
    #[serde(rename = "path-prefix", skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            branch: "main".to_string(),
            path_prefix: None,
        }
    }
}

/// Repository that receives issues for upstream commits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Repository as `owner/repo`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

/// Issue formatting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueConfig {
    /// Prepended to the commit title
    #[serde(rename = "title-prefix")]
    pub title_prefix: String,

    /// Labels attached to every created issue
    pub labels: Vec<String>,

    /// Body template; `{link}`, `{sha}` and `{title}` are substituted
    #[serde(rename = "body-template")]
    pub body_template: String,
}

impl Default for IssueConfig {
    fn default() -> Self {
        Self {
            title_prefix: "[doc] ".to_string(),
            labels: vec!["help wanted".to_string()],
            body_template: "本家のドキュメントに更新がありました :page_facing_up:\r\nOriginal:{link}".to_string(),
        }
    }
}
