//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sharin - upstream branch watcher
#[derive(Parser)]
#[command(
    name = "sharin",
    about = "Watch upstream GitHub branches and open issues for new commits",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/sharin/logs/sharin.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Watch the configured upstreams
    Watch {
        /// Exit after the first completed scan
        #[arg(long)]
        once: bool,

        /// Log new commits instead of opening issues
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the effective configuration
    Config {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for the config command
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" | "yaml" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

/// Path of the log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sharin")
        .join("logs")
        .join("sharin.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_watch_flags() {
        let cli = Cli::try_parse_from(["sharin", "-v", "watch", "--once", "--dry-run"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Some(Command::Watch { once, dry_run }) => {
                assert!(once);
                assert!(dry_run);
            }
            _ => panic!("Expected watch command"),
        }
    }

    #[test]
    fn test_parse_config_format() {
        let cli = Cli::try_parse_from(["sharin", "config", "--format", "json", "-c", "x.yml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.yml")));
        assert!(matches!(cli.command, Some(Command::Config { format: OutputFormat::Json })));
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("TEXT".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_log_path_ends_with_file_name() {
        assert!(get_log_path().ends_with("sharin/logs/sharin.log"));
    }
}
