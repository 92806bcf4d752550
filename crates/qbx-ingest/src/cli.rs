//! Command-line interface definitions

use clap::{Args, Parser, Subcommand};
use qbx_common::logging::{LogConfig, LogLevel, LogOutput};
use qbx_common::types::ExtractionWindow;

use crate::entity::EntityKind;
use crate::error::Result;

/// QuickBooks raw ingestion
#[derive(Parser, Debug)]
#[command(name = "qbx-ingest")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract and load one entity type
    Run {
        /// Entity to ingest (customers, invoices, items)
        #[arg(short, long)]
        entity: EntityKind,

        #[command(flatten)]
        window: WindowArgs,

        /// Load into an in-memory store instead of the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Extract and load every entity type in turn
    RunAll {
        #[command(flatten)]
        window: WindowArgs,

        /// Load into an in-memory store instead of the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Exchange the refresh token and report whether it worked
    Token,

    /// Create the raw landing tables
    Migrate,
}

/// Inclusive extraction window
#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
    /// First day to include (YYYY-MM-DD)
    #[arg(long, env = "QB_FROM_DATE")]
    pub from: Option<String>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long, env = "QB_TO_DATE")]
    pub to: Option<String>,
}

impl WindowArgs {
    /// Parse the window, defaulting missing bounds.
    pub fn window(&self) -> Result<ExtractionWindow> {
        Ok(ExtractionWindow::parse_or_default(
            self.from.as_deref(),
            self.to.as_deref(),
        )?)
    }
}

/// Logging settings for one invocation.
///
/// `.env` is loaded first; `-v` picks the default level and any `LOG_*`
/// variable overrides it.
pub fn log_config(verbose: bool) -> LogConfig {
    dotenvy::dotenv().ok();

    let level = if verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let base = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("qbx-ingest")
        .build();

    LogConfig::from_env_with(base.clone()).unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_run_command_parses() {
        let cli = Cli::try_parse_from([
            "qbx-ingest",
            "run",
            "--entity",
            "Invoice",
            "--from",
            "2025-03-01",
            "--to",
            "2025-03-31",
            "--dry-run",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                entity,
                window,
                dry_run,
            } => {
                assert_eq!(entity, EntityKind::Invoice);
                assert!(dry_run);
                let window = window.window().unwrap();
                assert_eq!(window.start(), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
                assert_eq!(window.end(), NaiveDate::from_ymd_opt(2025, 3, 31).unwrap());
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_entity_is_rejected() {
        assert!(Cli::try_parse_from(["qbx-ingest", "run", "--entity", "vendors"]).is_err());
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["qbx-ingest", "token", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Token));
    }

    #[test]
    fn test_missing_window_uses_defaults() {
        let window = WindowArgs::default().window().unwrap();
        assert_eq!(window, ExtractionWindow::default());
    }

    #[test]
    fn test_reversed_window_is_rejected() {
        let args = WindowArgs {
            from: Some("2025-09-16".into()),
            to: Some("2025-01-01".into()),
        };
        assert!(args.window().is_err());
    }

    #[test]
    fn test_log_config_reads_log_variables() {
        std::env::set_var("LOG_FILE_PREFIX", "qbx-nightly");
        let config = log_config(true);
        std::env::remove_var("LOG_FILE_PREFIX");

        assert_eq!(config.log_file_prefix, "qbx-nightly");
    }
}
