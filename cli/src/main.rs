mod commands;
mod config;
mod logging;
mod sources;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;

use commands::run::OutputFormat;
use config::{ensure_dirs, LogLevel, UserConfig};
use logging::LogMode;

#[derive(Debug, Subcommand)]
enum Commands {
    /// Poll every enabled subsystem and print one report per interval
    #[command(alias = "r")]
    Run {
        /// Stop after this many iterations (runs until interrupted otherwise)
        #[arg(short = 'n', long)]
        iterations: Option<u64>,

        /// Polling interval in milliseconds
        #[arg(short, long)]
        interval: Option<u64>,

        /// Compact JSON output (one line per report)
        #[arg(short, long)]
        compact: bool,

        /// Human-readable records instead of JSON
        #[arg(short, long, conflicts_with = "compact")]
        text: bool,

        /// Device profile (TOML)
        #[arg(short, long)]
        profile: Option<PathBuf>,

        /// Also write logs to a daily file in the runtime directory
        #[arg(long)]
        log_file: bool,
    },

    /// Print what the host exposes to each monitor
    Debug,

    /// Show or edit configuration
    Config {
        /// Print config file path
        #[arg(long)]
        path: bool,

        /// Reset config to defaults
        #[arg(long)]
        reset: bool,

        /// Open config in $EDITOR
        #[arg(long)]
        edit: bool,
    },

    /// Validate a device profile and print its constants
    Profile {
        /// Path to the profile
        path: PathBuf,
    },
}

#[derive(Debug, Parser)]
#[command(name = "drainwatch")]
#[command(author, version, about = "Per-application power estimation for Linux and Android hosts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = ensure_dirs();

    let cli = Cli::parse();
    let config = UserConfig::load()?;
    let log_level_override = cli.log_level.as_deref().map(LogLevel::from_str);

    match cli.command {
        Commands::Run {
            iterations,
            interval,
            compact,
            text,
            profile,
            log_file,
        } => {
            let mode = if log_file {
                LogMode::Both
            } else {
                LogMode::Stderr
            };
            let _guard = logging::init(config.log_level, mode, log_level_override);

            let mut config = config;
            config.merge_with_args(interval, profile);
            let format = if text {
                OutputFormat::Text
            } else {
                OutputFormat::Json { compact }
            };
            commands::run::run(config, iterations, format)
        }
        Commands::Debug => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::debug::run(&config)
        }
        Commands::Config { path, reset, edit } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::config::run(&config, path, reset, edit)
        }
        Commands::Profile { path } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::profile::run(&path, config.interval_ms)
        }
    }
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
    fn test_run_arguments() {
        let cli = Cli::parse_from([
            "drainwatch",
            "run",
            "-n",
            "5",
            "--interval",
            "250",
            "--compact",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Run {
                iterations,
                interval,
                compact,
                text,
                ..
            } => {
                assert_eq!(iterations, Some(5));
                assert_eq!(interval, Some(250));
                assert!(compact);
                assert!(!text);
            }
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_text_conflicts_with_compact() {
        assert!(Cli::try_parse_from(["drainwatch", "run", "--text", "--compact"]).is_err());
    }
}
