// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! Aigues CLI - water meter readings for Aigues de Barcelona contracts.
//!
//! # Examples
//!
//! ```bash
//! # Validate credentials and store the contracts
//! aigues setup --username 12345678Z --password secret
//!
//! # Supply a token copied from the browser when login asks for a captcha
//! aigues token eyJhbGciOi...
//!
//! # Daily readings of the current week
//! aigues week
//!
//! # One polling cycle per contract, then print the readings
//! aigues refresh
//!
//! # Long-running poller
//! aigues run
//! ```

mod commands;
mod output;

use aigues_fetch::ApiError;
use aigues_store::{CoordinatorError, StoreError};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{account, consumptions, refresh, run, setup, stats};

// ============================================================================
// CLI Definition
// ============================================================================

/// Aigues CLI - water consumption from the Aigues de Barcelona customer area.
#[derive(Parser)]
#[command(name = "aigues")]
#[command(about = "Water consumption from the Aigues de Barcelona customer area")]
#[command(long_about = r#"
Aigues reads cumulative water meter readings from the Aigues de Barcelona
customer area, keeps the latest value per contract and stores hourly
statistics locally.

Examples:
  aigues setup --username 12345678Z --password secret
  aigues contracts
  aigues week --date 2024-02-15
  aigues refresh
  aigues run
"#)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (defaults to the user config directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Statistics file (defaults to the user data directory).
    #[arg(long, global = true)]
    pub stats_file: Option<PathBuf>,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Validate credentials and save settings with the account's contracts.
    Setup(setup::SetupArgs),

    /// Replace the session token (reauthentication).
    Token(setup::TokenArgs),

    /// List contracts.
    #[command(visible_alias = "c")]
    Contracts(account::ContractsArgs),

    /// Show the account profile.
    Profile,

    /// List invoices.
    Invoices(account::InvoicesArgs),

    /// Fetch readings for a date range.
    Consumptions(consumptions::RangeArgs),

    /// Fetch daily readings for the week containing a date.
    #[command(visible_alias = "w")]
    Week(consumptions::DateArgs),

    /// Fetch daily readings for the month containing a date.
    #[command(visible_alias = "m")]
    Month(consumptions::DateArgs),

    /// Run one polling cycle per contract and print the readings.
    #[command(visible_alias = "r")]
    Refresh(refresh::RefreshArgs),

    /// Poll every contract on its interval until interrupted.
    Run,

    /// List stored statistic series.
    Stats,

    /// Delete the stored statistics of a contract.
    Clear(stats::ClearArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// A new token is needed.
    AuthRequired = 2,
    /// Settings missing or invalid.
    ConfigError = 3,
    /// The API could not be reached or answered with an error.
    ApiError = 4,
}

impl ExitCode {
    /// Picks the exit code for a failed command.
    fn for_error(err: &anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<ApiError>() {
            return if e.is_auth_failure() {
                ExitCode::AuthRequired
            } else {
                ExitCode::ApiError
            };
        }
        if err.downcast_ref::<CoordinatorError>().is_some() {
            return ExitCode::AuthRequired;
        }
        if let Some(StoreError::Config(_)) = err.downcast_ref::<StoreError>() {
            return ExitCode::ConfigError;
        }
        ExitCode::Error
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool, with_time: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("aigues=debug,info")
    } else {
        EnvFilter::new("aigues=warn")
    };

    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    if with_time {
        tracing_subscriber::registry().with(layer).with(filter).init();
    } else {
        tracing_subscriber::registry()
            .with(layer.without_time())
            .with(filter)
            .init();
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet, matches!(cli.command, Commands::Run));

    let result = match &cli.command {
        Commands::Setup(args) => setup::run_setup(args, &cli).await,
        Commands::Token(args) => setup::run_token(args, &cli).await,
        Commands::Contracts(args) => account::run_contracts(args, &cli).await,
        Commands::Profile => account::run_profile(&cli).await,
        Commands::Invoices(args) => account::run_invoices(args, &cli).await,
        Commands::Consumptions(args) => consumptions::run_range(args, &cli).await,
        Commands::Week(args) => consumptions::run_week(args, &cli).await,
        Commands::Month(args) => consumptions::run_month(args, &cli).await,
        Commands::Refresh(args) => refresh::run(args, &cli).await,
        Commands::Run => run::run(&cli).await,
        Commands::Stats => stats::run_stats(&cli).await,
        Commands::Clear(args) => stats::run_clear(args, &cli).await,
    };

    if let Err(e) = result {
        if !cli.quiet {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(ExitCode::for_error(&e) as i32);
    }

    std::process::exit(ExitCode::Success as i32);
}
