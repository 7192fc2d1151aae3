//! Refdash CLI - Main Entry Point
//!
//! Runs acceptance scenarios against the referral dashboard and manages
//! visual baselines.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use refdash_oracle::config::DEFAULT_CONFIG_FILE;
use refdash_oracle::OracleConfig;

mod commands;
mod output;

use commands::{baselines, capture, catalog, run};

/// Exit code for configuration and I/O failures of the harness itself
const EXIT_HARNESS_ERROR: i32 = 2;

/// Refdash - visual-acceptance oracle for the referral dashboard
#[derive(Parser)]
#[command(name = "refdash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "REFDASH_CONFIG", default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios and gate their screenshots
    Run(run::RunArgs),

    /// List the expectations scenarios check
    Catalog(catalog::CatalogArgs),

    /// Capture a DOM snapshot for a scenario's expectations
    Capture(capture::CaptureArgs),

    /// Manage visual baselines
    #[command(subcommand)]
    Baselines(baselines::BaselineCommands),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            EXIT_HARNESS_ERROR
        }
    };

    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = OracleConfig::load(&cli.config)?;

    match cli.command {
        Commands::Run(args) => run::execute(args, config, cli.format).await,
        Commands::Catalog(args) => catalog::execute(args, &config, cli.format).map(|()| 0),
        Commands::Capture(args) => capture::execute(args, config, cli.format).await.map(|()| 0),
        Commands::Baselines(cmd) => baselines::execute(cmd, &config, cli.format).map(|()| 0),
    }
}
