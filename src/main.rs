//! Binary entry point for promptport.
//!
//! This binary provides the CLI interface for the promptport pipeline.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use promptport::PipelineConfig;
use promptport::cli::{ExportArgs, ImportArgs, ValidateArgs, cmd_export, cmd_import, cmd_validate};
use promptport::observability;
use std::path::PathBuf;
use std::process::ExitCode;

/// Promptport - import and export generation prompts with integrity checks.
#[derive(Parser)]
#[command(name = "promptport")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "PROMPTPORT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Export prompts to JSON, CSV, XML or all three.
    Export(ExportArgs),

    /// Import a payload into the store.
    Import(ImportArgs),

    /// Validate a payload without importing it.
    Validate(ValidateArgs),
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match PipelineConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init(&config.logging_config(cli.verbose)) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    let result = match &cli.command {
        Commands::Export(args) => cmd_export(args, &config).await,
        Commands::Import(args) => cmd_import(args, &config).await,
        Commands::Validate(args) => cmd_validate(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}
