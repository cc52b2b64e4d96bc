//! Validate CLI command.

// CLI commands are allowed to use println! for output
#![allow(clippy::print_stdout)]

use super::{SourceArgs, read_secret};
use crate::io::IntegrityValidator;
use crate::io::validation::IntegrityReport;
use crate::{Error, Result};
use clap::Args;

/// Arguments for `promptport validate`.
#[derive(Debug, Clone, Args)]
pub struct ValidateArgs {
    /// Payload to validate.
    #[command(flatten)]
    pub source: SourceArgs,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Validates the payload described by `args`.
///
/// # Errors
///
/// Returns an error if the source cannot be read or the format is unknown.
pub fn validate_source(args: &ValidateArgs) -> Result<IntegrityReport> {
    let secret = args.source.decrypt_env.as_deref().map(read_secret).transpose()?;
    Ok(IntegrityValidator::new()
        .with_decryption_secret(secret)
        .validate(&args.source.payload()?, args.source.format()?))
}

/// Runs `promptport validate`.
///
/// # Errors
///
/// Returns an error if the source cannot be read or is invalid.
pub fn cmd_validate(args: &ValidateArgs) -> Result<()> {
    let report = validate_source(args)?;

    if args.json {
        let rendered = serde_json::to_string_pretty(&report).map_err(|e| Error::OperationFailed {
            operation: "render_report".to_string(),
            cause: e.to_string(),
        })?;
        println!("{rendered}");
    } else {
        let stats = &report.statistics;
        println!("Valid:        {}", report.valid);
        if let Some(checksum) = report.checksum_valid {
            println!("Checksum:     {}", if checksum { "ok" } else { "MISMATCH" });
        }
        println!("Records:      {} ({} valid, {} invalid)", stats.total, stats.valid, stats.invalid);
        println!("Duplicates:   {}", stats.duplicates);
        for error in &report.errors {
            let location = error.record.map_or_else(String::new, |r| format!(" record {r}"));
            println!("  {} [{}]{location}: {}", error.severity.as_str(), error.code, error.message);
        }
        for warning in &report.warnings {
            println!("  warning [{}]: {}", warning.code, warning.message);
        }
    }

    if report.valid {
        Ok(())
    } else {
        Err(Error::IntegrityViolation {
            code: "invalid_payload".to_string(),
            message: format!("{} finding(s)", report.errors.len()),
        })
    }
}
