//! Import CLI command.

// CLI commands are allowed to use println! for output
#![allow(clippy::print_stdout)]

use super::{SourceArgs, read_secret};
use crate::cli::store::{read_store, write_store};
use crate::config::PipelineConfig;
use crate::io::{ConflictPolicy, ConflictStrategy, ImportJob, ImportOptions, ImportService};
use crate::{Error, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

/// Errors listed in the summary before truncating.
const MAX_LISTED_ERRORS: usize = 10;

/// Arguments for `promptport import`.
#[derive(Debug, Clone, Args)]
pub struct ImportArgs {
    /// Payload to import.
    #[command(flatten)]
    pub source: SourceArgs,

    /// Store file.
    #[arg(long, default_value = super::store::DEFAULT_STORE_FILE)]
    pub store: PathBuf,

    /// Collision strategy: skip_existing, overwrite, merge or rename_new.
    #[arg(long, default_value = "skip_existing")]
    pub strategy: String,

    /// Refuse the payload if any record is invalid.
    #[arg(long)]
    pub strict: bool,

    /// Report without writing.
    #[arg(long)]
    pub dry_run: bool,

    /// Persist each batch concurrently.
    #[arg(long)]
    pub parallel: bool,

    /// Records per batch.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Stop after this many failed records.
    #[arg(long)]
    pub max_errors: Option<usize>,

    /// Stop at the first failed batch.
    #[arg(long)]
    pub no_partial: bool,

    /// Mint fresh ids for new prompts.
    #[arg(long)]
    pub fresh_ids: bool,

    /// Repair a payload whose checksum does not match.
    #[arg(long)]
    pub auto_repair: bool,

    /// Project for prompts converted from provider records.
    #[arg(long)]
    pub project_id: Option<String>,
}

impl ImportArgs {
    /// Builds import options on top of the configured defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the decryption secret variable is unset or empty.
    pub fn options(&self, config: &PipelineConfig) -> Result<ImportOptions> {
        let mut options = config.import_options();
        options.strict_validation = self.strict;
        options.dry_run = self.dry_run;
        options.parallel_processing = self.parallel;
        options.allow_partial_import = !self.no_partial;
        options.preserve_ids = !self.fresh_ids;
        options.auto_repair = self.auto_repair;
        options.backup_original = self.auto_repair;
        if let Some(size) = self.batch_size {
            options.batch_size = size;
        }
        if self.max_errors.is_some() {
            options.max_errors = self.max_errors;
        }
        if let Some(project_id) = &self.project_id {
            options.adapter.project_id.clone_from(project_id);
        }
        if let Some(var) = &self.source.decrypt_env {
            options.decryption_secret = Some(read_secret(var)?);
        }
        Ok(options)
    }

    /// Builds the job.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown formats or strategies, or unreadable sources.
    pub fn job(&self, config: &PipelineConfig) -> Result<ImportJob> {
        let strategy: ConflictStrategy = self.strategy.parse()?;
        Ok(ImportJob::new(self.source.format()?, self.source.payload()?)
            .with_options(self.options(config)?)
            .with_conflict_policy(ConflictPolicy::new(strategy))
            .with_requested_by("cli"))
    }
}

/// Runs `promptport import`.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written, or the import fails.
pub async fn cmd_import(args: &ImportArgs, config: &PipelineConfig) -> Result<()> {
    let job = args.job(config)?;
    let store = Arc::new(read_store(&args.store)?);

    let result = ImportService::new().execute_import(&job, &store).await;

    if result.success && !result.dry_run {
        write_store(&args.store, store.as_ref())?;
    }

    if result.dry_run {
        println!("Dry run completed (no changes made):");
    } else if result.success {
        println!("Import completed:");
    } else {
        println!("Import failed:");
    }
    println!("  Records:      {}", result.total_records);
    println!("  Imported:     {}", result.imported_count);
    println!("  Skipped:      {}", result.skipped_count);
    println!("  Overwritten:  {}", result.overwritten_count);
    println!("  Merged:       {}", result.merged_count);
    println!("  Renamed:      {}", result.renamed_count);
    println!("  Errors:       {}", result.error_count);
    if let Some(valid) = result.integrity_report.checksum_valid {
        println!("  Checksum:     {}", if valid { "ok" } else { "MISMATCH" });
    }

    if !result.errors.is_empty() {
        println!();
        println!("Errors ({}):", result.errors.len());
        for error in result.errors.iter().take(MAX_LISTED_ERRORS) {
            println!(
                "  - record {} ({}): [{}] {}",
                error.index,
                error.id.as_deref().unwrap_or("?"),
                error.code,
                error.message
            );
        }
        if result.errors.len() > MAX_LISTED_ERRORS {
            println!("  ... and {} more", result.errors.len() - MAX_LISTED_ERRORS);
        }
    }

    match result.error {
        Some(error) if !result.success => Err(Error::OperationFailed {
            operation: "import".to_string(),
            cause: format!("[{}] {}", error.code, error.message),
        }),
        _ => Ok(()),
    }
}
