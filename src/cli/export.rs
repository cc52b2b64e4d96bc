//! Export CLI command.

// CLI commands are allowed to use println! for output
#![allow(clippy::print_stdout)]

use super::{read_secret, split_list};
use crate::cli::store::load_prompts;
use crate::config::PipelineConfig;
use crate::io::{
    DirectoryDestination, EncryptionOptions, ExportFormat, ExportJob, ExportOptions, ExportService,
};
use crate::{Error, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments for `promptport export`.
#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    /// JSON file with the prompts to export.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output format: json, csv, xml or multiple.
    #[arg(short, long, default_value = "json")]
    pub format: String,

    /// Directory receiving the artifacts.
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Export title.
    #[arg(short, long, default_value = "Prompt export")]
    pub title: String,

    /// Gzip the artifacts.
    #[arg(long)]
    pub gzip: bool,

    /// Gzip level (1-9).
    #[arg(long)]
    pub level: Option<u32>,

    /// Environment variable holding the encryption secret.
    #[arg(long)]
    pub encrypt_env: Option<String>,

    /// Comma-separated dotted paths to keep.
    #[arg(long)]
    pub fields: Option<String>,

    /// Comma-separated dotted paths to drop.
    #[arg(long)]
    pub exclude: Option<String>,

    /// Keep only title and category in metadata.
    #[arg(long)]
    pub no_metadata: bool,

    /// Drop usage tracking.
    #[arg(long)]
    pub no_usage: bool,

    /// Stream records instead of building the payload in memory.
    #[arg(long)]
    pub streaming: bool,

    /// Largest artifact size in bytes before switching to streaming.
    #[arg(long)]
    pub max_file_size: Option<u64>,
}

impl ExportArgs {
    /// Builds export options on top of the configured defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the encryption secret variable is unset or empty.
    pub fn options(&self, config: &PipelineConfig) -> Result<ExportOptions> {
        let mut options = config.export_options();
        options.fields = split_list(self.fields.as_deref());
        options.exclude_fields = split_list(self.exclude.as_deref());
        options.include_metadata = !self.no_metadata;
        options.include_usage = !self.no_usage;
        options.streaming = self.streaming;
        if self.gzip {
            let level = self.level.unwrap_or(options.compression_level);
            options = options.with_gzip(level);
        }
        if let Some(limit) = self.max_file_size {
            options = options.with_max_file_size(limit);
        }
        if let Some(var) = &self.encrypt_env {
            options = options.with_encryption(EncryptionOptions::aes_256_gcm(read_secret(var)?));
        }
        Ok(options)
    }
}

/// Runs `promptport export`.
///
/// # Errors
///
/// Returns an error if the input cannot be loaded or the export fails.
pub async fn cmd_export(args: &ExportArgs, config: &PipelineConfig) -> Result<()> {
    let format: ExportFormat = args.format.parse()?;
    let prompts = load_prompts(&args.input)?;
    let job = ExportJob::new(args.title.clone(), format, prompts)
        .with_options(args.options(config)?)
        .with_requested_by("cli");

    let service =
        ExportService::new().with_destination(Arc::new(DirectoryDestination::new(&args.output)));
    let result = service.execute_export(&job).await;

    let Some(data) = result.data.filter(|_| result.success) else {
        let message = result
            .error
            .map_or_else(|| "export failed".to_string(), |e| format!("[{}] {}", e.code, e.message));
        return Err(Error::OperationFailed {
            operation: "export".to_string(),
            cause: message,
        });
    };

    println!("Export completed:");
    println!("  Prompts:      {}", job.prompts.len());
    println!("  Retries:      {}", result.retry_count);
    println!("  Time:         {}ms", result.processing_time_ms);
    if data.fallback_used {
        println!("  Streaming fallback used");
    }
    for artifact in &data.artifacts {
        println!(
            "  {} ({} bytes, ratio {:.2}) sha256={}",
            args.output.join(&artifact.name).display(),
            artifact.file_size,
            artifact.compression_ratio,
            artifact.checksum
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ExportArgs,
    }

    fn parse(argv: &[&str]) -> ExportArgs {
        Harness::try_parse_from(std::iter::once("export").chain(argv.iter().copied()))
            .unwrap()
            .args
    }

    #[test]
    fn test_options_from_flags() {
        let args = parse(&["-i", "in.json", "--gzip", "--level", "9", "--fields", "metadata.title, status", "--no-usage"]);
        let options = args.options(&PipelineConfig::default()).unwrap();

        assert_eq!(options.compression_level, 9);
        assert_eq!(options.fields, vec!["metadata.title", "status"]);
        assert!(!options.include_usage);
        assert!(options.include_metadata);
    }

    #[test]
    fn test_gzip_uses_configured_level() {
        let mut config = PipelineConfig::default();
        config.export.compression_level = 3;
        let options = parse(&["-i", "in.json", "--gzip"]).options(&config).unwrap();
        assert_eq!(options.compression_level, 3);
    }

    #[test]
    fn test_missing_secret_variable() {
        let args = parse(&["-i", "in.json", "--encrypt-env", "PROMPTPORT_TEST_UNSET_SECRET_VAR"]);
        assert!(args.options(&PipelineConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_cmd_export_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("prompts.json");
        std::fs::write(
            &input,
            r#"[{"id":"a","projectId":"p","version":"1.0.0","metadata":{"title":"T","category":"general"}}]"#,
        )
        .unwrap();
        let out = dir.path().join("out");
        let args = parse(&[
            "-i",
            input.to_str().unwrap(),
            "-f",
            "multiple",
            "-o",
            out.to_str().unwrap(),
        ]);

        cmd_export(&args, &PipelineConfig::default()).await.unwrap();

        for name in ["export.json", "export.csv", "export.xml"] {
            assert!(out.join(name).exists());
            assert!(out.join(format!("{name}.sha256")).exists());
        }
    }
}
