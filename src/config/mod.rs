//! Configuration management.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `PROMPTPORT_*` environment variables.

use crate::io::persist::DEFAULT_MAX_CONCURRENCY;
use crate::io::services::export::{DEFAULT_CHUNK_SIZE, DEFAULT_RETRY_ATTEMPTS};
use crate::io::services::import::DEFAULT_BATCH_SIZE;
use crate::io::transform::DEFAULT_COMPRESSION_LEVEL;
use crate::io::{ExportOptions, ImportOptions};
use crate::observability::{LogFormat, LoggingConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "promptport.toml";

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "PROMPTPORT_";

/// Main configuration for promptport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Export defaults.
    pub export: ExportSettings,
    /// Import defaults.
    pub import: ImportSettings,
    /// Logging.
    pub logging: LoggingSettings,
}

/// Export defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    /// Retries after the first attempt.
    pub retry_attempts: u32,
    /// Delay before the first retry.
    pub retry_delay: Duration,
    /// Per-attempt time budget.
    pub timeout: Option<Duration>,
    /// Gzip level.
    pub compression_level: u32,
    /// Records per streaming chunk.
    pub chunk_size: usize,
    /// Largest materialized artifact.
    pub max_file_size: Option<u64>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: Duration::from_secs(1),
            timeout: None,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_size: None,
        }
    }
}

/// Import defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSettings {
    /// Source records per batch.
    pub batch_size: usize,
    /// Concurrent writes in parallel mode.
    pub max_concurrency: usize,
    /// Error threshold.
    pub max_errors: Option<usize>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_errors: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Output format.
    pub format: LogFormat,
    /// Filter directive used when neither `PROMPTPORT_LOG` nor `RUST_LOG` is set.
    pub level: Option<String>,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Export section.
    pub export: Option<ConfigFileExport>,
    /// Import section.
    pub import: Option<ConfigFileImport>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Export section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileExport {
    /// Retries.
    pub retry_attempts: Option<u32>,
    /// Retry delay in milliseconds.
    pub retry_delay_ms: Option<u64>,
    /// Attempt timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Gzip level.
    pub compression_level: Option<u32>,
    /// Chunk size.
    pub chunk_size: Option<usize>,
    /// Size limit in bytes.
    pub max_file_size: Option<u64>,
}

/// Import section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileImport {
    /// Batch size.
    pub batch_size: Option<usize>,
    /// Concurrency.
    pub max_concurrency: Option<usize>,
    /// Error threshold.
    pub max_errors: Option<usize>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileLogging {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `promptport=debug`.
    pub level: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid configuration.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;
        Self::from_config_file(file)
    }

    /// Loads the full layered configuration.
    ///
    /// Reads `path` when given, otherwise [`DEFAULT_CONFIG_FILE`] if it
    /// exists, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file, or an existing default file,
    /// cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load_from_file(Path::new(DEFAULT_CONFIG_FILE))?
            },
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Applies `PROMPTPORT_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Applies overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = parse_env(&var, "EXPORT_RETRY_ATTEMPTS") {
            self.export.retry_attempts = v;
        }
        if let Some(ms) = parse_env(&var, "EXPORT_RETRY_DELAY_MS") {
            self.export.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env(&var, "EXPORT_TIMEOUT_MS") {
            self.export.timeout = Some(Duration::from_millis(ms));
        }
        if let Some(v) = parse_env(&var, "EXPORT_COMPRESSION_LEVEL") {
            self.export.compression_level = v;
        }
        if let Some(v) = parse_env(&var, "EXPORT_CHUNK_SIZE") {
            self.export.chunk_size = v;
        }
        if let Some(v) = parse_env(&var, "EXPORT_MAX_FILE_SIZE") {
            self.export.max_file_size = Some(v);
        }
        if let Some(v) = parse_env(&var, "IMPORT_BATCH_SIZE") {
            self.import.batch_size = v;
        }
        if let Some(v) = parse_env(&var, "IMPORT_MAX_CONCURRENCY") {
            self.import.max_concurrency = v;
        }
        if let Some(v) = parse_env(&var, "IMPORT_MAX_ERRORS") {
            self.import.max_errors = Some(v);
        }
        if let Some(format) = parse_env(&var, "LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(file) = var("LOG_FILE").filter(|f| !f.is_empty()) {
            self.logging.file = Some(PathBuf::from(file));
        }
    }

    /// Converts a `ConfigFile` to `PipelineConfig`.
    fn from_config_file(file: ConfigFile) -> crate::Result<Self> {
        let mut config = Self::default();

        if let Some(export) = file.export {
            if let Some(v) = export.retry_attempts {
                config.export.retry_attempts = v;
            }
            if let Some(ms) = export.retry_delay_ms {
                config.export.retry_delay = Duration::from_millis(ms);
            }
            config.export.timeout = export.timeout_ms.map(Duration::from_millis);
            if let Some(level) = export.compression_level {
                config.export.compression_level =
                    crate::io::transform::compression::validate_level(level)?;
            }
            if let Some(v) = export.chunk_size {
                config.export.chunk_size = v;
            }
            config.export.max_file_size = export.max_file_size;
        }
        if let Some(import) = file.import {
            if let Some(v) = import.batch_size {
                config.import.batch_size = v;
            }
            if let Some(v) = import.max_concurrency {
                config.import.max_concurrency = v;
            }
            config.import.max_errors = import.max_errors;
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = format.parse()?;
            }
            config.logging.level = logging.level;
            config.logging.file = logging.file.map(PathBuf::from);
        }

        Ok(config)
    }

    /// Export options seeded from these settings.
    #[must_use]
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            retry_attempts: self.export.retry_attempts,
            retry_delay: self.export.retry_delay,
            timeout: self.export.timeout,
            compression_level: self.export.compression_level,
            chunk_size: self.export.chunk_size,
            max_file_size: self.export.max_file_size,
            ..ExportOptions::default()
        }
    }

    /// Import options seeded from these settings.
    #[must_use]
    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            batch_size: self.import.batch_size,
            max_concurrency: self.import.max_concurrency,
            max_errors: self.import.max_errors,
            ..ImportOptions::default()
        }
    }

    /// Logging configuration for [`crate::observability::init`].
    #[must_use]
    pub fn logging_config(&self, verbose: bool) -> LoggingConfig {
        LoggingConfig::new(self.logging.format, self.logging.level.as_deref(), verbose)
            .with_file(self.logging.file.clone())
    }
}

fn parse_env<T, F>(var: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = var(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = %format!("{ENV_PREFIX}{name}"), value = %raw, "Ignoring unparseable environment override");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new();
        assert_eq!(config.export.retry_attempts, 3);
        assert_eq!(config.export.chunk_size, 100);
        assert_eq!(config.import.batch_size, 50);
        assert_eq!(config.import.max_concurrency, 8);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_from_toml() {
        let config = PipelineConfig::from_toml(
            r#"
            [export]
            retry_attempts = 5
            retry_delay_ms = 250
            compression_level = 9

            [import]
            batch_size = 20
            max_errors = 3

            [logging]
            format = "json"
            level = "promptport=debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.export.retry_attempts, 5);
        assert_eq!(config.export.retry_delay, Duration::from_millis(250));
        assert_eq!(config.export.compression_level, 9);
        assert_eq!(config.import.batch_size, 20);
        assert_eq!(config.import.max_errors, Some(3));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level.as_deref(), Some("promptport=debug"));
    }

    #[test]
    fn test_toml_rejects_bad_values() {
        assert!(PipelineConfig::from_toml("[export]\ncompression_level = 12").is_err());
        assert!(PipelineConfig::from_toml("[export]\nretries = 1").is_err());
        assert!(PipelineConfig::from_toml("[logging]\nformat = \"xml\"").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = PipelineConfig::from_toml("[import]\nbatch_size = 20").unwrap();
        let env: HashMap<&str, &str> = [
            ("PROMPTPORT_IMPORT_BATCH_SIZE", "75"),
            ("PROMPTPORT_EXPORT_TIMEOUT_MS", "1500"),
            ("PROMPTPORT_EXPORT_RETRY_ATTEMPTS", "many"),
        ]
        .into_iter()
        .collect();

        config.apply_env_with(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.import.batch_size, 75);
        assert_eq!(config.export.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.export.retry_attempts, 3);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("promptport.toml");
        std::fs::write(&path, "[export]\nchunk_size = 10\n").unwrap();

        let config = PipelineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.export_options().chunk_size, 10);
        assert!(PipelineConfig::load_from_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_options_conversion() {
        let mut config = PipelineConfig::new();
        config.import.max_errors = Some(4);
        let options = config.import_options();
        assert_eq!(options.max_errors, Some(4));
        assert!(options.preserve_ids);
    }
}
