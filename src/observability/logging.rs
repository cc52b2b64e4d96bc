//! Structured logging configuration.

use crate::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "PROMPTPORT_LOG";

const DEFAULT_DIRECTIVE: &str = "promptport=info,warn";
const VERBOSE_DIRECTIVE: &str = "promptport=debug,info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(Error::InvalidInput(format!("Unknown log format: {s}"))),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Fallback filter directive.
    pub directive: String,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(LogFormat::Pretty, None, false)
    }
}

impl LoggingConfig {
    /// Creates a configuration. `verbose` wins over `level`.
    #[must_use]
    pub fn new(format: LogFormat, level: Option<&str>, verbose: bool) -> Self {
        let directive = match level {
            _ if verbose => VERBOSE_DIRECTIVE,
            Some(level) if !level.trim().is_empty() => level,
            _ => DEFAULT_DIRECTIVE,
        };
        Self {
            format,
            directive: directive.to_string(),
            file: None,
        }
    }

    /// Writes logs to `file` instead of stderr.
    #[must_use]
    pub fn with_file(mut self, file: Option<PathBuf>) -> Self {
        self.file = file;
        self
    }

    /// Builds the filter: `PROMPTPORT_LOG`, then `RUST_LOG`, then the directive.
    ///
    /// # Errors
    ///
    /// Returns an error if the directive is invalid.
    pub fn filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_from_env(LOG_ENV_VAR)
            .or_else(|_| EnvFilter::try_from_default_env())
            .or_else(|_| EnvFilter::try_new(&self.directive))
            .map_err(|e| Error::InvalidInput(format!("Invalid log filter '{}': {e}", self.directive)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("json", LogFormat::Json; "json")]
    #[test_case("PRETTY", LogFormat::Pretty; "pretty uppercase")]
    #[test_case("text", LogFormat::Pretty; "text alias")]
    fn test_log_format_from_str(input: &str, expected: LogFormat) {
        assert_eq!(input.parse::<LogFormat>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_format() {
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_directive_precedence() {
        assert_eq!(LoggingConfig::new(LogFormat::Json, Some("debug"), true).directive, VERBOSE_DIRECTIVE);
        assert_eq!(LoggingConfig::new(LogFormat::Json, Some("debug"), false).directive, "debug");
        assert_eq!(LoggingConfig::new(LogFormat::Json, Some(" "), false).directive, DEFAULT_DIRECTIVE);
    }
}
