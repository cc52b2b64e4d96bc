//! # Promptport
//!
//! Import/export pipeline for structured generation prompts.
//!
//! Promptport serializes [`Prompt`](models::Prompt) collections to JSON, CSV and
//! XML (optionally gzip-compressed and encrypted, always checksummed) and
//! ingests native packages, CSV files and third-party provider records back
//! into a keyed prompt store.
//!
//! ## Features
//!
//! - Native JSON export packages with compatibility metadata
//! - SHA-256 checksums over the exact bytes delivered
//! - Integrity reports with per-record severities and statistics
//! - Conflict resolution (skip, overwrite, merge, rename) with audit records
//! - Batched, optionally parallel persistence with progress and cancellation
//! - Retry with exponential backoff and streaming fallback for large exports
//!
//! ## Example
//!
//! ```rust,ignore
//! use promptport::io::{ExportJob, ExportService, ExportFormat};
//!
//! let job = ExportJob::new("Weekly prompts", ExportFormat::Json, prompts);
//! let result = ExportService::new().execute_export(&job).await;
//! assert!(result.success);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod cli;
pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod storage;

pub use config::PipelineConfig;
pub use models::{Category, Difficulty, Prompt, PromptMetadata, PromptStatus};
pub use storage::{InMemoryPromptStore, PromptStore};

/// Error type for promptport operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed payloads, unknown formats or strategies, bad options |
/// | `OperationFailed` | Serialization, compression or store operations fail |
/// | `Transient` | A delivery step failed in a way that may succeed on retry |
/// | `Timeout` | A single export attempt exceeded its time budget |
/// | `IntegrityViolation` | Checksum mismatch or schema violation on a record |
/// | `FileTooLarge` | A materialized export exceeds `max_file_size` without streaming fallback |
/// | `FeatureNotEnabled` | Encryption requested without the `encryption` feature |
/// | `Cancelled` | The caller cancelled a running job |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A payload cannot be parsed in the declared format
    /// - An unknown conflict strategy or format name is given
    /// - Option values are out of range (e.g. compression level 12)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A transient failure (I/O, network, exhausted resource).
    ///
    /// These are retried with exponential backoff by the export service.
    #[error("transient failure in '{operation}': {cause}")]
    Transient {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// An operation exceeded its time budget.
    #[error("operation '{operation}' timed out after {elapsed_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// Elapsed time in milliseconds.
        elapsed_ms: u64,
    },

    /// Data failed an integrity check.
    #[error("integrity violation [{code}]: {message}")]
    IntegrityViolation {
        /// Machine-readable code (e.g. `checksum_mismatch`).
        code: String,
        /// Human-readable description.
        message: String,
    },

    /// An export artifact exceeded the configured size limit.
    #[error("export of {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge {
        /// Size of the materialized artifact.
        size: u64,
        /// Configured maximum.
        limit: u64,
    },

    /// Feature not enabled (requires feature flag).
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),

    /// The job was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Returns whether the failure may succeed when retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Returns a stable machine-readable code for result envelopes.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::OperationFailed { .. } => "operation_failed",
            Self::Transient { .. } => "transient_failure",
            Self::Timeout { .. } => "timeout",
            Self::IntegrityViolation { code, .. } => code,
            Self::FileTooLarge { .. } => "file_too_large",
            Self::FeatureNotEnabled(_) => "feature_not_enabled",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::OutOfMemory => Self::Transient {
                operation: "io".to_string(),
                cause: e.to_string(),
            },
            _ => Self::OperationFailed {
                operation: "io".to_string(),
                cause: e.to_string(),
            },
        }
    }
}

/// Result type alias for promptport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current time as an RFC 3339 string (UTC, millisecond precision).
#[must_use]
pub fn current_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "test".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'test' failed: failed");

        let err = Error::Timeout {
            operation: "export".to_string(),
            elapsed_ms: 250,
        };
        assert_eq!(err.to_string(), "operation 'export' timed out after 250ms");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(
            Error::Transient {
                operation: "deliver".to_string(),
                cause: "connection reset".to_string(),
            }
            .is_retryable()
        );
        assert!(
            Error::Timeout {
                operation: "export".to_string(),
                elapsed_ms: 1,
            }
            .is_retryable()
        );
        assert!(!Error::InvalidInput("bad".to_string()).is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn test_error_codes() {
        let err = Error::IntegrityViolation {
            code: "checksum_mismatch".to_string(),
            message: "digest differs".to_string(),
        };
        assert_eq!(err.code(), "checksum_mismatch");
        assert_eq!(Error::Cancelled.code(), "cancelled");
    }

    #[test]
    fn test_io_error_mapping() {
        let transient: Error = std::io::Error::from(std::io::ErrorKind::TimedOut).into();
        assert!(transient.is_retryable());

        let permanent: Error = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(!permanent.is_retryable());
    }

    #[test]
    fn test_current_rfc3339_parses() {
        let now = current_rfc3339();
        assert!(chrono::DateTime::parse_from_rfc3339(&now).is_ok());
    }
}
