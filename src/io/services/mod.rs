//! Import and export orchestrators.
//!
//! Both services convert every failure into a result envelope; neither
//! returns `Err` to the caller.

pub mod export;
pub mod import;

pub use export::{
    ExportArtifact, ExportData, ExportJob, ExportManifest, ExportOptions, ExportResult,
    ExportService, ManifestEntry,
};
pub use import::{
    ImportJob, ImportOptions, ImportProgress, ImportResult, ImportService, ProgressCallback,
};

use crate::Error;
use serde::Serialize;
use serde_json::{Value, json};

/// Structured error carried by result envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    /// Machine-readable code from [`Error::code`].
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Variant-specific context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorInfo {
    /// Creates an error without details.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

impl From<&Error> for ErrorInfo {
    fn from(err: &Error) -> Self {
        let details = match err {
            Error::OperationFailed { operation, .. } | Error::Transient { operation, .. } => {
                Some(json!({ "operation": operation }))
            },
            Error::Timeout {
                operation,
                elapsed_ms,
            } => Some(json!({ "operation": operation, "elapsedMs": elapsed_ms })),
            Error::FileTooLarge { size, limit } => Some(json!({ "size": size, "limit": limit })),
            Error::FeatureNotEnabled(feature) => Some(json!({ "feature": feature })),
            Error::InvalidInput(_) | Error::IntegrityViolation { .. } | Error::Cancelled => None,
        };
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            details,
        }
    }
}
