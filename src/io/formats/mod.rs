//! Format codecs for import/export.
//!
//! Each export format implements [`ExportSink`]; each import format yields
//! raw records through [`ImportSource`].

pub mod csv;
pub mod json;
pub mod xml;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use super::package::Compatibility;
use super::traits::{ExportSink, ImportSource};

/// Target formats for export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Native JSON export package.
    Json,
    /// Flat CSV with dotted column paths.
    Csv,
    /// XML document.
    Xml,
    /// Several of the above in one job.
    Multiple,
}

impl ExportFormat {
    /// Formats that produce a single artifact.
    #[must_use]
    pub const fn single_formats() -> &'static [Self] {
        &[Self::Json, Self::Csv, Self::Xml]
    }

    /// Returns the format name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Xml => "xml",
            Self::Multiple => "multiple",
        }
    }

    /// Returns the file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Json | Self::Multiple => "json",
            Self::Csv => "csv",
            Self::Xml => "xml",
        }
    }

    /// Returns the MIME type for this format.
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Json | Self::Multiple => "application/json",
            Self::Csv => "text/csv",
            Self::Xml => "application/xml",
        }
    }

    /// Artifact name used in export results (`export.json`, ...).
    #[must_use]
    pub fn artifact_name(&self) -> String {
        format!("export.{}", self.extension())
    }

    /// Detects format from file extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is not recognized.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match ext.as_deref() {
            Some(ext) => ext.parse(),
            None => Err(Error::InvalidInput(
                "Cannot determine format: file has no extension".to_string(),
            )),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "xml" => Ok(Self::Xml),
            "multiple" | "all" => Ok(Self::Multiple),
            _ => Err(Error::InvalidInput(format!("Unknown export format: {s}"))),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source formats accepted by import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportSourceFormat {
    /// Native JSON export package (or a bare array of prompts).
    Native,
    /// OpenAI chat-completion style records.
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic messages style records.
    Anthropic,
    /// `HuggingFace` inference style records.
    #[serde(rename = "huggingface")]
    HuggingFace,
    /// CSV with dotted column headers.
    Csv,
}

impl ImportSourceFormat {
    /// Returns all source formats.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Native,
            Self::OpenAi,
            Self::Anthropic,
            Self::HuggingFace,
            Self::Csv,
        ]
    }

    /// Returns the format name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::HuggingFace => "huggingface",
            Self::Csv => "csv",
        }
    }

    /// Returns whether records need a provider adapter.
    #[must_use]
    pub const fn is_provider(&self) -> bool {
        matches!(self, Self::OpenAi | Self::Anthropic | Self::HuggingFace)
    }
}

impl FromStr for ImportSourceFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "native" | "json" => Ok(Self::Native),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "csv" => Ok(Self::Csv),
            _ => Err(Error::InvalidInput(format!("Unknown import format: {s}"))),
        }
    }
}

impl std::fmt::Display for ImportSourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Header written by sinks that carry export-level context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportHeader {
    /// Export identifier.
    pub export_id: String,
    /// Human-readable title.
    pub title: String,
    /// Requester identity.
    pub exported_by: String,
    /// RFC 3339 export time.
    pub exported_at: String,
    /// Number of records that will be written.
    pub total_prompts: usize,
    /// Distinct categories, sorted.
    pub categories: Vec<String>,
    /// Compatibility block for native packages.
    pub compatibility: Compatibility,
}

/// Creates an import source for the given format over decoded bytes.
///
/// Provider formats share the JSON reader; normalization happens later.
///
/// # Errors
///
/// Returns an error if the payload cannot be parsed.
pub fn create_import_source(
    bytes: &[u8],
    format: ImportSourceFormat,
) -> Result<Box<dyn ImportSource + '_>> {
    match format {
        ImportSourceFormat::Csv => Ok(Box::new(csv::CsvImportSource::new(bytes)?)),
        ImportSourceFormat::Native
        | ImportSourceFormat::OpenAi
        | ImportSourceFormat::Anthropic
        | ImportSourceFormat::HuggingFace => Ok(Box::new(json::JsonImportSource::from_slice(bytes)?)),
    }
}

/// Reads every record from `bytes`.
///
/// # Errors
///
/// Returns an error if the payload or any record cannot be parsed.
pub fn read_records(bytes: &[u8], format: ImportSourceFormat) -> Result<Vec<Value>> {
    let mut source = create_import_source(bytes, format)?;
    let mut records = Vec::with_capacity(source.size_hint().unwrap_or(0));
    while let Some(record) = source.next()? {
        records.push(record);
    }
    Ok(records)
}

/// Creates an export sink for a single-artifact format.
///
/// # Errors
///
/// Returns an error for [`ExportFormat::Multiple`] or if the header cannot be written.
/// `columns` only applies to CSV.
pub fn create_export_sink<'a>(
    writer: &'a mut dyn Write,
    format: ExportFormat,
    header: &ExportHeader,
    columns: &[String],
) -> Result<Box<dyn ExportSink + 'a>> {
    match format {
        ExportFormat::Json => Ok(Box::new(json::JsonExportSink::new(writer, header)?)),
        ExportFormat::Csv => Ok(Box::new(csv::CsvExportSink::new(writer, columns)?)),
        ExportFormat::Xml => Ok(Box::new(xml::XmlExportSink::new(writer, header)?)),
        ExportFormat::Multiple => Err(Error::InvalidInput(
            "multiple is not a single-artifact format".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_format_from_str() {
        assert_eq!(ExportFormat::from_str("json").unwrap(), ExportFormat::Json);
        assert_eq!(ExportFormat::from_str("XML").unwrap(), ExportFormat::Xml);
        assert_eq!(ExportFormat::from_str("all").unwrap(), ExportFormat::Multiple);
        assert!(ExportFormat::from_str("yaml").is_err());
    }

    #[test]
    fn test_export_format_from_path() {
        assert_eq!(
            ExportFormat::from_path(Path::new("out.csv")).unwrap(),
            ExportFormat::Csv
        );
        assert!(ExportFormat::from_path(Path::new("out")).is_err());
    }

    #[test]
    fn test_import_format_names() {
        for format in ImportSourceFormat::all() {
            assert_eq!(ImportSourceFormat::from_str(format.as_str()).unwrap(), *format);
        }
        assert_eq!(
            ImportSourceFormat::from_str("hf").unwrap(),
            ImportSourceFormat::HuggingFace
        );
        assert!(ImportSourceFormat::from_str("bard").is_err());
        assert!(ImportSourceFormat::OpenAi.is_provider());
        assert!(!ImportSourceFormat::Csv.is_provider());
    }

    #[test]
    fn test_import_format_serde_names() {
        let json = serde_json::to_string(&ImportSourceFormat::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
    }

    #[test]
    fn test_read_records_dispatches_on_format() {
        let csv = b"id,metadata.title\np1,Hello\n";
        let records = read_records(csv, ImportSourceFormat::Csv).unwrap();
        assert_eq!(records[0]["metadata"]["title"], "Hello");

        let json = br#"[{"id":"p1"},{"id":"p2"}]"#;
        assert_eq!(read_records(json, ImportSourceFormat::Native).unwrap().len(), 2);
    }
}
