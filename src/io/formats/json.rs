//! JSON format codec.
//!
//! Export writes the native package envelope. Import accepts a package
//! (`{"prompts": [...]}`), a bare array, a single record, or newline-delimited
//! records (NDJSON/JSONL).

use crate::io::formats::ExportHeader;
use crate::io::package::{ExportPackage, PACKAGE_FORMAT_VERSION, PackageMetadata};
use crate::io::traits::{ExportSink, ImportSource};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::VecDeque;
use std::io::Write;

fn write_failed(e: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: "write_json".to_string(),
        cause: e.to_string(),
    }
}

/// Serializes a fully assembled package.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_package(package: &ExportPackage) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(package).map_err(write_failed)
}

/// JSON import source.
///
/// The payload is parsed up front; records are then yielded in order.
pub struct JsonImportSource {
    records: VecDeque<Value>,
}

impl JsonImportSource {
    /// Parses `bytes` into a record queue.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the payload is not valid JSON in any
    /// of the accepted layouts.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let records = match serde_json::from_slice::<Value>(bytes) {
            Ok(document) => Self::unwrap_document(document)?,
            Err(whole_err) => Self::parse_lines(bytes).map_err(|line_err| {
                if Self::non_empty_lines(bytes) > 1 {
                    line_err
                } else {
                    Error::InvalidInput(format!("Failed to parse JSON: {whole_err}"))
                }
            })?,
        };
        Ok(Self {
            records: records.into(),
        })
    }

    fn unwrap_document(document: Value) -> Result<Vec<Value>> {
        match document {
            Value::Array(items) => Ok(items),
            Value::Object(mut map) => match map.remove("prompts") {
                Some(Value::Array(items)) => Ok(items),
                Some(_) => Err(Error::InvalidInput(
                    "Package field 'prompts' must be an array".to_string(),
                )),
                None => Ok(vec![Value::Object(map)]),
            },
            other => Err(Error::InvalidInput(format!(
                "Expected a JSON object or array, found {}",
                type_name(&other)
            ))),
        }
    }

    fn non_empty_lines(bytes: &[u8]) -> usize {
        String::from_utf8_lossy(bytes)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count()
    }

    fn parse_lines(bytes: &[u8]) -> Result<Vec<Value>> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::InvalidInput(format!("Payload is not UTF-8: {e}")))?;

        let mut records = Vec::new();
        for (line_number, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record = serde_json::from_str(trimmed).map_err(|e| {
                Error::InvalidInput(format!("Line {}: Failed to parse JSON: {e}", line_number + 1))
            })?;
            records.push(record);
        }

        if records.is_empty() {
            return Err(Error::InvalidInput("Payload is empty".to_string()));
        }
        Ok(records)
    }
}

impl ImportSource for JsonImportSource {
    fn next(&mut self) -> Result<Option<Value>> {
        Ok(self.records.pop_front())
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.records.len())
    }
}

/// Returns a short JSON type name for error messages.
#[must_use]
pub const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Streaming JSON package writer.
///
/// Emits the same envelope as [`encode_package`] in compact form, one record
/// at a time, so the full package never has to exist as a value tree.
pub struct JsonExportSink<'a> {
    writer: &'a mut dyn Write,
    compatibility: Value,
    /// Number of records written.
    count: usize,
}

impl<'a> JsonExportSink<'a> {
    /// Creates a sink and writes the envelope header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be written.
    pub fn new(writer: &'a mut dyn Write, header: &ExportHeader) -> Result<Self> {
        let metadata = PackageMetadata {
            title: header.title.clone(),
            exported_by: header.exported_by.clone(),
            exported_at: header.exported_at.clone(),
            total_prompts: header.total_prompts,
            categories: header.categories.clone(),
        };

        write!(
            writer,
            "{{\"exportId\":{},\"version\":{},\"metadata\":{},\"prompts\":[",
            Value::from(header.export_id.as_str()),
            Value::from(PACKAGE_FORMAT_VERSION),
            serde_json::to_string(&metadata).map_err(write_failed)?,
        )
        .map_err(write_failed)?;

        Ok(Self {
            writer,
            compatibility: serde_json::to_value(&header.compatibility).map_err(write_failed)?,
            count: 0,
        })
    }
}

impl ExportSink for JsonExportSink<'_> {
    fn write(&mut self, record: &Value) -> Result<()> {
        if self.count > 0 {
            self.writer.write_all(b",").map_err(write_failed)?;
        }
        serde_json::to_writer(&mut *self.writer, record).map_err(write_failed)?;
        self.count += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        write!(self.writer, "],\"compatibility\":{}}}", self.compatibility).map_err(write_failed)?;
        self.writer.flush().map_err(write_failed)
    }
}
