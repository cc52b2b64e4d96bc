//! CSV format codec.
//!
//! Headers are dotted field paths (`metadata.title`). Tags are joined with
//! `;`; nested objects are written as compact JSON cells.

use crate::io::fields::{get_path, parse_cell, render_cell, set_path};
use crate::io::traits::{ExportSink, ImportSource};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::io::{Read, Write};

/// CSV import source.
///
/// First row is the header row; unknown columns are carried through and
/// ignored by deserialization later.
pub struct CsvImportSource<R: Read> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
    /// Data row number for error reporting (1-based, header excluded).
    row: usize,
}

impl<R: Read> CsvImportSource<R> {
    /// Creates a new CSV import source.
    ///
    /// # Errors
    ///
    /// Returns an error if headers cannot be read or no `id` column exists.
    pub fn new(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| Error::InvalidInput(format!("Failed to read CSV headers: {e}")))?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();

        if !headers.iter().any(|h| h == "id") {
            return Err(Error::InvalidInput("CSV must have an 'id' column".to_string()));
        }

        Ok(Self {
            reader: csv_reader,
            headers,
            row: 0,
        })
    }

    fn parse_record(&self, record: &csv::StringRecord) -> Value {
        let mut value = Value::Object(Map::new());
        for (header, cell) in self.headers.iter().zip(record.iter()) {
            if let Some(parsed) = parse_cell(header, cell) {
                set_path(&mut value, header, parsed);
            }
        }
        value
    }
}

impl<R: Read> ImportSource for CsvImportSource<R> {
    fn next(&mut self) -> Result<Option<Value>> {
        let mut record = csv::StringRecord::new();
        let has_record = self
            .reader
            .read_record(&mut record)
            .map_err(|e| Error::InvalidInput(format!("CSV row {}: {e}", self.row + 1)))?;
        if !has_record {
            return Ok(None);
        }
        self.row += 1;
        Ok(Some(self.parse_record(&record)))
    }
}

/// CSV export sink.
///
/// Fields containing a comma, quote or newline are quoted with internal
/// quotes doubled; absent values are written as empty fields.
pub struct CsvExportSink<'a> {
    writer: csv::Writer<&'a mut dyn Write>,
    columns: Vec<String>,
}

impl<'a> CsvExportSink<'a> {
    /// Creates a sink and writes the header row.
    ///
    /// # Errors
    ///
    /// Returns an error if `columns` is empty or the header cannot be written.
    pub fn new(writer: &'a mut dyn Write, columns: &[String]) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::InvalidInput(
                "CSV export needs at least one column".to_string(),
            ));
        }

        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Necessary)
            .from_writer(writer);
        csv_writer
            .write_record(columns)
            .map_err(|e| Error::OperationFailed {
                operation: "write_csv_headers".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self {
            writer: csv_writer,
            columns: columns.to_vec(),
        })
    }
}

impl ExportSink for CsvExportSink<'_> {
    fn write(&mut self, record: &Value) -> Result<()> {
        let row = self
            .columns
            .iter()
            .map(|column| render_cell(get_path(record, column)));

        self.writer
            .write_record(row)
            .map_err(|e| Error::OperationFailed {
                operation: "write_csv".to_string(),
                cause: e.to_string(),
            })
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.writer.flush().map_err(|e| Error::OperationFailed {
            operation: "flush_csv".to_string(),
            cause: e.to_string(),
        })
    }
}
