//! Core traits for import/export operations.
//!
//! Format codecs implement [`ImportSource`] and [`ExportSink`]; export
//! delivery targets implement [`ExportDestination`].

use crate::Result;
use serde_json::Value;

/// Source of raw import records.
///
/// Records are yielded as JSON values in their source shape. Native and CSV
/// records are already canonical; provider records still need an adapter.
pub trait ImportSource {
    /// Reads the next record from the source.
    ///
    /// Returns `Ok(None)` when the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    fn next(&mut self) -> Result<Option<Value>>;

    /// Returns an estimate of the total number of records.
    ///
    /// Used for progress reporting. Returns `None` if unknown.
    fn size_hint(&self) -> Option<usize> {
        None
    }
}

/// Sink for exported prompt records.
///
/// # Lifecycle
///
/// 1. Create the sink over a writer (headers are written immediately)
/// 2. Call `write()` for each record
/// 3. Call `finish()` to write footers and flush
pub trait ExportSink {
    /// Writes a single record to the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or I/O fails.
    fn write(&mut self, record: &Value) -> Result<()>;

    /// Finalizes the export, writing any footers and flushing buffers.
    ///
    /// This method consumes the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if I/O fails.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Receives finished export artifacts.
///
/// Delivery is the step of an export that may fail transiently; return
/// [`crate::Error::Transient`] to have the export service retry with backoff.
pub trait ExportDestination: Send + Sync {
    /// Delivers one artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact could not be delivered.
    fn deliver(&self, name: &str, bytes: &[u8], checksum: &str) -> Result<()>;
}
