//! Import/Export I/O subsystem.
//!
//! Moves prompt collections in and out of a [`PromptStore`](crate::storage::PromptStore)
//! in native JSON packages, CSV, XML and third-party provider shapes.
//!
//! # Architecture
//!
//! The I/O subsystem uses a trait-based architecture:
//!
//! - **Format codecs** implement [`ImportSource`] and [`ExportSink`]
//! - **Provider adapters** turn foreign records into canonical prompts
//! - **Validation layer** produces an [`IntegrityReport`] per payload
//! - **Conflict resolution** decides what happens to colliding ids
//! - **Services** orchestrate codecs, transforms, validation and storage
//!
//! # Supported Formats
//!
//! | Format | Import | Export | Notes |
//! |--------|--------|--------|-------|
//! | JSON | ✓ | ✓ | Native package, array, single record or NDJSON |
//! | CSV | ✓ | ✓ | Dotted column paths, `;`-joined tags |
//! | XML | - | ✓ | One `<prompt>` element per record |
//! | OpenAI / Anthropic / HuggingFace | ✓ | - | Converted by provider adapters |
//!
//! Any export may be gzip-compressed and encrypted; imports detect both.
//!
//! # Examples
//!
//! ## Export prompts to CSV
//!
//! ```rust,ignore
//! use promptport::io::{ExportFormat, ExportJob, ExportService};
//!
//! let job = ExportJob::new("Catalog", ExportFormat::Csv, prompts);
//! let result = ExportService::new().execute_export(&job).await;
//! println!("checksum {}", result.data.unwrap().checksum().unwrap_or_default());
//! ```
//!
//! ## Import an OpenAI payload
//!
//! ```rust,ignore
//! use promptport::io::{ImportJob, ImportService, ImportSourceFormat, SourcePayload};
//!
//! let job = ImportJob::new(ImportSourceFormat::OpenAi, SourcePayload::new(bytes));
//! let result = ImportService::new().execute_import(&job, &store).await;
//! println!("Imported {} prompts", result.imported_count);
//! ```

pub mod adapters;
pub mod conflict;
pub mod destination;
pub mod fields;
pub mod formats;
pub mod package;
pub mod persist;
pub mod services;
pub mod traits;
pub mod transform;
pub mod validation;

// Re-exports for convenience
pub use conflict::{
    Candidate, ConflictPolicy, ConflictRecord, ConflictResolution, ConflictResolver, ConflictRule,
    ConflictStrategy,
};
pub use destination::{DirectoryDestination, MemoryDestination};
pub use formats::{ExportFormat, ImportSourceFormat};
pub use package::ExportPackage;
pub use persist::{PersistOptions, RecordError, persist_batch};
pub use services::{
    ErrorInfo, ExportData, ExportJob, ExportOptions, ExportResult, ExportService, ImportJob,
    ImportOptions, ImportProgress, ImportResult, ImportService,
};
pub use traits::{ExportDestination, ExportSink, ImportSource};
pub use transform::{Compression, EncryptionOptions};
pub use validation::{IntegrityReport, IntegrityValidator, Severity, SourcePayload};
