//! Prompt export service.
//!
//! Serializes a prompt collection to one or more formats, applies the
//! requested transforms and checksums the bytes a consumer will receive.
//!
//! # Attempts
//!
//! Each attempt renders every artifact and, when a destination is set,
//! delivers them. Retryable failures ([`Error::is_retryable`]) are retried
//! up to `retry_attempts` times with exponential backoff; anything else
//! ends the export at once.

use super::ErrorInfo;
use crate::io::fields::{exclude_fields, export_columns, select_fields, strip_detailed_metadata};
use crate::io::formats::json::encode_package;
use crate::io::formats::{ExportFormat, ExportHeader, create_export_sink};
use crate::io::package::{
    Compatibility, ExportPackage, PACKAGE_FORMAT_VERSION, PackageMetadata, distinct_categories,
    validate_record,
};
use crate::io::traits::ExportDestination;
use crate::io::transform::{
    Compression, DEFAULT_COMPRESSION_LEVEL, EncryptionInfo, EncryptionOptions, HashingWriter,
    MemoryReclaimer, compression, encrypt, gzip, gzip_writer, sha256_hex,
};
use crate::models::Prompt;
use crate::{Error, Result, current_rfc3339};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Default records per streaming chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Longest backoff exponent applied to the retry delay.
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Options for an export job.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Dotted paths to keep; empty keeps everything (CSV: default columns).
    pub fields: Vec<String>,
    /// Dotted paths to drop.
    pub exclude_fields: Vec<String>,
    /// Keep descriptive metadata; when off only title and category remain.
    pub include_metadata: bool,
    /// Keep usage tracking.
    pub include_usage: bool,
    /// Formats rendered by a `multiple` export; empty means all.
    pub formats: Vec<ExportFormat>,
    /// Attach a manifest to `multiple` exports.
    pub include_manifest: bool,
    /// Payload compression.
    pub compression: Compression,
    /// Gzip level, 1 to 9.
    pub compression_level: u32,
    /// Payload encryption.
    pub encryption: Option<EncryptionOptions>,
    /// Stream records chunk by chunk instead of materializing the payload.
    pub streaming: bool,
    /// Records per chunk.
    pub chunk_size: usize,
    /// Release scratch buffers between chunks.
    pub memory_optimization: bool,
    /// Scratch capacity kept between chunks.
    pub memory_limit_bytes: Option<usize>,
    /// Largest artifact a materialized export may produce.
    pub max_file_size: Option<u64>,
    /// Re-run in streaming mode when `max_file_size` is exceeded.
    pub fallback_to_streaming: bool,
    /// Time budget for one attempt.
    pub timeout: Option<Duration>,
    /// Retries after the first attempt.
    pub retry_attempts: u32,
    /// Delay before the first retry; doubled for each further one.
    pub retry_delay: Duration,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            exclude_fields: Vec::new(),
            include_metadata: true,
            include_usage: true,
            formats: Vec::new(),
            include_manifest: true,
            compression: Compression::None,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            encryption: None,
            streaming: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            memory_optimization: false,
            memory_limit_bytes: None,
            max_file_size: None,
            fallback_to_streaming: true,
            timeout: None,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl ExportOptions {
    /// Keeps only `fields`.
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    /// Drops `fields`.
    #[must_use]
    pub fn with_excluded_fields(mut self, fields: Vec<String>) -> Self {
        self.exclude_fields = fields;
        self
    }

    /// Enables gzip at `level`.
    #[must_use]
    pub const fn with_gzip(mut self, level: u32) -> Self {
        self.compression = Compression::Gzip;
        self.compression_level = level;
        self
    }

    /// Enables encryption.
    #[must_use]
    pub fn with_encryption(mut self, encryption: EncryptionOptions) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Enables streaming.
    #[must_use]
    pub const fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Sets the size limit for materialized artifacts.
    #[must_use]
    pub const fn with_max_file_size(mut self, limit: u64) -> Self {
        self.max_file_size = Some(limit);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    /// Sets the per-attempt time budget.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.compression == Compression::Gzip {
            compression::validate_level(self.compression_level)?;
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidInput("chunk_size must be at least 1".to_string()));
        }
        if self.formats.contains(&ExportFormat::Multiple) {
            return Err(Error::InvalidInput(
                "formats may only list json, csv and xml".to_string(),
            ));
        }
        Ok(())
    }
}

/// A request to export prompts.
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Job id, reused as the export id.
    pub id: String,
    /// Export title.
    pub title: String,
    /// Target format.
    pub format: ExportFormat,
    /// Prompts to export.
    pub prompts: Vec<Prompt>,
    /// Options.
    pub options: ExportOptions,
    /// Requester identity.
    pub requested_by: String,
    /// RFC 3339 request time.
    pub requested_at: String,
}

impl ExportJob {
    /// Creates a job with default options.
    #[must_use]
    pub fn new(title: impl Into<String>, format: ExportFormat, prompts: Vec<Prompt>) -> Self {
        Self {
            id: format!("export-{}", uuid::Uuid::now_v7().simple()),
            title: title.into(),
            format,
            prompts,
            options: ExportOptions::default(),
            requested_by: "system".to_string(),
            requested_at: current_rfc3339(),
        }
    }

    /// Sets the options.
    #[must_use]
    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the requester.
    #[must_use]
    pub fn with_requested_by(mut self, requested_by: impl Into<String>) -> Self {
        self.requested_by = requested_by.into();
        self
    }

    fn target_formats(&self) -> Vec<ExportFormat> {
        match self.format {
            ExportFormat::Multiple if self.options.formats.is_empty() => {
                ExportFormat::single_formats().to_vec()
            },
            ExportFormat::Multiple => self.options.formats.clone(),
            single => vec![single],
        }
    }
}

/// One rendered artifact.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportArtifact {
    /// Artifact name, e.g. `export.csv`.
    pub name: String,
    /// Format.
    pub format: ExportFormat,
    /// Final bytes, after compression and encryption.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// SHA-256 over `bytes`.
    pub checksum: String,
    /// Length of `bytes`.
    pub file_size: u64,
    /// Serialized size before compression and encryption.
    pub uncompressed_size: u64,
    /// `uncompressed_size / file_size`.
    pub compression_ratio: f64,
    /// MIME type of the serialized content.
    pub mime_type: String,
    /// Compression applied.
    pub compression: Compression,
    /// Encryption applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionInfo>,
}

/// Manifest entry for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Artifact name.
    pub name: String,
    /// Format.
    pub format: ExportFormat,
    /// Artifact size.
    pub size: u64,
    /// Artifact checksum.
    pub checksum: String,
}

/// Summary of a `multiple` export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportManifest {
    /// Export id.
    pub export_id: String,
    /// Export title.
    pub title: String,
    /// Rendered formats.
    pub formats: Vec<ExportFormat>,
    /// Sum of artifact sizes.
    pub total_size: u64,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// Artifacts.
    pub files: Vec<ManifestEntry>,
}

/// Payload of a successful export.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    /// Rendered artifacts in format order.
    pub artifacts: Vec<ExportArtifact>,
    /// Structured package, for materialized JSON exports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_package: Option<ExportPackage>,
    /// Manifest, for `multiple` exports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<ExportManifest>,
    /// The size limit forced a streaming re-run.
    pub fallback_used: bool,
    /// Artifacts were produced in streaming mode.
    pub stream_processed: bool,
    /// Reclaim cycles run.
    pub memory_reclaims: usize,
}

impl ExportData {
    /// The first artifact.
    #[must_use]
    pub fn primary(&self) -> Option<&ExportArtifact> {
        self.artifacts.first()
    }

    /// Checksum of the first artifact.
    #[must_use]
    pub fn checksum(&self) -> Option<&str> {
        self.primary().map(|a| a.checksum.as_str())
    }

    /// Size of the first artifact.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.primary().map_or(0, |a| a.file_size)
    }

    /// Artifact by name.
    #[must_use]
    pub fn artifact(&self, name: &str) -> Option<&ExportArtifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }
}

/// Result envelope of an export.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    /// Job id.
    pub job_id: String,
    /// Whether the export completed.
    pub success: bool,
    /// Payload, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ExportData>,
    /// Wall-clock time across all attempts.
    pub processing_time_ms: u64,
    /// Attempts beyond the first.
    pub retry_count: u32,
    /// Failure, when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Exports prompt collections.
#[derive(Clone, Default)]
pub struct ExportService {
    destination: Option<Arc<dyn ExportDestination>>,
}

impl ExportService {
    /// Creates a service that only renders.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers every rendered artifact to `destination`.
    #[must_use]
    pub fn with_destination(mut self, destination: Arc<dyn ExportDestination>) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Runs an export job.
    ///
    /// Never fails: errors are reported in the returned envelope.
    #[instrument(skip(self, job), fields(job_id = %job.id, format = %job.format, prompts = job.prompts.len()))]
    pub async fn execute_export(&self, job: &ExportJob) -> ExportResult {
        let started = Instant::now();
        let mut retries = 0u32;

        let outcome = loop {
            match self.attempt(job).await {
                Ok(data) => break Ok(data),
                Err(e) if e.is_retryable() && retries < job.options.retry_attempts => {
                    retries += 1;
                    let delay = backoff_delay(job.options.retry_delay, retries);
                    tracing::warn!(
                        attempt = retries,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Export attempt failed, retrying"
                    );
                    metrics::counter!("promptport_export_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                },
                Err(e) => break Err(e),
            }
        };

        let processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let status = if outcome.is_ok() { "success" } else { "failure" };
        metrics::counter!(
            "promptport_exports_total",
            "format" => job.format.as_str(),
            "status" => status
        )
        .increment(1);
        #[allow(clippy::cast_precision_loss)]
        metrics::histogram!("promptport_export_duration_ms").record(processing_time_ms as f64);

        match outcome {
            Ok(data) => {
                tracing::info!(
                    artifacts = data.artifacts.len(),
                    fallback_used = data.fallback_used,
                    retries,
                    processing_time_ms,
                    "Export completed"
                );
                ExportResult {
                    job_id: job.id.clone(),
                    success: true,
                    data: Some(data),
                    processing_time_ms,
                    retry_count: retries,
                    error: None,
                }
            },
            Err(e) => {
                tracing::error!(error = %e, retries, "Export failed");
                ExportResult {
                    job_id: job.id.clone(),
                    success: false,
                    data: None,
                    processing_time_ms,
                    retry_count: retries,
                    error: Some(ErrorInfo::from(&e)),
                }
            },
        }
    }

    /// One attempt: render, then deliver within the remaining time budget.
    async fn attempt(&self, job: &ExportJob) -> Result<ExportData> {
        let started = Instant::now();
        let data = render(job)?;

        let remaining = match job.options.timeout {
            Some(limit) => Some(
                limit
                    .checked_sub(started.elapsed())
                    .ok_or_else(|| timeout_error(started))?,
            ),
            None => None,
        };

        let Some(destination) = self.destination.clone() else {
            return Ok(data);
        };

        let delivery = tokio::task::spawn_blocking(move || {
            for artifact in &data.artifacts {
                destination.deliver(&artifact.name, &artifact.bytes, &artifact.checksum)?;
            }
            Ok::<_, Error>(data)
        });

        let joined = match remaining {
            Some(budget) => tokio::time::timeout(budget, delivery)
                .await
                .map_err(|_| timeout_error(started))?,
            None => delivery.await,
        };
        joined.map_err(|e| Error::OperationFailed {
            operation: "deliver_export".to_string(),
            cause: e.to_string(),
        })?
    }
}

fn timeout_error(started: Instant) -> Error {
    Error::Timeout {
        operation: "export_attempt".to_string(),
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}

/// Delay before retry `n` (1-based): `base * 2^(n-1)`.
fn backoff_delay(base: Duration, retry: u32) -> Duration {
    let shift = retry.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    base.saturating_mul(1u32 << shift)
}

/// Renders every artifact of `job`, falling back to streaming when a
/// materialized artifact is over the size limit.
fn render(job: &ExportJob) -> Result<ExportData> {
    let options = &job.options;
    options.validate()?;

    let mut reclaimer = options
        .memory_optimization
        .then(|| MemoryReclaimer::new(options.memory_limit_bytes));
    let context = RenderContext::new(job);

    let mut streaming = options.streaming;
    let mut fallback_used = false;
    let (artifacts, export_package) = loop {
        let mut artifacts = Vec::new();
        let mut export_package = None;
        for format in job.target_formats() {
            let (artifact, package) = if streaming {
                (context.stream(format, reclaimer.as_mut())?, None)
            } else {
                context.materialize(format, reclaimer.as_mut())?
            };
            if export_package.is_none() {
                export_package = package;
            }
            artifacts.push(artifact);
        }

        let oversized = options.max_file_size.filter(|_| !streaming).and_then(|limit| {
            artifacts
                .iter()
                .find(|a| a.file_size > limit)
                .map(|a| (a.file_size, limit))
        });
        match oversized {
            Some((size, limit)) if options.fallback_to_streaming => {
                tracing::info!(size, limit, "Export exceeds size limit, switching to streaming");
                streaming = true;
                fallback_used = true;
            },
            Some((size, limit)) => return Err(Error::FileTooLarge { size, limit }),
            None => break (artifacts, export_package),
        }
    };

    let manifest = (job.format == ExportFormat::Multiple && options.include_manifest).then(|| {
        ExportManifest {
            export_id: job.id.clone(),
            title: job.title.clone(),
            formats: artifacts.iter().map(|a| a.format).collect(),
            total_size: artifacts.iter().map(|a| a.file_size).sum(),
            created_at: context.header.exported_at.clone(),
            files: artifacts
                .iter()
                .map(|a| ManifestEntry {
                    name: a.name.clone(),
                    format: a.format,
                    size: a.file_size,
                    checksum: a.checksum.clone(),
                })
                .collect(),
        }
    });

    Ok(ExportData {
        artifacts,
        export_package,
        manifest,
        fallback_used,
        stream_processed: streaming,
        memory_reclaims: reclaimer.map_or(0, |r| r.cycles()),
    })
}

struct RenderContext<'a> {
    job: &'a ExportJob,
    header: ExportHeader,
    columns: Vec<String>,
}

impl<'a> RenderContext<'a> {
    fn new(job: &'a ExportJob) -> Self {
        let options = &job.options;
        Self {
            job,
            header: ExportHeader {
                export_id: job.id.clone(),
                title: job.title.clone(),
                exported_by: job.requested_by.clone(),
                exported_at: current_rfc3339(),
                total_prompts: job.prompts.len(),
                categories: distinct_categories(&job.prompts),
                compatibility: Compatibility::for_prompts(&job.prompts),
            },
            columns: export_columns(&options.fields, &options.exclude_fields, options.include_usage),
        }
    }

    /// Whether records keep every field the prompt schema requires.
    fn keeps_full_records(&self) -> bool {
        let options = &self.job.options;
        options.fields.is_empty() && options.exclude_fields.is_empty()
    }

    /// Applies metadata, usage and field selection options to one prompt.
    fn prepare(&self, prompt: &Prompt) -> Result<Value> {
        let options = &self.job.options;
        let mut record = serde_json::to_value(prompt).map_err(|e| Error::OperationFailed {
            operation: "serialize_prompt".to_string(),
            cause: e.to_string(),
        })?;
        if !options.include_metadata {
            strip_detailed_metadata(&mut record);
        }
        if !options.include_usage
            && let Some(map) = record.as_object_mut()
        {
            map.remove("usage");
        }
        if !options.fields.is_empty() {
            record = select_fields(&record, &options.fields);
        }
        exclude_fields(&mut record, &options.exclude_fields);
        Ok(record)
    }

    fn materialize(
        &self,
        format: ExportFormat,
        reclaimer: Option<&mut MemoryReclaimer>,
    ) -> Result<(ExportArtifact, Option<ExportPackage>)> {
        if format == ExportFormat::Json {
            let package = self.package()?;
            package.validate()?;
            if self.keeps_full_records() {
                package.validate_prompts()?;
            }
            let serialized = encode_package(&package)?;
            return Ok((self.finish_artifact(format, serialized)?, Some(package)));
        }

        let mut serialized = Vec::new();
        self.write_records(&mut serialized, format, reclaimer)?;
        Ok((self.finish_artifact(format, serialized)?, None))
    }

    fn package(&self) -> Result<ExportPackage> {
        let prompts = self
            .job
            .prompts
            .iter()
            .map(|p| self.prepare(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(ExportPackage {
            export_id: self.header.export_id.clone(),
            version: PACKAGE_FORMAT_VERSION.to_string(),
            metadata: PackageMetadata {
                title: self.header.title.clone(),
                exported_by: self.header.exported_by.clone(),
                exported_at: self.header.exported_at.clone(),
                total_prompts: prompts.len(),
                categories: self.header.categories.clone(),
            },
            prompts,
            compatibility: self.header.compatibility.clone(),
        })
    }

    /// Compresses and encrypts serialized bytes, then checksums the result.
    fn finish_artifact(&self, format: ExportFormat, serialized: Vec<u8>) -> Result<ExportArtifact> {
        let options = &self.job.options;
        let uncompressed_size = serialized.len() as u64;
        let compressed = match options.compression {
            Compression::None => serialized,
            Compression::Gzip => gzip(&serialized, options.compression_level)?,
        };
        let (bytes, encryption) = match &options.encryption {
            Some(encryption) => {
                let (encrypted, info) = encrypt(&compressed, encryption)?;
                (encrypted, Some(info))
            },
            None => (compressed, None),
        };
        let checksum = sha256_hex(&bytes);
        Ok(self.artifact(format, bytes, checksum, uncompressed_size, encryption))
    }

    /// Streams records chunk by chunk through the compressor into a
    /// hashing writer.
    fn stream(
        &self,
        format: ExportFormat,
        reclaimer: Option<&mut MemoryReclaimer>,
    ) -> Result<ExportArtifact> {
        let options = &self.job.options;
        let hashing = HashingWriter::new(Vec::new());

        let (bytes, digest, uncompressed_size) = match options.compression {
            Compression::None => {
                let mut counting = CountingWriter::new(hashing);
                self.write_records(&mut counting, format, reclaimer)?;
                let (hashing, count) = counting.into_inner();
                let (bytes, digest, _) = hashing.finish();
                (bytes, digest, count)
            },
            Compression::Gzip => {
                let mut counting =
                    CountingWriter::new(gzip_writer(hashing, options.compression_level)?);
                self.write_records(&mut counting, format, reclaimer)?;
                let (encoder, count) = counting.into_inner();
                let (bytes, digest, _) = encoder.finish()?.finish();
                (bytes, digest, count)
            },
        };

        let (bytes, checksum, encryption) = match &options.encryption {
            Some(encryption) => {
                let (encrypted, info) = encrypt(&bytes, encryption)?;
                let checksum = sha256_hex(&encrypted);
                (encrypted, checksum, Some(info))
            },
            None => (bytes, digest, None),
        };
        Ok(self.artifact(format, bytes, checksum, uncompressed_size, encryption))
    }

    fn write_records(
        &self,
        writer: &mut dyn Write,
        format: ExportFormat,
        mut reclaimer: Option<&mut MemoryReclaimer>,
    ) -> Result<()> {
        let mut sink = create_export_sink(writer, format, &self.header, &self.columns)?;
        let check_schema = format == ExportFormat::Json && self.keeps_full_records();
        let chunk_size = self.job.options.chunk_size;
        let mut chunk = Vec::with_capacity(chunk_size);
        for (chunk_index, prompts) in self.job.prompts.chunks(chunk_size).enumerate() {
            for (offset, prompt) in prompts.iter().enumerate() {
                let record = self.prepare(prompt)?;
                if check_schema {
                    validate_record(chunk_index * chunk_size + offset, &record)?;
                }
                chunk.push(record);
            }
            for record in &chunk {
                sink.write(record)?;
            }
            match reclaimer.as_deref_mut() {
                Some(reclaimer) => reclaimer.reclaim(&mut chunk),
                None => chunk.clear(),
            }
        }
        sink.finish()
    }

    fn artifact(
        &self,
        format: ExportFormat,
        bytes: Vec<u8>,
        checksum: String,
        uncompressed_size: u64,
        encryption: Option<EncryptionInfo>,
    ) -> ExportArtifact {
        let file_size = bytes.len() as u64;
        #[allow(clippy::cast_precision_loss)]
        let compression_ratio = if file_size == 0 {
            1.0
        } else {
            uncompressed_size as f64 / file_size as f64
        };
        ExportArtifact {
            name: format.artifact_name(),
            format,
            bytes,
            checksum,
            file_size,
            uncompressed_size,
            compression_ratio,
            mime_type: format.mime_type().to_string(),
            compression: self.job.options.compression,
            encryption,
        }
    }
}

/// Counts bytes written to the inner writer.
struct CountingWriter<W: Write> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    const fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    fn into_inner(self) -> (W, u64) {
        (self.inner, self.count)
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::destination::MemoryDestination;
    use crate::io::transform::gunzip;
    use crate::models::{Category, UsageInfo};
    use std::sync::atomic::{AtomicU32, Ordering};
    use test_case::test_case;

    fn prompts(n: usize) -> Vec<Prompt> {
        (0..n)
            .map(|i| {
                Prompt::new(format!("p{i}"), "proj", format!("Shot {i}"), Category::Cinematic)
                    .with_description("Slow dolly through fog")
                    .with_tag("fog")
                    .with_usage(UsageInfo {
                        created_by: "alice".to_string(),
                        created_at: "2026-01-01T00:00:00Z".to_string(),
                        usage_count: 3,
                    })
            })
            .collect()
    }

    fn fast_retry(options: ExportOptions) -> ExportOptions {
        options.with_retry(3, Duration::from_millis(1))
    }

    /// Fails with a transient error for the first `failures` deliveries.
    struct FlakyDestination {
        failures: u32,
        calls: AtomicU32,
        inner: MemoryDestination,
    }

    impl ExportDestination for FlakyDestination {
        fn deliver(&self, name: &str, bytes: &[u8], checksum: &str) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(Error::Transient {
                    operation: "deliver".to_string(),
                    cause: "connection reset".to_string(),
                });
            }
            self.inner.deliver(name, bytes, checksum)
        }
    }

    #[tokio::test]
    async fn test_json_export_defaults() {
        let job = ExportJob::new("Two prompts", ExportFormat::Json, prompts(2));
        let result = ExportService::new().execute_export(&job).await;

        assert!(result.success);
        assert_eq!(result.retry_count, 0);
        let data = result.data.unwrap();
        assert_eq!(data.export_package.as_ref().unwrap().prompts.len(), 2);
        assert!(data.file_size() > 0);
        let checksum = data.checksum().unwrap();
        assert_eq!(checksum.len(), 64);
        assert!(checksum.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(checksum, sha256_hex(&data.primary().unwrap().bytes));
    }

    #[tokio::test]
    async fn test_invalid_package_is_hard_failure() {
        let job = ExportJob::new("  ", ExportFormat::Json, prompts(1));
        let result = ExportService::new().execute_export(&job).await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().code, "invalid_package");
        assert_eq!(result.retry_count, 0);
    }

    #[test_case(false ; "materialized")]
    #[test_case(true ; "streamed")]
    fn test_schema_invalid_prompt_fails_package(streaming: bool) {
        let mut bad = prompts(2);
        bad[1].id = "bad id!".to_string();
        let job = ExportJob::new("Broken", ExportFormat::Json, bad)
            .with_options(ExportOptions::default().with_streaming(streaming));

        let result = tokio_test::block_on(ExportService::new().execute_export(&job));

        assert!(!result.success);
        assert_eq!(result.error.unwrap().code, "invalid_package");
    }

    #[tokio::test]
    async fn test_field_selection_skips_schema_check() {
        let mut bad = prompts(1);
        bad[0].version = "1.0".to_string();
        let job = ExportJob::new("Slim", ExportFormat::Json, bad)
            .with_options(ExportOptions::default().with_fields(vec!["version".to_string()]));
        assert!(ExportService::new().execute_export(&job).await.success);
    }

    #[tokio::test]
    async fn test_gzip_checksum_covers_compressed_bytes() {
        let job = ExportJob::new("Packed", ExportFormat::Csv, prompts(50))
            .with_options(ExportOptions::default().with_gzip(9));
        let data = ExportService::new().execute_export(&job).await.data.unwrap();
        let artifact = data.primary().unwrap();

        assert_eq!(artifact.checksum, sha256_hex(&artifact.bytes));
        assert!(artifact.compression_ratio > 1.0);
        let csv = String::from_utf8(gunzip(&artifact.bytes).unwrap()).unwrap();
        assert!(csv.starts_with("id,projectId,version,metadata.title"));
        assert_eq!(csv.lines().count(), 51);
    }

    #[tokio::test]
    async fn test_bad_compression_level_fails() {
        let job = ExportJob::new("Bad", ExportFormat::Json, prompts(1))
            .with_options(ExportOptions::default().with_gzip(12));
        let result = ExportService::new().execute_export(&job).await;
        assert_eq!(result.error.unwrap().code, "invalid_input");
    }

    #[tokio::test]
    async fn test_field_selection_and_usage() {
        let options = ExportOptions {
            include_usage: false,
            ..ExportOptions::default().with_fields(vec!["metadata.title".to_string()])
        };
        let job = ExportJob::new("Slim", ExportFormat::Json, prompts(1)).with_options(options);
        let data = ExportService::new().execute_export(&job).await.data.unwrap();
        let record = &data.export_package.unwrap().prompts[0];
        assert_eq!(record, &serde_json::json!({"id": "p0", "metadata": {"title": "Shot 0"}}));
    }

    #[tokio::test]
    async fn test_multiple_with_manifest() {
        let job = ExportJob::new("All", ExportFormat::Multiple, prompts(3));
        let data = ExportService::new().execute_export(&job).await.data.unwrap();

        let names: Vec<_> = data.artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["export.json", "export.csv", "export.xml"]);
        let manifest = data.manifest.unwrap();
        assert_eq!(manifest.formats.len(), 3);
        assert_eq!(
            manifest.total_size,
            data.artifacts.iter().map(|a| a.file_size).sum::<u64>()
        );
    }

    #[tokio::test]
    async fn test_multiple_subset() {
        let options = ExportOptions {
            formats: vec![ExportFormat::Xml],
            include_manifest: false,
            ..ExportOptions::default()
        };
        let job = ExportJob::new("Xml only", ExportFormat::Multiple, prompts(1)).with_options(options);
        let data = ExportService::new().execute_export(&job).await.data.unwrap();
        assert_eq!(data.artifacts.len(), 1);
        assert!(data.artifact("export.xml").is_some());
        assert!(data.manifest.is_none());
    }

    #[tokio::test]
    async fn test_size_fallback_switches_to_streaming() {
        let options = ExportOptions {
            memory_optimization: true,
            chunk_size: 10,
            ..ExportOptions::default().with_max_file_size(256)
        };
        let job = ExportJob::new("Big", ExportFormat::Json, prompts(40)).with_options(options);
        let data = ExportService::new().execute_export(&job).await.data.unwrap();

        assert!(data.fallback_used);
        assert!(data.stream_processed);
        assert!(data.export_package.is_none());
        assert_eq!(data.memory_reclaims, 4);
        let artifact = data.primary().unwrap();
        assert_eq!(artifact.checksum, sha256_hex(&artifact.bytes));
        let parsed: Value = serde_json::from_slice(&artifact.bytes).unwrap();
        assert_eq!(parsed["prompts"].as_array().unwrap().len(), 40);
    }

    #[tokio::test]
    async fn test_size_limit_without_fallback() {
        let options = ExportOptions {
            fallback_to_streaming: false,
            ..ExportOptions::default().with_max_file_size(16)
        };
        let job = ExportJob::new("Big", ExportFormat::Xml, prompts(5)).with_options(options);
        let result = ExportService::new().execute_export(&job).await;
        assert_eq!(result.error.unwrap().code, "file_too_large");
    }

    #[tokio::test]
    async fn test_streaming_gzip_counts_uncompressed_bytes() {
        let base = ExportOptions::default().with_gzip(6);
        let streamed = ExportJob::new("S", ExportFormat::Csv, prompts(25))
            .with_options(base.with_streaming(true));
        let data = ExportService::new().execute_export(&streamed).await.data.unwrap();
        let artifact = data.primary().unwrap();

        assert!(data.stream_processed);
        assert_eq!(artifact.checksum, sha256_hex(&artifact.bytes));
        let csv = gunzip(&artifact.bytes).unwrap();
        assert_eq!(artifact.uncompressed_size, csv.len() as u64);
    }

    #[tokio::test]
    async fn test_transient_delivery_is_retried() {
        let destination = Arc::new(FlakyDestination {
            failures: 2,
            calls: AtomicU32::new(0),
            inner: MemoryDestination::new(),
        });
        let service = ExportService::new().with_destination(destination.clone());
        let job = ExportJob::new("Retry", ExportFormat::Json, prompts(1))
            .with_options(fast_retry(ExportOptions::default()));

        let result = service.execute_export(&job).await;

        assert!(result.success);
        assert_eq!(result.retry_count, 2);
        assert_eq!(destination.inner.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let destination = Arc::new(FlakyDestination {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
            inner: MemoryDestination::new(),
        });
        let service = ExportService::new().with_destination(destination.clone());
        let job = ExportJob::new("Retry", ExportFormat::Json, prompts(1))
            .with_options(fast_retry(ExportOptions::default()));

        let result = service.execute_export(&job).await;

        assert!(!result.success);
        assert_eq!(result.retry_count, 3);
        assert_eq!(destination.calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.error.unwrap().code, "transient_failure");
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(400));
    }

    #[cfg(feature = "encryption")]
    #[tokio::test]
    async fn test_encrypted_export_checksums_ciphertext() {
        use crate::io::transform::{decode_payload, is_encrypted};
        use secrecy::SecretString;

        let secret = SecretString::from("hunter2".to_string());
        let options = ExportOptions::default()
            .with_gzip(6)
            .with_encryption(EncryptionOptions::aes_256_gcm(secret.clone()));
        let job = ExportJob::new("Sealed", ExportFormat::Json, prompts(2)).with_options(options);
        let data = ExportService::new().execute_export(&job).await.data.unwrap();
        let artifact = data.primary().unwrap();

        assert!(is_encrypted(&artifact.bytes));
        assert_eq!(artifact.checksum, sha256_hex(&artifact.bytes));
        assert_eq!(artifact.encryption.as_ref().unwrap().iterations, 100_000);
        let plain: Value =
            serde_json::from_slice(&decode_payload(&artifact.bytes, Some(&secret)).unwrap()).unwrap();
        assert_eq!(plain["metadata"]["totalPrompts"], 2);
    }
}
