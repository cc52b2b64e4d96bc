//! Prompt import service.
//!
//! Validates a payload, resolves id collisions against the store and
//! persists the surviving prompts in ordered batches.
//!
//! # Stages
//!
//! | Stage | Aborts the job when |
//! |-------|---------------------|
//! | Examination | the payload does not parse, a `critical` finding exists, or strict mode sees any blocking finding |
//! | Conversion | never; unconvertible records become per-record errors |
//! | Conflict resolution | the store cannot be read |
//! | Persistence | cancelled, `max_errors` reached, or an error with partial import disabled |

use super::ErrorInfo;
use crate::io::adapters::AdapterOptions;
use crate::io::conflict::{
    Candidate, ConflictPolicy, ConflictRecord, ConflictResolver, ResolvedPrompt, WriteAction,
};
use crate::io::formats::ImportSourceFormat;
use crate::io::persist::{
    DEFAULT_MAX_CONCURRENCY, PersistOptions, PersistedRecord, RecordError, persist_batch,
};
use crate::io::validation::{
    CandidateRecord, IntegrityError, IntegrityReport, IntegrityValidator, PayloadBackup, Severity,
    SourcePayload,
};
use crate::models::Prompt;
use crate::storage::PromptStore;
use crate::{Error, current_rfc3339};
use secrecy::SecretString;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Default records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Called after every batch.
pub type ProgressCallback = Arc<dyn Fn(&ImportProgress) + Send + Sync>;

/// Options for an import job.
#[derive(Clone)]
pub struct ImportOptions {
    /// Run schema checks on every record.
    pub validate_integrity: bool,
    /// Refuse the whole payload when any record has a blocking finding.
    pub strict_validation: bool,
    /// Verify the declared checksum.
    pub validate_checksum: bool,
    /// Try to repair a payload whose checksum does not match.
    pub auto_repair: bool,
    /// Keep the original bytes whenever a repair is attempted.
    pub backup_original: bool,
    /// Keep importing past failed records.
    pub allow_partial_import: bool,
    /// Stop once this many records have failed.
    pub max_errors: Option<usize>,
    /// Keep incoming ids for new prompts.
    pub preserve_ids: bool,
    /// Source records per batch.
    pub batch_size: usize,
    /// Persist each batch concurrently.
    pub parallel_processing: bool,
    /// Concurrent writes in parallel mode.
    pub max_concurrency: usize,
    /// Run everything except the writes.
    pub dry_run: bool,
    /// Secret for encrypted payloads.
    pub decryption_secret: Option<SecretString>,
    /// Options for provider adapters.
    pub adapter: AdapterOptions,
    /// Progress hook.
    pub progress_callback: Option<ProgressCallback>,
    /// Checked between batches.
    pub cancellation: Option<CancellationToken>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            validate_integrity: true,
            strict_validation: false,
            validate_checksum: true,
            auto_repair: false,
            backup_original: false,
            allow_partial_import: true,
            max_errors: None,
            preserve_ids: true,
            batch_size: DEFAULT_BATCH_SIZE,
            parallel_processing: false,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            dry_run: false,
            decryption_secret: None,
            adapter: AdapterOptions::default(),
            progress_callback: None,
            cancellation: None,
        }
    }
}

impl std::fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportOptions")
            .field("validate_integrity", &self.validate_integrity)
            .field("strict_validation", &self.strict_validation)
            .field("validate_checksum", &self.validate_checksum)
            .field("auto_repair", &self.auto_repair)
            .field("allow_partial_import", &self.allow_partial_import)
            .field("max_errors", &self.max_errors)
            .field("preserve_ids", &self.preserve_ids)
            .field("batch_size", &self.batch_size)
            .field("parallel_processing", &self.parallel_processing)
            .field("dry_run", &self.dry_run)
            .field("has_progress_callback", &self.progress_callback.is_some())
            .finish_non_exhaustive()
    }
}

impl ImportOptions {
    /// Enables strict validation.
    #[must_use]
    pub const fn strict(mut self) -> Self {
        self.strict_validation = true;
        self
    }

    /// Enables dry-run.
    #[must_use]
    pub const fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Sets the batch size and parallel mode.
    #[must_use]
    pub const fn with_batching(mut self, batch_size: usize, parallel: bool) -> Self {
        self.batch_size = batch_size;
        self.parallel_processing = parallel;
        self
    }

    /// Sets the error threshold.
    #[must_use]
    pub const fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = Some(max_errors);
        self
    }

    /// Sets the progress hook.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ImportProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Sets the decryption secret.
    #[must_use]
    pub fn with_decryption_secret(mut self, secret: SecretString) -> Self {
        self.decryption_secret = Some(secret);
        self
    }

    const fn persist_options(&self) -> PersistOptions {
        PersistOptions {
            preserve_ids: self.preserve_ids,
            dry_run: self.dry_run,
            parallel: self.parallel_processing,
            max_concurrency: self.max_concurrency,
        }
    }
}

/// Snapshot passed to the progress hook.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    /// Source records handled so far.
    pub processed: usize,
    /// Source records in the payload.
    pub total: usize,
    /// `processed / total` in percent.
    pub percentage: f64,
    /// One-based batch number.
    pub current_batch: usize,
    /// Batches in the job.
    pub total_batches: usize,
    /// Failed records so far.
    pub errors: usize,
    /// Skipped records so far.
    pub skipped: usize,
    /// Written records so far.
    pub imported: usize,
}

/// A request to import prompts.
#[derive(Debug, Clone)]
pub struct ImportJob {
    /// Job id.
    pub id: String,
    /// Payload format.
    pub source_format: ImportSourceFormat,
    /// Payload as received.
    pub source: SourcePayload,
    /// Options.
    pub options: ImportOptions,
    /// Target path to source path overrides.
    pub field_mapping: BTreeMap<String, String>,
    /// Collision handling.
    pub conflict_resolution: ConflictPolicy,
    /// Requester identity.
    pub requested_by: String,
    /// RFC 3339 request time.
    pub requested_at: String,
}

impl ImportJob {
    /// Creates a job with default options.
    #[must_use]
    pub fn new(source_format: ImportSourceFormat, source: SourcePayload) -> Self {
        Self {
            id: format!("import-{}", uuid::Uuid::now_v7().simple()),
            source_format,
            source,
            options: ImportOptions::default(),
            field_mapping: BTreeMap::new(),
            conflict_resolution: ConflictPolicy::default(),
            requested_by: "system".to_string(),
            requested_at: current_rfc3339(),
        }
    }

    /// Sets the options.
    #[must_use]
    pub fn with_options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the conflict policy.
    #[must_use]
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_resolution = policy;
        self
    }

    /// Sets the field mapping.
    #[must_use]
    pub fn with_field_mapping(mut self, mapping: BTreeMap<String, String>) -> Self {
        self.field_mapping = mapping;
        self
    }

    /// Sets the requester.
    #[must_use]
    pub fn with_requested_by(mut self, requested_by: impl Into<String>) -> Self {
        self.requested_by = requested_by.into();
        self
    }

    fn validator(&self) -> IntegrityValidator {
        let options = &self.options;
        IntegrityValidator::new()
            .with_schema_checks(options.validate_integrity)
            .with_checksum_verification(options.validate_checksum)
            .with_auto_repair(options.auto_repair)
            .with_backup(options.backup_original)
            .with_decryption_secret(options.decryption_secret.clone())
            .with_field_mapping(self.field_mapping.clone())
            .with_adapter_options(options.adapter.clone())
    }
}

/// Result envelope of an import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    /// Job id.
    pub job_id: String,
    /// Whether the import completed, possibly with tolerated failures.
    pub success: bool,
    /// No writes were performed.
    pub dry_run: bool,
    /// The job was cancelled before all batches ran.
    pub cancelled: bool,
    /// Records in the payload.
    pub total_records: usize,
    /// Records written (or, in dry-run, that would be).
    pub imported_count: usize,
    /// Duplicates and `skip_existing` collisions.
    pub skipped_count: usize,
    /// Failed records.
    pub error_count: usize,
    /// Writes that replaced a stored prompt.
    pub overwritten_count: usize,
    /// Writes that merged into a stored prompt.
    pub merged_count: usize,
    /// Writes under a fresh id.
    pub renamed_count: usize,
    /// Ids written, in source order.
    pub imported_ids: Vec<String>,
    /// Collisions in source order.
    pub conflicts: Vec<ConflictRecord>,
    /// Per-record failures in source order.
    pub errors: Vec<RecordError>,
    /// Validation outcome.
    pub integrity_report: IntegrityReport,
    /// Original payload, when a repair was attempted with backup enabled.
    #[serde(skip)]
    pub backup: Option<PayloadBackup>,
    /// Wall-clock time.
    pub processing_time_ms: u64,
    /// Job-level failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ImportResult {
    fn empty(job: &ImportJob, integrity_report: IntegrityReport) -> Self {
        Self {
            job_id: job.id.clone(),
            success: false,
            dry_run: job.options.dry_run,
            cancelled: false,
            total_records: integrity_report.statistics.total,
            imported_count: 0,
            skipped_count: 0,
            error_count: 0,
            overwritten_count: 0,
            merged_count: 0,
            renamed_count: 0,
            imported_ids: Vec::new(),
            conflicts: Vec::new(),
            errors: Vec::new(),
            integrity_report,
            backup: None,
            processing_time_ms: 0,
            error: None,
        }
    }

    /// Succeeded with some records failing.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.integrity_report.partial_success == Some(true)
    }

    fn record_written(&mut self, record: PersistedRecord) {
        match record.action {
            WriteAction::Insert => {},
            WriteAction::Overwrite => self.overwritten_count += 1,
            WriteAction::Merge => self.merged_count += 1,
            WriteAction::Rename => self.renamed_count += 1,
        }
        self.imported_count += 1;
        self.imported_ids.push(record.id);
    }

    fn record_error(&mut self, error: RecordError) {
        self.error_count += 1;
        self.errors.push(error);
    }
}

/// What happens to one source record.
enum Disposition {
    Failed(RecordError),
    Skipped,
    Write(ResolvedPrompt),
}

/// Imports prompt payloads into a store.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportService;

impl ImportService {
    /// Creates the service.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a payload without importing it.
    #[must_use]
    pub fn validate(&self, job: &ImportJob) -> IntegrityReport {
        job.validator().validate(&job.source, job.source_format)
    }

    /// Runs an import job against `store`.
    ///
    /// Never fails: errors are reported in the returned envelope.
    #[instrument(skip(self, job, store), fields(job_id = %job.id, format = %job.source_format, dry_run = job.options.dry_run))]
    pub async fn execute_import<S>(&self, job: &ImportJob, store: &Arc<S>) -> ImportResult
    where
        S: PromptStore + ?Sized + 'static,
    {
        let started = Instant::now();
        let mut result = self.run(job, store).await;
        result.processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let status = match (result.success, result.is_partial()) {
            (true, false) => "success",
            (true, true) => "partial",
            (false, _) => "failure",
        };
        metrics::counter!(
            "promptport_imports_total",
            "format" => job.source_format.as_str(),
            "status" => status
        )
        .increment(1);
        for (outcome, count) in [
            ("imported", result.imported_count),
            ("skipped", result.skipped_count),
            ("failed", result.error_count),
        ] {
            metrics::counter!("promptport_import_records_total", "outcome" => outcome)
                .increment(count as u64);
        }

        tracing::info!(
            status,
            total = result.total_records,
            imported = result.imported_count,
            skipped = result.skipped_count,
            errors = result.error_count,
            cancelled = result.cancelled,
            processing_time_ms = result.processing_time_ms,
            "Import finished"
        );
        result
    }

    async fn run<S>(&self, job: &ImportJob, store: &Arc<S>) -> ImportResult
    where
        S: PromptStore + ?Sized + 'static,
    {
        let options = &job.options;
        let examination = job.validator().examine(&job.source, job.source_format);
        let mut result = ImportResult::empty(job, examination.report);
        result.backup = examination.backup;

        if !examination.parsed || result.integrity_report.has_critical() {
            let first = result
                .integrity_report
                .errors
                .iter()
                .find(|e| e.severity == Severity::Critical)
                .map_or_else(
                    || ErrorInfo::new("parse_error", "Payload could not be parsed"),
                    |e| ErrorInfo::new(e.code.clone(), e.message.clone()),
                );
            tracing::warn!(code = %first.code, "Import payload rejected");
            result.error = Some(first);
            return result;
        }

        let (mut dispositions, candidates) = plan(examination.records);

        if options.strict_validation && !result.integrity_report.valid {
            for disposition in dispositions.into_values() {
                if let Disposition::Failed(error) = disposition {
                    result.record_error(error);
                }
            }
            tracing::warn!(errors = result.error_count, "Strict validation refused the payload");
            result.error = Some(ErrorInfo::new(
                "integrity_validation_failed",
                format!(
                    "Strict validation refused the payload: {} record(s) failed",
                    result.error_count
                ),
            ));
            return result;
        }

        let _guard = match store
            .identity_locks()
            .acquire(candidates.iter().map(|c| c.prompt.id.clone()))
            .await
        {
            Ok(guard) => guard,
            Err(e) => return internal_failure(result, &e),
        };

        let resolution = match ConflictResolver::new(job.conflict_resolution.clone())
            .resolve(candidates, store.as_ref())
        {
            Ok(resolution) => resolution,
            Err(e) => return internal_failure(result, &e),
        };
        for index in resolution.skipped {
            dispositions.insert(index, Disposition::Skipped);
        }
        for item in resolution.resolved {
            dispositions.insert(item.index, Disposition::Write(item));
        }
        let mut conflicts = resolution.conflicts;

        let processed = persist_in_batches(job, store, dispositions, &mut result).await;

        conflicts.retain(|c| c.index < processed);
        for conflict in &conflicts {
            let resolution = conflict.resolution.as_str();
            metrics::counter!("promptport_conflicts_total", "resolution" => resolution).increment(1);
        }
        result.conflicts = conflicts;
        result.success = !result.cancelled
            && (result.error_count == 0
                || (options.allow_partial_import && result.imported_count > 0));
        if result.success && result.error_count > 0 {
            result.integrity_report.partial_success = Some(true);
        }
        if !result.success && result.error.is_none() {
            result.error = Some(if result.cancelled {
                ErrorInfo::from(&Error::Cancelled)
            } else {
                ErrorInfo::new(
                    "import_failed",
                    format!("{} of {} records failed", result.error_count, result.total_records),
                )
            });
        }
        result
    }
}

/// Sorts every examined record into failed or skipped dispositions and
/// candidates for conflict resolution.
fn plan(records: Vec<CandidateRecord>) -> (BTreeMap<usize, Disposition>, Vec<Candidate>) {
    let mut dispositions = BTreeMap::new();
    let mut candidates = Vec::new();
    for record in records {
        let index = record.index;
        let id = record.id().map(String::from);
        let failure = if let Some(error) = record.errors.iter().find(|e| e.severity.is_blocking()) {
            error.clone()
        } else if record.duplicate_of.is_some() {
            dispositions.insert(index, Disposition::Skipped);
            continue;
        } else {
            match record.value {
                Some(value) => match serde_json::from_value::<Prompt>(value.clone()) {
                    Ok(prompt) => {
                        candidates.push(Candidate::from_record(index, prompt, value));
                        continue;
                    },
                    Err(e) => IntegrityError::new(
                        "data_type_violation",
                        format!("Record does not match the prompt schema: {e}"),
                        Severity::High,
                    ),
                },
                None => IntegrityError::new(
                    "normalization_failed",
                    "Record could not be normalized",
                    Severity::High,
                ),
            }
        };
        let error = RecordError::from_integrity(index, id, failure);
        dispositions.insert(index, Disposition::Failed(error));
    }
    (dispositions, candidates)
}

/// Runs the batches in source order and returns how many source records
/// were handled.
async fn persist_in_batches<S>(
    job: &ImportJob,
    store: &Arc<S>,
    dispositions: BTreeMap<usize, Disposition>,
    result: &mut ImportResult,
) -> usize
where
    S: PromptStore + ?Sized + 'static,
{
    let options = &job.options;
    let total = result.total_records;
    let batch_size = options.batch_size.max(1);
    let total_batches = total.div_ceil(batch_size);
    let persist_options = options.persist_options();

    let mut pending = dispositions.into_iter().peekable();
    let mut processed = 0;

    for batch in 1..=total_batches {
        if options.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            tracing::info!(batch, processed, "Import cancelled");
            result.cancelled = true;
            break;
        }

        let end = (processed + batch_size).min(total);
        let mut writes = Vec::new();
        let mut failures = Vec::new();
        while let Some((_, disposition)) = pending.next_if(|(index, _)| *index < end) {
            match disposition {
                Disposition::Failed(error) => failures.push(error),
                Disposition::Skipped => result.skipped_count += 1,
                Disposition::Write(item) => writes.push(item),
            }
        }

        let outcome = persist_batch(store, writes, persist_options).await;
        failures.extend(outcome.errors);
        failures.sort_by_key(|e| e.index);
        for record in outcome.written {
            result.record_written(record);
        }
        for error in failures {
            result.record_error(error);
        }
        processed = end;

        tracing::debug!(
            batch,
            total_batches,
            processed,
            errors = result.error_count,
            "Import batch complete"
        );
        if let Some(callback) = &options.progress_callback {
            #[allow(clippy::cast_precision_loss)]
            let percentage = if total == 0 {
                100.0
            } else {
                processed as f64 / total as f64 * 100.0
            };
            callback(&ImportProgress {
                processed,
                total,
                percentage,
                current_batch: batch,
                total_batches,
                errors: result.error_count,
                skipped: result.skipped_count,
                imported: result.imported_count,
            });
        }

        if options.max_errors.is_some_and(|max| result.error_count >= max) {
            tracing::warn!(errors = result.error_count, "Error threshold reached, stopping import");
            break;
        }
        if !options.allow_partial_import && result.error_count > 0 {
            tracing::warn!(batch, "Record failed with partial import disabled, stopping import");
            break;
        }
    }

    processed
}

fn internal_failure(mut result: ImportResult, err: &Error) -> ImportResult {
    tracing::error!(error = %err, "Import failed");
    result
        .integrity_report
        .push_error(IntegrityError::new("internal_error", err.to_string(), Severity::Critical));
    result.error = Some(ErrorInfo::new("internal_error", err.to_string()));
    result
}
