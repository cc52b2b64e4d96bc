//! Import integrity validation.
//!
//! [`IntegrityValidator`] inspects a raw source payload and produces an
//! [`IntegrityReport`]. Checks run in a fixed order: parse, per-record
//! schema, duplicate ids, date fields, then the declared checksum. Every
//! finding carries a [`Severity`]; a report is valid iff it holds no
//! `high` or `critical` error.
//!
//! Validation never fails: decoding or parsing problems become `critical`
//! entries in the report.

use crate::io::adapters::{AdapterOptions, normalize_record};
use crate::io::fields::get_path;
use crate::io::formats::json::type_name;
use crate::io::formats::{ImportSourceFormat, read_records};
use crate::io::transform::{decode_payload, sha256_hex};
use crate::models::{Category, Difficulty, Prompt, PromptStatus, is_valid_prompt_id, is_valid_version};
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Severity of an integrity finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cosmetic.
    Low,
    /// Advisory; the record is still imported.
    Medium,
    /// The record cannot be imported.
    High,
    /// The payload cannot be trusted.
    Critical,
}

impl Severity {
    /// Returns whether findings of this severity invalidate a report.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    /// Returns the severity name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityError {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Dotted path of the offending field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Severity.
    pub severity: Severity,
    /// Zero-based index of the offending record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<usize>,
}

impl IntegrityError {
    /// Creates an error without field or record context.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
            severity,
            record: None,
        }
    }

    /// Attaches the offending field path.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Attaches the offending record index.
    #[must_use]
    pub const fn with_record(mut self, record: Option<usize>) -> Self {
        self.record = record;
        self
    }

    /// Converts a library error raised while handling a record.
    #[must_use]
    pub fn from_error(err: &crate::Error, severity: Severity) -> Self {
        let message = match err {
            crate::Error::IntegrityViolation { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self::new(err.code(), message, severity)
    }
}

/// A non-blocking finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityWarning {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// What the caller could do about it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl IntegrityWarning {
    fn new(code: &str, message: impl Into<String>, suggestion: Option<&str>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            suggestion: suggestion.map(String::from),
        }
    }
}

/// Counters accumulated while validating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityStatistics {
    /// Records parsed.
    pub total: usize,
    /// Records without blocking errors.
    pub valid: usize,
    /// Records with at least one blocking error.
    pub invalid: usize,
    /// Records repeating an earlier id.
    pub duplicates: usize,
    /// `missing_required_field` findings.
    pub missing_required_fields: usize,
    /// Type and range findings.
    pub type_violations: usize,
}

/// Structured outcome of validating one import payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    /// No `high` or `critical` error is present.
    pub valid: bool,
    /// Outcome of checksum verification, when a checksum was declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_valid: Option<bool>,
    /// Whether auto-repair ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair_attempted: Option<bool>,
    /// Set by the import service when some, but not all, records failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_success: Option<bool>,
    /// Errors in detection order.
    pub errors: Vec<IntegrityError>,
    /// Warnings in detection order.
    pub warnings: Vec<IntegrityWarning>,
    /// Counters.
    pub statistics: IntegrityStatistics,
}

impl IntegrityReport {
    /// A report holding a single `critical` error.
    #[must_use]
    pub fn critical(code: &str, message: impl Into<String>) -> Self {
        let mut report = Self::default();
        report.push_error(IntegrityError::new(code, message, Severity::Critical));
        report
    }

    /// Appends an error and updates `valid`.
    pub fn push_error(&mut self, error: IntegrityError) {
        self.errors.push(error);
        self.refresh_validity();
    }

    /// Returns whether any error has `critical` severity.
    #[must_use]
    pub fn has_critical(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Critical)
    }

    fn refresh_validity(&mut self) {
        self.valid = !self.errors.iter().any(|e| e.severity.is_blocking());
    }
}

/// Raw import payload as received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePayload {
    /// Bytes exactly as delivered.
    pub bytes: Vec<u8>,
    /// SHA-256 hex digest the sender declared for `bytes`.
    pub declared_checksum: Option<String>,
}

impl SourcePayload {
    /// Wraps `bytes` without a declared checksum.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            declared_checksum: None,
        }
    }

    /// Declares the expected checksum.
    #[must_use]
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.declared_checksum = Some(checksum.into());
        self
    }
}

/// Copy of a payload taken before auto-repair replaced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadBackup {
    /// Original bytes.
    pub bytes: Vec<u8>,
    /// SHA-256 of the original bytes.
    pub checksum: String,
}

/// One record after parsing and normalization.
#[derive(Debug, Clone)]
pub struct CandidateRecord {
    /// Zero-based position in the source.
    pub index: usize,
    /// Canonical record, `None` when normalization failed.
    pub value: Option<Value>,
    /// Findings for this record.
    pub errors: Vec<IntegrityError>,
    /// Index of an earlier record with the same id.
    pub duplicate_of: Option<usize>,
}

impl CandidateRecord {
    /// Returns whether the record must not be imported.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.value.is_none() || self.errors.iter().any(|e| e.severity.is_blocking())
    }

    /// The record's id, when it has a string one.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.value.as_ref()?.get("id")?.as_str()
    }
}

/// Everything the validator learned about a payload.
#[derive(Debug, Clone)]
pub struct Examination {
    /// The report.
    pub report: IntegrityReport,
    /// Parsed records in source order; empty when parsing failed.
    pub records: Vec<CandidateRecord>,
    /// Whether the payload parsed.
    pub parsed: bool,
    /// Original payload, taken before any repair when a backup was requested.
    pub backup: Option<PayloadBackup>,
}

/// Validates import payloads.
#[derive(Clone, Default)]
pub struct IntegrityValidator {
    schema_checks: bool,
    verify_checksum: bool,
    auto_repair: bool,
    backup_original: bool,
    decryption_secret: Option<SecretString>,
    field_mapping: BTreeMap<String, String>,
    adapter_options: AdapterOptions,
}

impl IntegrityValidator {
    /// Creates a validator with schema and checksum checks enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            schema_checks: true,
            verify_checksum: true,
            ..Self::default()
        }
    }

    /// Enables or disables per-record schema checks. Parse errors are
    /// reported regardless.
    #[must_use]
    pub const fn with_schema_checks(mut self, enabled: bool) -> Self {
        self.schema_checks = enabled;
        self
    }

    /// Enables or disables checksum verification.
    #[must_use]
    pub const fn with_checksum_verification(mut self, enabled: bool) -> Self {
        self.verify_checksum = enabled;
        self
    }

    /// Enables auto-repair of checksum mismatches.
    #[must_use]
    pub const fn with_auto_repair(mut self, enabled: bool) -> Self {
        self.auto_repair = enabled;
        self
    }

    /// Keeps the original payload when auto-repair replaces it.
    #[must_use]
    pub const fn with_backup(mut self, enabled: bool) -> Self {
        self.backup_original = enabled;
        self
    }

    /// Secret for encrypted payloads.
    #[must_use]
    pub fn with_decryption_secret(mut self, secret: Option<SecretString>) -> Self {
        self.decryption_secret = secret;
        self
    }

    /// Field mapping applied during normalization.
    #[must_use]
    pub fn with_field_mapping(mut self, mapping: BTreeMap<String, String>) -> Self {
        self.field_mapping = mapping;
        self
    }

    /// Options passed to provider adapters.
    #[must_use]
    pub fn with_adapter_options(mut self, options: AdapterOptions) -> Self {
        self.adapter_options = options;
        self
    }

    /// Validates `source` and returns only the report.
    #[must_use]
    pub fn validate(&self, source: &SourcePayload, format: ImportSourceFormat) -> IntegrityReport {
        self.examine(source, format).report
    }

    /// Validates `source`, returning the report together with the
    /// normalized records.
    #[must_use]
    pub fn examine(&self, source: &SourcePayload, format: ImportSourceFormat) -> Examination {
        let mut report = IntegrityReport {
            valid: true,
            ..IntegrityReport::default()
        };

        let (payload, checksum_error, backup) = self.verify(source, &mut report);

        let decoded = decode_payload(&payload, self.decryption_secret.as_ref());
        let raw_records = decoded.and_then(|bytes| read_records(&bytes, format));
        let raw_records = match raw_records {
            Ok(records) => records,
            Err(e) => {
                report.push_error(IntegrityError::new(
                    "parse_error",
                    format!("Failed to parse {format} payload: {e}"),
                    Severity::Critical,
                ));
                if let Some(err) = checksum_error {
                    report.push_error(err);
                }
                return Examination {
                    report,
                    records: Vec::new(),
                    parsed: false,
                    backup,
                };
            },
        };

        let mut records: Vec<CandidateRecord> = raw_records
            .iter()
            .enumerate()
            .map(|(index, raw)| self.candidate(index, raw, format))
            .collect();

        mark_duplicates(&mut records, &mut report);
        tally(&records, &mut report);
        for record in &records {
            report.errors.extend(record.errors.iter().cloned());
        }
        if let Some(err) = checksum_error {
            report.errors.push(err);
        }
        report.refresh_validity();

        tracing::debug!(
            format = %format,
            total = report.statistics.total,
            invalid = report.statistics.invalid,
            valid = report.valid,
            "Validated import payload"
        );

        Examination {
            report,
            records,
            parsed: true,
            backup,
        }
    }

    fn candidate(&self, index: usize, raw: &Value, format: ImportSourceFormat) -> CandidateRecord {
        match normalize_record(raw, format, &self.field_mapping, &self.adapter_options) {
            Ok(value) => {
                let errors = if self.schema_checks {
                    check_record(&value, Some(index))
                } else {
                    Vec::new()
                };
                CandidateRecord {
                    index,
                    value: Some(value),
                    errors,
                    duplicate_of: None,
                }
            },
            Err(e) => CandidateRecord {
                index,
                value: None,
                errors: vec![IntegrityError::from_error(&e, Severity::High).with_record(Some(index))],
                duplicate_of: None,
            },
        }
    }

    /// Checks the declared checksum, repairing the payload when allowed.
    ///
    /// Returns the payload to parse, the deferred mismatch error, and the
    /// backup taken before repairs were tried.
    fn verify(
        &self,
        source: &SourcePayload,
        report: &mut IntegrityReport,
    ) -> (Vec<u8>, Option<IntegrityError>, Option<PayloadBackup>) {
        let declared = match source.declared_checksum.as_deref() {
            Some(declared) if self.verify_checksum => declared.trim().to_lowercase(),
            _ => return (source.bytes.clone(), None, None),
        };

        let actual = sha256_hex(&source.bytes);
        if actual == declared {
            report.checksum_valid = Some(true);
            return (source.bytes.clone(), None, None);
        }

        let mut backup = None;
        if self.auto_repair {
            report.repair_attempted = Some(true);
            backup = self.backup_original.then(|| PayloadBackup {
                bytes: source.bytes.clone(),
                checksum: actual.clone(),
            });
            if let Some((label, repaired)) = repair_candidates(&source.bytes)
                .into_iter()
                .find(|(_, candidate)| sha256_hex(candidate) == declared)
            {
                report.checksum_valid = Some(true);
                report.warnings.push(IntegrityWarning::new(
                    "checksum_repaired",
                    format!("Payload matched the declared checksum after {label}"),
                    Some("Re-export the source to avoid repairs"),
                ));
                tracing::info!(repair = label, "Repaired payload to match declared checksum");
                return (repaired, None, backup);
            }
        }

        report.checksum_valid = Some(false);
        tracing::warn!(declared = %declared, actual = %actual, "Checksum mismatch");
        let error = IntegrityError::new(
            "checksum_mismatch",
            format!("Declared checksum {declared} does not match payload checksum {actual}"),
            Severity::Critical,
        );
        (source.bytes.clone(), Some(error), backup)
    }
}

/// Repairs tried on a checksum mismatch, in order.
fn repair_candidates(bytes: &[u8]) -> Vec<(&'static str, Vec<u8>)> {
    let strip_bom = |b: &[u8]| b.strip_prefix(UTF8_BOM).unwrap_or(b).to_vec();
    let trim_end = |b: &[u8]| b.trim_ascii_end().to_vec();
    let normalize_newlines = |b: &[u8]| {
        let mut out = Vec::with_capacity(b.len());
        let mut iter = b.iter().peekable();
        while let Some(&byte) = iter.next() {
            if byte == b'\r' && iter.peek() == Some(&&b'\n') {
                continue;
            }
            out.push(byte);
        }
        out
    };

    let candidates = [
        ("BOM removal", strip_bom(bytes)),
        ("trailing whitespace trim", trim_end(bytes)),
        ("line ending normalization", normalize_newlines(bytes)),
        (
            "combined normalization",
            trim_end(normalize_newlines(strip_bom(bytes).as_slice()).as_slice()),
        ),
    ];
    candidates
        .into_iter()
        .filter(|(_, candidate)| candidate.as_slice() != bytes)
        .collect()
}

fn mark_duplicates(records: &mut [CandidateRecord], report: &mut IntegrityReport) {
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    for record in records.iter_mut() {
        let Some(id) = record.id().map(String::from) else {
            continue;
        };
        match first_seen.get(&id) {
            Some(&first) => {
                record.duplicate_of = Some(first);
                report.statistics.duplicates += 1;
                report.warnings.push(IntegrityWarning::new(
                    "duplicate_id",
                    format!("Record {} repeats id '{id}' from record {first}", record.index),
                    Some("Only the first occurrence is imported"),
                ));
            },
            None => {
                first_seen.insert(id, record.index);
            },
        }
    }
}

fn tally(records: &[CandidateRecord], report: &mut IntegrityReport) {
    let stats = &mut report.statistics;
    stats.total = records.len();
    for record in records {
        if record.is_blocked() {
            stats.invalid += 1;
        } else {
            stats.valid += 1;
        }
        for error in &record.errors {
            match error.code.as_str() {
                "missing_required_field" => stats.missing_required_fields += 1,
                "data_type_violation" | "invalid_token_count" => stats.type_violations += 1,
                _ => {},
            }
        }
    }
}

/// Checks one canonical record against the prompt schema.
#[must_use]
pub fn check_record(record: &Value, index: Option<usize>) -> Vec<IntegrityError> {
    let mut errors = Vec::new();
    let mut push = |error: IntegrityError| errors.push(error.with_record(index));

    if !record.is_object() {
        push(
            IntegrityError::new(
                "data_type_violation",
                format!("Record must be an object, got {}", type_name(record)),
                Severity::High,
            )
            .with_field("record"),
        );
        return errors;
    }

    for field in ["id", "projectId", "version", "metadata", "metadata.title", "metadata.category"] {
        match get_path(record, field) {
            None | Some(Value::Null) => push(missing_field(field)),
            Some(Value::String(s)) if s.trim().is_empty() => push(missing_field(field)),
            Some(Value::String(_)) if field != "metadata" => {},
            Some(Value::Object(_)) if field == "metadata" => {},
            Some(other) => push(wrong_type(
                field,
                if field == "metadata" { "an object" } else { "a string" },
                other,
            )),
        }
    }

    if let Some(Value::String(id)) = record.get("id")
        && !id.trim().is_empty()
        && !is_valid_prompt_id(id)
    {
        push(
            IntegrityError::new(
                "invalid_id_format",
                format!("Id '{id}' must match [A-Za-z0-9][A-Za-z0-9_.:-]{{0,127}}"),
                Severity::High,
            )
            .with_field("id"),
        );
    }

    if let Some(Value::String(version)) = record.get("version")
        && !version.trim().is_empty()
        && !is_valid_version(version)
    {
        push(
            IntegrityError::new(
                "invalid_version",
                format!("Version '{version}' is not a semantic version"),
                Severity::Medium,
            )
            .with_field("version"),
        );
    }

    if let Some(Value::String(category)) = get_path(record, "metadata.category")
        && !category.trim().is_empty()
        && Category::parse(category).is_none()
    {
        push(
            IntegrityError::new(
                "invalid_category",
                format!("Unknown category '{category}'"),
                Severity::High,
            )
            .with_field("metadata.category"),
        );
    }

    check_metadata(record, &mut push);
    check_sections(record, &mut push);
    check_dates(record, &mut push);

    if !errors.iter().any(|e| e.severity.is_blocking()) {
        errors.extend(check_schema(record).map(|e| e.with_record(index)));
    }
    errors
}

/// Catches what the field checks above do not cover, such as required
/// fields inside optional sections.
fn check_schema(record: &Value) -> Option<IntegrityError> {
    let err = serde_json::from_value::<Prompt>(record.clone()).err()?;
    let message = err.to_string();
    let code = if message.starts_with("missing field") {
        "missing_required_field"
    } else {
        "data_type_violation"
    };
    Some(IntegrityError::new(
        code,
        format!("Record does not match the prompt schema: {message}"),
        Severity::High,
    ))
}

fn check_metadata(record: &Value, push: &mut impl FnMut(IntegrityError)) {
    match get_path(record, "metadata.estimatedTokens") {
        None | Some(Value::Null) => {},
        Some(Value::Number(n)) if n.is_u64() => {},
        Some(other) => push(
            IntegrityError::new(
                "invalid_token_count",
                format!("estimatedTokens must be a non-negative integer, got {other}"),
                Severity::High,
            )
            .with_field("metadata.estimatedTokens"),
        ),
    }

    if let Some(value) = get_path(record, "metadata.description")
        && !value.is_string()
        && !value.is_null()
    {
        push(wrong_type("metadata.description", "a string", value));
    }

    match get_path(record, "metadata.tags") {
        None | Some(Value::Null) => {},
        Some(Value::Array(tags)) if tags.iter().all(Value::is_string) => {},
        Some(other) => push(wrong_type("metadata.tags", "an array of strings", other)),
    }

    if let Some(value) = get_path(record, "metadata.difficulty")
        && !value.is_null()
        && value.as_str().and_then(Difficulty::parse).is_none()
    {
        push(wrong_type("metadata.difficulty", "one of easy, medium, hard", value));
    }

    if let Some(value) = record.get("status")
        && !value.is_null()
        && value.as_str().and_then(PromptStatus::parse).is_none()
    {
        push(wrong_type("status", "one of active, archived, deleted", value));
    }
}

fn check_sections(record: &Value, push: &mut impl FnMut(IntegrityError)) {
    for section in ["promptStructure", "generationSettings", "usage"] {
        if let Some(value) = record.get(section)
            && !value.is_null()
            && !value.is_object()
        {
            push(wrong_type(section, "an object", value));
        }
    }

    if let Some(value) = get_path(record, "promptStructure.shots")
        && !value.is_array()
    {
        push(wrong_type("promptStructure.shots", "an array", value));
    }

    if let Some(value) = get_path(record, "generationSettings.parameters")
        && !value.is_object()
        && !value.is_null()
    {
        push(wrong_type("generationSettings.parameters", "an object", value));
    }

    match get_path(record, "usage.usageCount") {
        None | Some(Value::Null) => {},
        Some(Value::Number(n)) if n.is_u64() => {},
        Some(other) => push(wrong_type("usage.usageCount", "a non-negative integer", other)),
    }
}

fn check_dates(record: &Value, push: &mut impl FnMut(IntegrityError)) {
    let Some(Value::Object(usage)) = record.get("usage") else {
        return;
    };
    for (key, value) in usage.iter().filter(|(k, _)| k.ends_with("At")) {
        let valid = value.as_str().is_some_and(is_iso8601);
        if !valid && !value.is_null() {
            push(
                IntegrityError::new(
                    "invalid_date",
                    format!("usage.{key} is not an ISO-8601 timestamp: {value}"),
                    Severity::Medium,
                )
                .with_field(format!("usage.{key}")),
            );
        }
    }
}

/// Accepts RFC 3339 timestamps, naive date-times and plain dates.
fn is_iso8601(s: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn missing_field(field: &str) -> IntegrityError {
    IntegrityError::new(
        "missing_required_field",
        format!("Required field '{field}' is missing"),
        Severity::High,
    )
    .with_field(field)
}

fn wrong_type(field: &str, expected: &str, actual: &Value) -> IntegrityError {
    IntegrityError::new(
        "data_type_violation",
        format!("Field '{field}' must be {expected}, got {}", type_name(actual)),
        Severity::High,
    )
    .with_field(field)
}

/// Checks a typed prompt immediately before it is written.
///
/// # Errors
///
/// Returns the first blocking finding.
pub fn check_prompt(prompt: &Prompt) -> std::result::Result<(), IntegrityError> {
    if !is_valid_prompt_id(&prompt.id) {
        return Err(IntegrityError::new(
            "invalid_id_format",
            format!("Id '{}' is not a valid prompt id", prompt.id),
            Severity::High,
        )
        .with_field("id"));
    }
    if prompt.project_id.trim().is_empty() {
        return Err(missing_field("projectId"));
    }
    if prompt.metadata.title.trim().is_empty() {
        return Err(missing_field("metadata.title"));
    }
    Ok(())
}
