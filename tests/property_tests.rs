//! Property-based tests for checksums, flat cells and identifiers.
//!
//! Properties covered:
//! - Any single-byte change to an exported payload fails checksum verification
//! - Tag sets survive a CSV export and import
//! - The validator never panics on arbitrary bytes in any source format
//! - Minted ids and ids matching the grammar are always valid

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use promptport::io::fields::{parse_cell, render_cell};
use promptport::io::transform::sha256_hex;
use promptport::io::{
    ExportFormat, ExportJob, ExportService, ImportJob, ImportService, ImportSourceFormat,
    IntegrityValidator, SourcePayload,
};
use promptport::models::{is_valid_prompt_id, mint_prompt_id};
use promptport::{Category, InMemoryPromptStore, Prompt, PromptStore};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

fn tag_set() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("[a-z0-9][a-z0-9-]{0,11}", 0..6)
}

fn prompt_with_tags(id: &str, tags: &BTreeSet<String>) -> Prompt {
    tags.iter()
        .fold(Prompt::new(id, "prop", "Property prompt", Category::General), |p, t| {
            p.with_tag(t.clone())
        })
}

fn export_bytes(format: ExportFormat, prompts: Vec<Prompt>) -> (Vec<u8>, String) {
    let job = ExportJob::new("Properties", format, prompts);
    let result = tokio_test::block_on(ExportService::new().execute_export(&job));
    let artifact = result.data.unwrap().artifacts.remove(0);
    (artifact.bytes, artifact.checksum)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Reported checksum always matches the artifact bytes.
    #[test]
    fn prop_export_checksum_matches_bytes(tags in tag_set()) {
        let (bytes, checksum) = export_bytes(ExportFormat::Json, vec![prompt_with_tags("p1", &tags)]);
        prop_assert_eq!(sha256_hex(&bytes), checksum);
    }

    /// Flipping any bit of any byte is detected.
    #[test]
    fn prop_tamper_fails_checksum(position in any::<prop::sample::Index>(), bit in 0u8..8) {
        let (mut bytes, checksum) =
            export_bytes(ExportFormat::Json, vec![prompt_with_tags("p1", &BTreeSet::new())]);
        let at = position.index(bytes.len());
        bytes[at] ^= 1 << bit;

        let report = IntegrityValidator::new().validate(
            &SourcePayload::new(bytes).with_checksum(checksum),
            ImportSourceFormat::Native,
        );

        prop_assert_eq!(report.checksum_valid, Some(false));
        prop_assert!(!report.valid);
    }

    /// Tags render to a single cell and parse back to the same set.
    #[test]
    fn prop_tag_cell_round_trip(tags in tag_set().prop_filter("non-empty", |t| !t.is_empty())) {
        let value = Value::Array(tags.iter().cloned().map(Value::String).collect());
        let cell = render_cell(Some(&value));
        let parsed = parse_cell("metadata.tags", &cell).unwrap();
        let parsed: BTreeSet<String> = serde_json::from_value(parsed).unwrap();
        prop_assert_eq!(parsed, tags);
    }

    /// Tag sets survive CSV export and import.
    #[test]
    fn prop_csv_preserves_tags(tags in tag_set()) {
        let (bytes, checksum) = export_bytes(ExportFormat::Csv, vec![prompt_with_tags("tagged", &tags)]);
        let store = Arc::new(InMemoryPromptStore::new());
        let job = ImportJob::new(ImportSourceFormat::Csv, SourcePayload::new(bytes).with_checksum(checksum));

        let result = tokio_test::block_on(ImportService::new().execute_import(&job, &store));

        prop_assert!(result.success);
        let stored = store.get("tagged").unwrap().unwrap();
        prop_assert_eq!(stored.metadata.tags, tags);
    }

    /// Arbitrary bytes produce a report, never a panic.
    #[test]
    fn prop_validator_total_on_garbage(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        for &format in ImportSourceFormat::all() {
            let report = IntegrityValidator::new().validate(&SourcePayload::new(bytes.clone()), format);
            prop_assert_eq!(report.statistics.valid + report.statistics.invalid, report.statistics.total);
        }
    }

    /// Ids matching the identifier grammar are accepted, longer ones are not.
    #[test]
    fn prop_id_grammar(id in "[A-Za-z0-9][A-Za-z0-9_.:-]{0,127}", extra in "[a-z]{129,140}") {
        prop_assert!(is_valid_prompt_id(&id));
        prop_assert!(!is_valid_prompt_id(&extra));
    }
}

#[test]
fn test_minted_ids_are_valid_and_unique() {
    let ids: BTreeSet<String> = (0..1000).map(|_| mint_prompt_id()).collect();
    assert_eq!(ids.len(), 1000);
    assert!(ids.iter().all(|id| is_valid_prompt_id(id)));
}
