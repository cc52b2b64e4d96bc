//! Batched, parallel and concurrent imports.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use promptport::io::{
    ConflictPolicy, ConflictStrategy, ImportJob, ImportOptions, ImportProgress, ImportService,
    ImportSourceFormat, SourcePayload,
};
use promptport::{InMemoryPromptStore, PromptStore};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

fn record(id: &str, category: &str) -> Value {
    json!({
        "id": id,
        "projectId": "bulk",
        "version": "1.0.0",
        "metadata": {"title": format!("Prompt {id}"), "category": category}
    })
}

fn payload(records: &[Value]) -> SourcePayload {
    SourcePayload::new(serde_json::to_vec(records).unwrap())
}

fn numbered(range: std::ops::Range<usize>) -> Vec<Value> {
    range.map(|i| record(&format!("p{i:04}"), "general")).collect()
}

#[tokio::test]
async fn test_parallel_batches_report_progress() {
    let seen: Arc<Mutex<Vec<ImportProgress>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let options = ImportOptions::default()
        .with_batching(50, true)
        .with_progress(move |p| sink.lock().unwrap().push(*p));
    let store = Arc::new(InMemoryPromptStore::new());
    let job = ImportJob::new(ImportSourceFormat::Native, payload(&numbered(0..500))).with_options(options);

    let result = ImportService::new().execute_import(&job, &store).await;

    assert!(result.success);
    assert_eq!(result.imported_count, 500);
    assert_eq!(store.len().unwrap(), 500);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 10);
    assert!(seen.windows(2).all(|w| w[0].processed < w[1].processed));
    assert!(seen.iter().all(|p| p.total_batches == 10 && p.total == 500));
    let last = seen.last().unwrap();
    assert_eq!(last.current_batch, 10);
    assert_eq!(last.processed, 500);
    assert!((last.percentage - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_imported_ids_follow_source_order_when_parallel() {
    let store = Arc::new(InMemoryPromptStore::new());
    let job = ImportJob::new(ImportSourceFormat::Native, payload(&numbered(0..120)))
        .with_options(ImportOptions::default().with_batching(25, true));

    let result = ImportService::new().execute_import(&job, &store).await;

    let expected: Vec<String> = (0..120).map(|i| format!("p{i:04}")).collect();
    assert_eq!(result.imported_ids, expected);
}

#[tokio::test]
async fn test_partial_import_tolerates_bad_records() {
    let mut records = numbered(0..30);
    records[4] = record("bad-1", "interpretive-dance");
    records[17] = record("bad-2", "interpretive-dance");
    let store = Arc::new(InMemoryPromptStore::new());
    let job = ImportJob::new(ImportSourceFormat::Native, payload(&records))
        .with_options(ImportOptions::default().with_batching(10, false));

    let result = ImportService::new().execute_import(&job, &store).await;

    assert!(result.success);
    assert!(result.is_partial());
    assert_eq!(result.imported_count, 28);
    assert_eq!(result.error_count, 2);
    assert_eq!(
        result.errors.iter().map(|e| e.index).collect::<Vec<_>>(),
        vec![4, 17]
    );
    assert_eq!(result.integrity_report.partial_success, Some(true));
}

#[tokio::test]
async fn test_max_errors_stops_after_threshold_batch() {
    let mut records = numbered(0..40);
    for index in [1, 3, 12] {
        records[index] = record(&format!("bad-{index}"), "interpretive-dance");
    }
    let store = Arc::new(InMemoryPromptStore::new());
    let job = ImportJob::new(ImportSourceFormat::Native, payload(&records))
        .with_options(ImportOptions::default().with_batching(10, false).with_max_errors(2));

    let result = ImportService::new().execute_import(&job, &store).await;

    // The first batch already holds two failures; later batches never run.
    assert_eq!(result.error_count, 2);
    assert_eq!(result.imported_count, 8);
    assert_eq!(store.len().unwrap(), 8);
    assert!(result.success);
}

#[tokio::test]
async fn test_concurrent_imports_share_the_store() {
    let store = Arc::new(InMemoryPromptStore::new());
    let service = ImportService::new();
    let first = ImportJob::new(ImportSourceFormat::Native, payload(&numbered(0..200)))
        .with_options(ImportOptions::default().with_batching(20, true))
        .with_conflict_policy(ConflictPolicy::new(ConflictStrategy::SkipExisting));
    let second = ImportJob::new(ImportSourceFormat::Native, payload(&numbered(100..300)))
        .with_options(ImportOptions::default().with_batching(20, true))
        .with_conflict_policy(ConflictPolicy::new(ConflictStrategy::SkipExisting));

    let (a, b) = tokio::join!(
        service.execute_import(&first, &store),
        service.execute_import(&second, &store)
    );

    assert!(a.success && b.success);
    assert_eq!(store.len().unwrap(), 300);
    // Each overlapping id lands exactly once.
    assert_eq!(a.imported_count + b.imported_count, 300);
    assert_eq!(a.skipped_count + b.skipped_count, 100);
}
