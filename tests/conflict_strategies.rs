//! Id collision handling through the import service.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use promptport::io::conflict::{ConflictResolution, ConflictRule};
use promptport::io::{
    ConflictPolicy, ConflictStrategy, ImportJob, ImportResult, ImportService, ImportSourceFormat,
    SourcePayload,
};
use promptport::models::{Difficulty, PromptStatus, is_valid_prompt_id};
use promptport::{Category, InMemoryPromptStore, Prompt, PromptStore};
use serde_json::json;
use std::sync::Arc;
use test_case::test_case;

fn stored() -> Prompt {
    Prompt::new("opening", "film", "Opening titles", Category::Cinematic)
        .with_description("Original description")
        .with_tag("titles")
        .with_estimated_tokens(300)
}

fn incoming() -> Prompt {
    Prompt::new("opening", "film", "Opening titles v2", Category::Cinematic)
        .with_tag("revised")
}

fn fresh() -> Prompt {
    Prompt::new("closing", "film", "Closing credits", Category::Cinematic)
}

async fn run(policy: ConflictPolicy, payload: &[Prompt]) -> (ImportResult, Arc<InMemoryPromptStore>) {
    let store = Arc::new(InMemoryPromptStore::with_prompts(vec![stored()]));
    let bytes = serde_json::to_vec(payload).unwrap();
    let job = ImportJob::new(ImportSourceFormat::Native, SourcePayload::new(bytes))
        .with_conflict_policy(policy);
    let result = ImportService::new().execute_import(&job, &store).await;
    (result, store)
}

#[test_case(ConflictStrategy::SkipExisting, 1, 1, 2 ; "skip keeps stored")]
#[test_case(ConflictStrategy::Overwrite, 2, 0, 2 ; "overwrite replaces")]
#[test_case(ConflictStrategy::Merge, 2, 0, 2 ; "merge combines")]
#[test_case(ConflictStrategy::RenameNew, 2, 0, 3 ; "rename adds copy")]
fn test_strategy_counts(
    strategy: ConflictStrategy,
    imported: usize,
    skipped: usize,
    stored_after: usize,
) {
    let (result, store) =
        tokio_test::block_on(run(ConflictPolicy::new(strategy), &[incoming(), fresh()]));

    assert!(result.success);
    assert_eq!(result.imported_count, imported);
    assert_eq!(result.skipped_count, skipped);
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].index, 0);
    assert_eq!(result.conflicts[0].id, "opening");
    assert_eq!(store.len().unwrap(), stored_after);
}

#[tokio::test]
async fn test_skip_leaves_stored_prompt_untouched() {
    let (result, store) = run(ConflictPolicy::new(ConflictStrategy::SkipExisting), &[incoming()]).await;

    assert_eq!(result.conflicts[0].resolution, ConflictResolution::Skipped);
    assert_eq!(store.get("opening").unwrap().unwrap(), stored());
}

#[tokio::test]
async fn test_overwrite_replaces_stored_prompt() {
    let (result, store) = run(ConflictPolicy::new(ConflictStrategy::Overwrite), &[incoming()]).await;

    assert_eq!(result.overwritten_count, 1);
    assert_eq!(store.get("opening").unwrap().unwrap(), incoming());
}

#[tokio::test]
async fn test_merge_keeps_stored_values_for_empty_fields() {
    let (result, store) = run(ConflictPolicy::new(ConflictStrategy::Merge), &[incoming()]).await;

    assert_eq!(result.merged_count, 1);
    let merged = store.get("opening").unwrap().unwrap();
    assert_eq!(merged.metadata.title, "Opening titles v2");
    assert_eq!(merged.metadata.description, "Original description");
    assert_eq!(merged.metadata.estimated_tokens, 300);
    assert!(merged.metadata.tags.contains("revised"));
}

#[tokio::test]
async fn test_merge_keeps_stored_values_for_absent_fields() {
    let stored = stored()
        .with_difficulty(Difficulty::Hard)
        .with_status(PromptStatus::Archived);
    let store = Arc::new(InMemoryPromptStore::with_prompts(vec![stored]));
    let sparse = json!([{
        "id": "opening",
        "projectId": "film",
        "version": "1.1.0",
        "metadata": {"title": "Opening titles v3", "category": "cinematic"}
    }]);
    let job = ImportJob::new(
        ImportSourceFormat::Native,
        SourcePayload::new(serde_json::to_vec(&sparse).unwrap()),
    )
    .with_conflict_policy(ConflictPolicy::new(ConflictStrategy::Merge));

    let result = ImportService::new().execute_import(&job, &store).await;

    assert_eq!(result.merged_count, 1);
    let merged = store.get("opening").unwrap().unwrap();
    assert_eq!(merged.version, "1.1.0");
    assert_eq!(merged.metadata.title, "Opening titles v3");
    assert_eq!(merged.metadata.difficulty, Difficulty::Hard);
    assert_eq!(merged.status, PromptStatus::Archived);
    assert!(merged.metadata.tags.contains("titles"));
}

#[tokio::test]
async fn test_rename_mints_valid_unique_id() {
    let (result, store) = run(ConflictPolicy::new(ConflictStrategy::RenameNew), &[incoming()]).await;

    let new_id = match &result.conflicts[0].resolution {
        ConflictResolution::Renamed { new_id } => new_id,
        other => unreachable!("expected rename, got {other:?}"),
    };
    assert!(new_id.starts_with("opening-"));
    assert!(is_valid_prompt_id(new_id));
    assert_eq!(result.imported_ids, vec![new_id.clone()]);
    assert_eq!(store.get("opening").unwrap().unwrap(), stored());
    assert_eq!(store.get(new_id).unwrap().unwrap().metadata.title, "Opening titles v2");
}

#[tokio::test]
async fn test_tag_rule_overrides_default_strategy() {
    let policy = ConflictPolicy::new(ConflictStrategy::SkipExisting).with_rule(ConflictRule {
        category: None,
        tag: Some("revised".to_string()),
        strategy: ConflictStrategy::Overwrite,
    });

    let (result, store) = run(policy, &[incoming()]).await;

    assert_eq!(result.overwritten_count, 1);
    assert_eq!(store.get("opening").unwrap().unwrap().metadata.title, "Opening titles v2");
}

#[tokio::test]
async fn test_non_matching_rule_falls_back() {
    let policy = ConflictPolicy::new(ConflictStrategy::SkipExisting).with_rule(ConflictRule {
        category: Some(Category::Documentary),
        tag: None,
        strategy: ConflictStrategy::Overwrite,
    });

    let (result, _) = run(policy, &[incoming()]).await;

    assert_eq!(result.skipped_count, 1);
    assert_eq!(result.overwritten_count, 0);
}
