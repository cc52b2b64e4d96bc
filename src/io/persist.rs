//! Batched persistence.
//!
//! Writes one batch of resolved prompts to a [`PromptStore`]. Each item is
//! re-checked right before its write and fails on its own: an error is
//! recorded and the remaining items still run.

use crate::io::conflict::{ResolvedPrompt, WriteAction};
use crate::io::validation::{IntegrityError, Severity, check_prompt};
use crate::models::mint_prompt_id;
use crate::storage::PromptStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default cap on concurrent writes in parallel mode.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Persistence settings for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistOptions {
    /// Keep incoming ids for new prompts instead of minting fresh ones.
    pub preserve_ids: bool,
    /// Run every check but skip the writes.
    pub dry_run: bool,
    /// Fan writes out over a task pool.
    pub parallel: bool,
    /// Permits in the task pool.
    pub max_concurrency: usize,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            preserve_ids: true,
            dry_run: false,
            parallel: false,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// A record that could not be imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordError {
    /// Source record index.
    pub index: usize,
    /// Record id, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Machine-readable code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Severity.
    pub severity: Severity,
}

impl RecordError {
    /// Wraps an integrity finding for record `index`.
    #[must_use]
    pub fn from_integrity(index: usize, id: Option<String>, error: IntegrityError) -> Self {
        Self {
            index,
            id,
            code: error.code,
            message: error.message,
            severity: error.severity,
        }
    }

    fn store_failure(index: usize, id: &str, err: &crate::Error) -> Self {
        Self {
            index,
            id: Some(id.to_string()),
            code: "persistence_error".to_string(),
            message: err.to_string(),
            severity: Severity::High,
        }
    }
}

/// A successful (or, in dry-run, would-be) write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRecord {
    /// Source record index.
    pub index: usize,
    /// Id the prompt was stored under.
    pub id: String,
    /// Store operation performed.
    pub action: WriteAction,
}

/// Outcome of one batch, both lists ordered by source index.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Writes performed.
    pub written: Vec<PersistedRecord>,
    /// Items that failed.
    pub errors: Vec<RecordError>,
}

impl BatchOutcome {
    fn push(&mut self, result: Result<PersistedRecord, RecordError>) {
        match result {
            Ok(record) => self.written.push(record),
            Err(error) => self.errors.push(error),
        }
    }

    fn sort(&mut self) {
        self.written.sort_by_key(|r| r.index);
        self.errors.sort_by_key(|e| e.index);
    }
}

/// Persists `items` to `store`.
///
/// Sequential mode writes in input order. Parallel mode spawns one task per
/// item, bounded by `max_concurrency` permits; results are re-ordered by
/// source index before returning.
pub async fn persist_batch<S>(
    store: &Arc<S>,
    items: Vec<ResolvedPrompt>,
    options: PersistOptions,
) -> BatchOutcome
where
    S: PromptStore + ?Sized + 'static,
{
    let mut outcome = BatchOutcome::default();

    if !options.parallel || items.len() < 2 {
        for item in items {
            outcome.push(persist_one(store.as_ref(), item, options));
        }
        return outcome;
    }

    let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut in_flight = HashMap::new();

    for item in items {
        let store = Arc::clone(store);
        let semaphore = Arc::clone(&semaphore);
        let (index, id) = (item.index, item.prompt.id.clone());
        let handle = tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            persist_one(store.as_ref(), item, options)
        });
        in_flight.insert(handle.id(), (index, id));
    }

    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((_, result)) => outcome.push(result),
            Err(e) => {
                let (index, id) = in_flight.remove(&e.id()).unwrap_or_default();
                tracing::error!(index, id = %id, error = %e, "Persist task failed");
                outcome.errors.push(RecordError {
                    index,
                    id: Some(id),
                    code: "internal_error".to_string(),
                    message: format!("Persist task failed: {e}"),
                    severity: Severity::Critical,
                });
            },
        }
    }

    outcome.sort();
    outcome
}

fn persist_one<S: PromptStore + ?Sized>(
    store: &S,
    item: ResolvedPrompt,
    options: PersistOptions,
) -> Result<PersistedRecord, RecordError> {
    let ResolvedPrompt {
        index,
        mut prompt,
        action,
    } = item;

    check_prompt(&prompt)
        .map_err(|e| RecordError::from_integrity(index, Some(prompt.id.clone()), e))?;

    if action == WriteAction::Insert && !options.preserve_ids {
        prompt.id = mint_prompt_id();
    }
    let id = prompt.id.clone();

    if !options.dry_run {
        match action {
            WriteAction::Insert | WriteAction::Rename => {
                let inserted = store
                    .try_insert(prompt)
                    .map_err(|e| RecordError::store_failure(index, &id, &e))?;
                if !inserted {
                    return Err(RecordError {
                        index,
                        id: Some(id.clone()),
                        code: "duplicate_id".to_string(),
                        message: format!("A prompt with id '{id}' was stored concurrently"),
                        severity: Severity::High,
                    });
                }
            },
            WriteAction::Overwrite | WriteAction::Merge => {
                store
                    .upsert(prompt)
                    .map_err(|e| RecordError::store_failure(index, &id, &e))?;
            },
        }
    }

    tracing::trace!(index, id = %id, ?action, dry_run = options.dry_run, "Persisted prompt");
    Ok(PersistedRecord { index, id, action })
}
