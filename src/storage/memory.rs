//! In-memory prompt store.
//!
//! Uses `RwLock` for thread-safe access with reader-writer semantics.
//! Point lookups take the read lock; `try_insert` checks and inserts under a
//! single write lock so concurrent inserts of the same id cannot both win.

use crate::models::Prompt;
use crate::storage::locks::IdentityLocks;
use crate::storage::traits::PromptStore;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory [`PromptStore`].
///
/// # Example
///
/// ```rust
/// use promptport::models::{Category, Prompt};
/// use promptport::storage::{InMemoryPromptStore, PromptStore};
///
/// let store = InMemoryPromptStore::new();
/// let inserted = store
///     .try_insert(Prompt::new("p1", "proj", "Title", Category::General))
///     .unwrap_or(false);
/// assert!(inserted);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryPromptStore {
    prompts: RwLock<HashMap<String, Prompt>>,
    locks: IdentityLocks,
}

impl InMemoryPromptStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `prompts` (later duplicates replace earlier ones).
    #[must_use]
    pub fn with_prompts(prompts: impl IntoIterator<Item = Prompt>) -> Self {
        let map = prompts.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            prompts: RwLock::new(map),
            locks: IdentityLocks::new(),
        }
    }

    fn poisoned(operation: &str) -> Error {
        Error::OperationFailed {
            operation: operation.to_string(),
            cause: "Lock poisoned".to_string(),
        }
    }
}

impl PromptStore for InMemoryPromptStore {
    fn get(&self, id: &str) -> Result<Option<Prompt>> {
        let prompts = self.prompts.read().map_err(|_| Self::poisoned("get_prompt"))?;
        Ok(prompts.get(id).cloned())
    }

    fn try_insert(&self, prompt: Prompt) -> Result<bool> {
        let mut prompts = self
            .prompts
            .write()
            .map_err(|_| Self::poisoned("insert_prompt"))?;

        if prompts.contains_key(&prompt.id) {
            return Ok(false);
        }
        prompts.insert(prompt.id.clone(), prompt);
        Ok(true)
    }

    fn upsert(&self, prompt: Prompt) -> Result<Option<Prompt>> {
        let mut prompts = self
            .prompts
            .write()
            .map_err(|_| Self::poisoned("upsert_prompt"))?;
        Ok(prompts.insert(prompt.id.clone(), prompt))
    }

    fn len(&self) -> Result<usize> {
        let prompts = self.prompts.read().map_err(|_| Self::poisoned("count_prompts"))?;
        Ok(prompts.len())
    }

    fn list(&self) -> Result<Vec<Prompt>> {
        let prompts = self.prompts.read().map_err(|_| Self::poisoned("list_prompts"))?;
        let mut all: Vec<Prompt> = prompts.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    fn identity_locks(&self) -> &IdentityLocks {
        &self.locks
    }
}
