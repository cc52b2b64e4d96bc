//! Prompt store trait definition.

use crate::Result;
use crate::models::Prompt;
use crate::storage::locks::IdentityLocks;

/// Keyed store of canonical prompts.
///
/// The import pipeline depends only on this trait. Implementations must
/// support concurrent point lookups and make [`try_insert`](Self::try_insert)
/// an atomic compare-and-insert per id.
pub trait PromptStore: Send + Sync {
    /// Gets a prompt by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be accessed.
    fn get(&self, id: &str) -> Result<Option<Prompt>>;

    /// Inserts a prompt only if no prompt with the same id exists.
    ///
    /// Returns `false` (and leaves the store untouched) when the id is taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be accessed.
    fn try_insert(&self, prompt: Prompt) -> Result<bool>;

    /// Inserts or replaces a prompt, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be accessed.
    fn upsert(&self, prompt: Prompt) -> Result<Option<Prompt>>;

    /// Returns the number of stored prompts.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be accessed.
    fn len(&self) -> Result<usize>;

    /// Returns all stored prompts ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be accessed.
    fn list(&self) -> Result<Vec<Prompt>>;

    /// Per-identity locks used to serialize read-then-write sequences.
    fn identity_locks(&self) -> &IdentityLocks;

    /// Returns whether a prompt with `id` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be accessed.
    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Returns whether the store is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be accessed.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
