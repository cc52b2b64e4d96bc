//! Per-identity async locks.
//!
//! Conflict resolution reads the store and persistence later writes it. Two
//! imports touching the same id must not interleave between those steps, so
//! the import service holds an [`IdentityGuard`] over every candidate id for
//! the duration of both.
//!
//! Locks are always acquired in sorted id order, which rules out lock-order
//! deadlocks between jobs with overlapping id sets.

use crate::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-id async mutexes.
#[derive(Debug, Default)]
pub struct IdentityLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Holds the locks for a set of ids until dropped.
#[derive(Debug)]
pub struct IdentityGuard {
    ids: Vec<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl IdentityGuard {
    /// Ids covered by this guard, sorted.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

impl IdentityLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the locks for every id in `ids`.
    ///
    /// Duplicate ids are collapsed. Waits for any other guard holding one of
    /// the ids to be dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry mutex is poisoned.
    pub async fn acquire<I, S>(&self, ids: I) -> Result<IdentityGuard>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ordered: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        let handles = self.handles_for(&ordered)?;

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }

        Ok(IdentityGuard {
            ids: ordered.into_iter().collect(),
            _guards: guards,
        })
    }

    /// Number of ids currently tracked (held, awaited, or not yet pruned).
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    fn handles_for(&self, ids: &BTreeSet<String>) -> Result<Vec<Arc<AsyncMutex<()>>>> {
        let mut locks = self.locks.lock().map_err(|_| Error::OperationFailed {
            operation: "identity_locks".to_string(),
            cause: "Lock poisoned".to_string(),
        })?;

        // Entries only referenced by the map are idle.
        locks.retain(|_, handle| Arc::strong_count(handle) > 1);

        Ok(ids
            .iter()
            .map(|id| Arc::clone(locks.entry(id.clone()).or_default()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_guard_sorts_and_dedupes() {
        let locks = IdentityLocks::new();
        let guard = locks.acquire(["b", "a", "b"]).await.unwrap();
        assert_eq!(guard.ids(), ["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_overlapping_guards_serialize() {
        let locks = Arc::new(IdentityLocks::new());
        let first = locks.acquire(["shared", "x"]).await.unwrap();

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire(["shared"]).await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        let joined = tokio::time::timeout(Duration::from_secs(1), contender).await;
        assert!(matches!(joined, Ok(Ok(Ok(())))));
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = IdentityLocks::new();
        drop(locks.acquire(["a", "b", "c"]).await.unwrap());
        let _held = locks.acquire(["d"]).await.unwrap();
        assert_eq!(locks.tracked(), 1);
    }
}
