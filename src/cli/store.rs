//! JSON file persistence for the command-line store.
//!
//! The CLI keeps prompts in a single JSON array sorted by id. It is loaded
//! into an [`InMemoryPromptStore`] before a command runs and written back
//! afterwards.

use crate::io::ImportSourceFormat;
use crate::io::formats::read_records;
use crate::models::Prompt;
use crate::storage::{InMemoryPromptStore, PromptStore};
use crate::{Error, Result};
use std::path::Path;

/// Default store file.
pub const DEFAULT_STORE_FILE: &str = "prompts.store.json";

/// Reads prompts from a JSON file.
///
/// Accepts a bare array, a native export package, a single prompt, or
/// newline-delimited prompts.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a record is not a prompt.
pub fn load_prompts(path: &Path) -> Result<Vec<Prompt>> {
    let bytes = std::fs::read(path).map_err(|e| Error::OperationFailed {
        operation: "read_prompts".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    read_records(&bytes, ImportSourceFormat::Native)?
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            serde_json::from_value(record).map_err(|e| {
                Error::InvalidInput(format!("{} record {index}: {e}", path.display()))
            })
        })
        .collect()
}

/// Opens the store at `path`; a missing file yields an empty store.
///
/// # Errors
///
/// Returns an error if an existing file cannot be loaded.
pub fn read_store(path: &Path) -> Result<InMemoryPromptStore> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Store file not found, starting empty");
        return Ok(InMemoryPromptStore::new());
    }
    let prompts = load_prompts(path)?;
    tracing::debug!(path = %path.display(), prompts = prompts.len(), "Loaded store");
    Ok(InMemoryPromptStore::with_prompts(prompts))
}

/// Writes every prompt in `store` to `path`.
///
/// Writes a sibling temporary file first and renames it into place.
///
/// # Errors
///
/// Returns an error if the store cannot be listed or the file cannot be written.
pub fn write_store<S: PromptStore + ?Sized>(path: &Path, store: &S) -> Result<()> {
    let prompts = store.list()?;
    let bytes = serde_json::to_vec_pretty(&prompts).map_err(|e| Error::OperationFailed {
        operation: "serialize_store".to_string(),
        cause: e.to_string(),
    })?;

    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    std::fs::write(&staging, &bytes)?;
    std::fs::rename(&staging, path)?;
    tracing::debug!(path = %path.display(), prompts = prompts.len(), "Saved store");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    #[test]
    fn test_missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = read_store(&dir.path().join("none.json")).unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_store_survives_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = InMemoryPromptStore::with_prompts([
            Prompt::new("b", "proj", "Second", Category::Animation),
            Prompt::new("a", "proj", "First", Category::General),
        ]);

        write_store(&path, &store).unwrap();
        let reloaded = read_store(&path).unwrap();

        let ids: Vec<_> = reloaded.list().unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(!dir.path().join("store.json.tmp").exists());
    }

    #[test]
    fn test_load_prompts_from_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("package.json");
        std::fs::write(
            &path,
            r#"{"exportId":"x","prompts":[{"id":"a","projectId":"p","version":"1.0.0","metadata":{"title":"T","category":"general"}}]}"#,
        )
        .unwrap();

        let prompts = load_prompts(&path).unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].metadata.title, "T");
    }

    #[test]
    fn test_load_prompts_rejects_non_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"[{"id": 1}]"#).unwrap();
        assert!(load_prompts(&path).is_err());
    }
}
