//! Export delivery targets.

use crate::io::traits::ExportDestination;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// An artifact captured by [`MemoryDestination`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredArtifact {
    /// Artifact name.
    pub name: String,
    /// Delivered bytes.
    pub bytes: Vec<u8>,
    /// Checksum the exporter declared.
    pub checksum: String,
}

/// Collects delivered artifacts in memory.
#[derive(Debug, Default)]
pub struct MemoryDestination {
    delivered: Mutex<Vec<DeliveredArtifact>>,
}

impl MemoryDestination {
    /// Creates an empty destination.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything delivered so far.
    #[must_use]
    pub fn delivered(&self) -> Vec<DeliveredArtifact> {
        self.delivered
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl ExportDestination for MemoryDestination {
    fn deliver(&self, name: &str, bytes: &[u8], checksum: &str) -> Result<()> {
        let mut delivered = self.delivered.lock().map_err(|_| Error::OperationFailed {
            operation: "deliver".to_string(),
            cause: "Lock poisoned".to_string(),
        })?;
        delivered.push(DeliveredArtifact {
            name: name.to_string(),
            bytes: bytes.to_vec(),
            checksum: checksum.to_string(),
        });
        Ok(())
    }
}

/// Writes artifacts into a directory, with a `<name>.sha256` file next to each.
#[derive(Debug, Clone)]
pub struct DirectoryDestination {
    root: PathBuf,
}

impl DirectoryDestination {
    /// Creates a destination rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Target directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ExportDestination for DirectoryDestination {
    fn deliver(&self, name: &str, bytes: &[u8], checksum: &str) -> Result<()> {
        if name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(Error::InvalidInput(format!("Invalid artifact name: {name}")));
        }
        std::fs::create_dir_all(&self.root)?;
        let path = self.root.join(name);
        std::fs::write(&path, bytes)?;
        std::fs::write(self.root.join(format!("{name}.sha256")), format!("{checksum}  {name}\n"))?;
        tracing::info!(path = %path.display(), size = bytes.len(), "Wrote export artifact");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_destination_records_deliveries() {
        let destination = MemoryDestination::new();
        destination.deliver("export.json", b"{}", "abc").unwrap();
        let delivered = destination.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].name, "export.json");
    }

    #[test]
    fn test_directory_destination_writes_checksum_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = DirectoryDestination::new(dir.path().join("out"));
        destination.deliver("export.csv", b"id\n", "deadbeef").unwrap();

        assert_eq!(std::fs::read(dir.path().join("out/export.csv")).unwrap(), b"id\n");
        let sidecar = std::fs::read_to_string(dir.path().join("out/export.csv.sha256")).unwrap();
        assert_eq!(sidecar, "deadbeef  export.csv\n");
    }

    #[test]
    fn test_directory_destination_rejects_paths() {
        let dir = tempfile::tempdir().unwrap();
        let destination = DirectoryDestination::new(dir.path());
        assert!(destination.deliver("../escape", b"x", "y").is_err());
    }
}
