use std::path::{Path, PathBuf};

use super::store::OntologyStore;
use super::types::ReferenceSnapshot;
use super::StoreError;

/// Source of the taxonomy and reference corpus. Called once at startup.
pub trait ReferenceDataProvider {
    fn load(&self) -> Result<OntologyStore, StoreError>;
}

/// Reads a `ReferenceSnapshot` JSON document from disk.
pub struct JsonSnapshotProvider {
    path: PathBuf,
}

impl JsonSnapshotProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_snapshot(&self) -> Result<ReferenceSnapshot, StoreError> {
        let display = self.path.display().to_string();
        let json = std::fs::read_to_string(&self.path).map_err(|e| StoreError::Read {
            path: display.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&json).map_err(|e| StoreError::Parse {
            path: display,
            reason: e.to_string(),
        })
    }
}

impl ReferenceDataProvider for JsonSnapshotProvider {
    fn load(&self) -> Result<OntologyStore, StoreError> {
        tracing::info!(path = %self.path.display(), "Loading reference snapshot");
        OntologyStore::build(self.read_snapshot()?)
    }
}

/// Wraps a snapshot already in memory (tests, embedding callers).
pub struct InMemoryProvider {
    snapshot: ReferenceSnapshot,
}

impl InMemoryProvider {
    pub fn new(snapshot: ReferenceSnapshot) -> Self {
        Self { snapshot }
    }
}

impl ReferenceDataProvider for InMemoryProvider {
    fn load(&self) -> Result<OntologyStore, StoreError> {
        OntologyStore::build(self.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::fixtures;

    #[test]
    fn loads_snapshot_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, serde_json::to_string(&fixtures::snapshot()).unwrap()).unwrap();

        let store = JsonSnapshotProvider::new(&path).load().unwrap();
        assert_eq!(store.entity_count(), 5);
        assert_eq!(store.term_by_code("HP:0000252").unwrap().label, "Microcephaly");
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonSnapshotProvider::new(dir.path().join("absent.json"))
            .load()
            .unwrap_err();
        assert!(matches!(err, StoreError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonSnapshotProvider::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[test]
    fn in_memory_provider_builds() {
        let store = InMemoryProvider::new(fixtures::snapshot()).load().unwrap();
        assert!(store.term_id("HP:0001250").is_some());
    }

    #[test]
    fn corrupt_snapshot_never_yields_store() {
        let mut snapshot = fixtures::snapshot();
        snapshot.entities[0].annotated_terms.push("HP:1234567".into());
        assert!(InMemoryProvider::new(snapshot).load().is_err());
    }
}
