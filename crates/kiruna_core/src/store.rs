//! Durable storage of diagram positions.
//!
//! This module defines the [`ConfigStore`] trait which abstracts over the
//! backends (a JSON document on disk, or memory) holding the shared
//! [`GraphConfiguration`].
//!
//! # Storage Model
//!
//! The configuration is a single document that is always read and written
//! wholesale. Every mutation is a read-modify-write of the whole document
//! performed under the store's lock, so readers never observe a partially
//! applied update. Concurrent edits to the same element resolve as
//! last-write-wins in the order they reach the lock.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::catalog::ElementCatalog;
use crate::error::KirunaError;
use crate::types::{ElementId, ElementType, GraphConfiguration, Position};

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, KirunaError>;

/// Trait for graph configuration storage backends.
pub trait ConfigStore: Send + Sync {
    /// Load the current configuration.
    ///
    /// If nothing has been persisted yet, an empty configuration is created
    /// and persisted before it is returned.
    fn load(&self) -> StoreResult<GraphConfiguration>;

    /// Apply `mutate` to the persisted configuration and write it back.
    ///
    /// The read, the mutation and the write happen under one lock. Returns
    /// the configuration as persisted.
    fn modify(
        &self,
        mutate: &mut dyn FnMut(&mut GraphConfiguration),
    ) -> StoreResult<GraphConfiguration>;

    /// Set the position of an element. Last write wins; there is no version
    /// check.
    fn edit(
        &self,
        element_type: ElementType,
        id: &ElementId,
        position: Position,
    ) -> StoreResult<()> {
        self.modify(&mut |config| {
            config.set(element_type, id.clone(), position);
        })?;
        Ok(())
    }

    /// Remove the position of an element.
    ///
    /// Removing an absent element is not an error. Returns whether an entry
    /// was removed.
    fn remove(&self, element_type: ElementType, id: &ElementId) -> StoreResult<bool> {
        let mut removed = false;
        self.modify(&mut |config| {
            removed = config.remove(element_type, id).is_some();
        })?;
        Ok(removed)
    }

    /// Restore the empty configuration.
    fn reset(&self) -> StoreResult<()> {
        self.modify(&mut |config| {
            *config = GraphConfiguration::new();
        })?;
        Ok(())
    }

    /// Remove every position whose element the catalog no longer knows.
    ///
    /// Returns the number of removed entries.
    fn prune(&self, catalog: &dyn ElementCatalog) -> StoreResult<usize> {
        let mut removed = 0;
        self.modify(&mut |config| {
            removed = config.retain(|element_type, id| catalog.contains(element_type, id));
        })?;
        Ok(removed)
    }
}

fn lock(guard: &Mutex<()>) -> MutexGuard<'_, ()> {
    // The file is replaced by rename, so a poisoned lock guards nothing torn.
    guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Configuration stored as a single JSON document on disk.
///
/// Writes go to a sibling temporary file which is synced and then renamed
/// over the target, so the document on disk is always complete.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store backed by the file at `path`.
    ///
    /// The file is not touched until the first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Read the document, creating it when missing. Caller holds the lock.
    fn read_locked(&self) -> StoreResult<GraphConfiguration> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(KirunaError::FileRead {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if content.trim().is_empty() {
            log::info!(
                "Creating empty graph configuration at {}",
                self.path.display()
            );
            let config = GraphConfiguration::new();
            self.write_locked(&config)?;
            return Ok(config);
        }

        serde_json::from_str(&content).map_err(|source| KirunaError::CorruptConfiguration {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the document on disk. Caller holds the lock.
    fn write_locked(&self, config: &GraphConfiguration) -> StoreResult<()> {
        let write_err = |source: std::io::Error| KirunaError::FileWrite {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let bytes = serde_json::to_vec_pretty(config)?;
        let temp_path = self.temp_path();

        let mut file = fs::File::create(&temp_path).map_err(write_err)?;
        file.write_all(&bytes).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(write_err)?;
        log::debug!(
            "Persisted graph configuration ({} elements) to {}",
            config.len(),
            self.path.display()
        );
        Ok(())
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> StoreResult<GraphConfiguration> {
        let _guard = lock(&self.guard);
        self.read_locked()
    }

    fn modify(
        &self,
        mutate: &mut dyn FnMut(&mut GraphConfiguration),
    ) -> StoreResult<GraphConfiguration> {
        let _guard = lock(&self.guard);
        let mut config = self.read_locked()?;
        mutate(&mut config);
        self.write_locked(&config)?;
        Ok(config)
    }
}

/// In-memory configuration store.
///
/// Data is lost when dropped; used by tests and ephemeral servers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    config: Mutex<GraphConfiguration>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `config`.
    pub fn with_configuration(config: GraphConfiguration) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    fn config(&self) -> MutexGuard<'_, GraphConfiguration> {
        self.config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self) -> StoreResult<GraphConfiguration> {
        Ok(self.config().clone())
    }

    fn modify(
        &self,
        mutate: &mut dyn FnMut(&mut GraphConfiguration),
    ) -> StoreResult<GraphConfiguration> {
        let mut config = self.config();
        mutate(&mut config);
        Ok(config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::KnownElements;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn file_store() -> (TempDir, JsonFileStore) {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("graph_configuration.json"));
        (dir, store)
    }

    #[test]
    fn test_load_creates_empty_document() {
        let (_dir, store) = file_store();
        assert!(!store.path().exists());

        let config = store.load().unwrap();

        assert!(config.is_empty());
        let on_disk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert!(on_disk["nodes"].as_object().unwrap().is_empty());
        assert!(on_disk["connections"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_load_creates_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("data/graph/config.json"));

        store.load().unwrap();

        assert!(store.path().exists());
    }

    #[test]
    fn test_last_write_wins() {
        let (_dir, store) = file_store();
        let id = ElementId::from("7");

        store
            .edit(ElementType::Nodes, &id, Position::new(0.1, 0.1))
            .unwrap();
        store
            .edit(ElementType::Nodes, &id, Position::new(0.9, 0.9))
            .unwrap();

        let config = store.load().unwrap();
        assert_eq!(
            config.get(ElementType::Nodes, &id),
            Some(Position::new(0.9, 0.9))
        );
        assert_eq!(config.len(), 1);
    }

    #[test]
    fn test_edits_survive_reopen() {
        let (dir, store) = file_store();
        store
            .edit(ElementType::Connections, &"3".into(), Position::new(12.0, -4.5))
            .unwrap();
        drop(store);

        let reopened = JsonFileStore::new(dir.path().join("graph_configuration.json"));
        let config = reopened.load().unwrap();

        assert_eq!(
            config.get(ElementType::Connections, &"3".into()),
            Some(Position::new(12.0, -4.5))
        );
        assert!(config.nodes.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (_dir, store) = file_store();
        store
            .edit(ElementType::Nodes, &"1".into(), Position::new(1.0, 1.0))
            .unwrap();
        let before = store.load().unwrap();

        let removed = store.remove(ElementType::Nodes, &"99".into()).unwrap();

        assert!(!removed);
        assert_eq!(store.load().unwrap(), before);
        assert!(store.remove(ElementType::Nodes, &"1".into()).unwrap());
        assert!(!store.remove(ElementType::Nodes, &"1".into()).unwrap());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_reset_restores_empty_sub_maps() {
        let (_dir, store) = file_store();
        store
            .edit(ElementType::Nodes, &"1".into(), Position::new(1.0, 1.0))
            .unwrap();
        store
            .edit(ElementType::Connections, &"2".into(), Position::new(2.0, 2.0))
            .unwrap();

        store.reset().unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        let on_disk: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(on_disk, serde_json::json!({ "nodes": {}, "connections": {} }));
    }

    #[test]
    fn test_prune_removes_orphans_only() {
        let (_dir, store) = file_store();
        store
            .edit(ElementType::Nodes, &"1".into(), Position::new(1.0, 1.0))
            .unwrap();
        store
            .edit(ElementType::Nodes, &"2".into(), Position::new(2.0, 2.0))
            .unwrap();
        store
            .edit(ElementType::Connections, &"5".into(), Position::new(3.0, 3.0))
            .unwrap();

        let catalog = KnownElements::new().with(ElementType::Nodes, "1");
        let removed = store.prune(&catalog).unwrap();

        assert_eq!(removed, 2);
        let config = store.load().unwrap();
        assert_eq!(config.len(), 1);
        assert!(config.get(ElementType::Nodes, &"1".into()).is_some());
    }

    #[test]
    fn test_partial_document_loads_both_keys() {
        let (_dir, store) = file_store();
        fs::write(store.path(), r#"{"nodes":{"4":{"x":1.0,"y":2.0}}}"#).unwrap();

        let config = store.load().unwrap();

        assert_eq!(config.nodes.len(), 1);
        assert!(config.connections.is_empty());
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let (_dir, store) = file_store();
        fs::write(store.path(), "{ not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, KirunaError::CorruptConfiguration { .. }));

        let err = store
            .edit(ElementType::Nodes, &"1".into(), Position::new(0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, KirunaError::CorruptConfiguration { .. }));
        // The corrupt document is left for inspection rather than overwritten.
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "{ not json");
    }

    #[test]
    fn test_concurrent_edits_to_disjoint_ids_all_persist() {
        let (_dir, store) = file_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .edit(
                            ElementType::Nodes,
                            &ElementId::from(i),
                            Position::new(i as f64, i as f64),
                        )
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let config = store.load().unwrap();
        assert_eq!(config.nodes.len(), 8);
    }

    #[test]
    fn test_memory_store_behaves_like_file_store() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_empty());

        store
            .edit(ElementType::Nodes, &"7".into(), Position::new(0.3, 0.6))
            .unwrap();
        assert!(!store.remove(ElementType::Connections, &"7".into()).unwrap());

        let config = store.load().unwrap();
        assert_eq!(
            config.get(ElementType::Nodes, &"7".into()),
            Some(Position::new(0.3, 0.6))
        );

        store.reset().unwrap();
        assert!(store.load().unwrap().is_empty());
    }
}
