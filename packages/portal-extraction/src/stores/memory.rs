//! In-memory snapshot storage for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Result;
use crate::traits::store::SnapshotStore;
use crate::types::{entity::EntityId, snapshot::ExtractionSnapshot};

/// In-memory storage for snapshots.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<EntityId, ExtractionSnapshot>>,
    writes: RwLock<usize>,
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySnapshotStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            writes: RwLock::new(0),
        }
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.snapshots.write().unwrap().clear();
    }

    /// Get the number of stored snapshots.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.read().unwrap().len()
    }

    /// Total number of writes since creation.
    pub fn write_count(&self) -> usize {
        *self.writes.read().unwrap()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get_snapshot(&self, id: &EntityId) -> Result<Option<ExtractionSnapshot>> {
        Ok(self.snapshots.read().unwrap().get(id).cloned())
    }

    async fn store_snapshot(&self, snapshot: &ExtractionSnapshot) -> Result<()> {
        self.snapshots
            .write()
            .unwrap()
            .insert(snapshot.entity_id.clone(), snapshot.clone());
        *self.writes.write().unwrap() += 1;
        Ok(())
    }

    async fn delete_snapshot(&self, id: &EntityId) -> Result<()> {
        self.snapshots.write().unwrap().remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<EntityId>> {
        let mut ids: Vec<_> = self.snapshots.read().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::ManuscriptRecord;
    use crate::types::snapshot::{ContentFingerprint, ExtractionReport};

    fn snapshot(id: &str, text: &str) -> ExtractionSnapshot {
        ExtractionSnapshot::new(
            ManuscriptRecord::new(EntityId::new(id)),
            ContentFingerprint::of_text(text),
            ExtractionReport::default(),
        )
    }

    #[tokio::test]
    async fn test_snapshot_crud() {
        let store = MemorySnapshotStore::new();
        let id = EntityId::new("MF-2024-0001");

        // Store
        store.store_snapshot(&snapshot("MF-2024-0001", "v1")).await.unwrap();
        assert_eq!(store.snapshot_count(), 1);

        // Get
        let retrieved = store.get_snapshot(&id).await.unwrap();
        assert_eq!(
            retrieved.unwrap().content_fingerprint,
            ContentFingerprint::of_text("v1")
        );

        // Replace
        store.store_snapshot(&snapshot("MF-2024-0001", "v2")).await.unwrap();
        assert_eq!(store.snapshot_count(), 1);
        assert_eq!(store.write_count(), 2);

        // Delete
        store.delete_snapshot(&id).await.unwrap();
        assert_eq!(store.snapshot_count(), 0);
    }

    #[tokio::test]
    async fn test_list_and_batch_get() {
        let store = MemorySnapshotStore::new();
        store.store_snapshot(&snapshot("B-1", "b")).await.unwrap();
        store.store_snapshot(&snapshot("A-1", "a")).await.unwrap();

        let ids = store.list_ids().await.unwrap();
        assert_eq!(ids, vec![EntityId::new("A-1"), EntityId::new("B-1")]);

        let found = store
            .get_snapshots(&[EntityId::new("A-1"), EntityId::new("missing")])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
