//! Storage trait for extraction snapshots.
//!
//! A simple keyed snapshot store: one snapshot per entity id, written whole.
//! Entities are independent, so no cross-key consistency is required.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{entity::EntityId, snapshot::ExtractionSnapshot};

/// Keyed persistence for snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Get the stored snapshot for an entity.
    async fn get_snapshot(&self, id: &EntityId) -> Result<Option<ExtractionSnapshot>>;

    /// Store a snapshot, replacing any previous one for the same entity.
    async fn store_snapshot(&self, snapshot: &ExtractionSnapshot) -> Result<()>;

    /// Delete the snapshot for an entity.
    async fn delete_snapshot(&self, id: &EntityId) -> Result<()>;

    /// Ids of every stored snapshot.
    async fn list_ids(&self) -> Result<Vec<EntityId>>;

    /// Get snapshots for several entities, skipping missing ones.
    async fn get_snapshots(&self, ids: &[EntityId]) -> Result<Vec<ExtractionSnapshot>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(snapshot) = self.get_snapshot(id).await? {
                out.push(snapshot);
            }
        }
        Ok(out)
    }
}

// Shared stores: several journal sessions write to one store.
#[async_trait]
impl<T: SnapshotStore + ?Sized> SnapshotStore for Arc<T> {
    async fn get_snapshot(&self, id: &EntityId) -> Result<Option<ExtractionSnapshot>> {
        (**self).get_snapshot(id).await
    }

    async fn store_snapshot(&self, snapshot: &ExtractionSnapshot) -> Result<()> {
        (**self).store_snapshot(snapshot).await
    }

    async fn delete_snapshot(&self, id: &EntityId) -> Result<()> {
        (**self).delete_snapshot(id).await
    }

    async fn list_ids(&self) -> Result<Vec<EntityId>> {
        (**self).list_ids().await
    }
}
