//! One-JSON-file-per-entity snapshot storage.
//!
//! Files are written to a temporary name and renamed into place, so a crash
//! mid-write never leaves a truncated snapshot behind.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ExtractionError, Result};
use crate::traits::store::SnapshotStore;
use crate::types::{entity::EntityId, snapshot::ExtractionSnapshot};

const EXTENSION: &str = "json";

/// Snapshot store backed by a directory of JSON files.
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(ExtractionError::storage)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &EntityId) -> PathBuf {
        self.root
            .join(format!("{}.{}", file_stem(id.as_str()), EXTENSION))
    }
}

/// Id with every character outside `[A-Za-z0-9._-]` replaced by `_`.
fn file_stem(id: &str) -> String {
    let stem: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    // Never produce a dot-file or a parent reference
    format!("_{}", stem.trim_start_matches('.'))
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn get_snapshot(&self, id: &EntityId) -> Result<Option<ExtractionSnapshot>> {
        let bytes = match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ExtractionError::storage(e)),
        };
        let snapshot: ExtractionSnapshot = serde_json::from_slice(&bytes)?;
        Ok((snapshot.entity_id == *id).then_some(snapshot))
    }

    async fn store_snapshot(&self, snapshot: &ExtractionSnapshot) -> Result<()> {
        let path = self.path_for(&snapshot.entity_id);
        let mut tmp = path.clone();
        tmp.set_extension("tmp");

        let data = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(ExtractionError::storage)?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(ExtractionError::storage)?;
        debug!(path = %path.display(), bytes = data.len(), "Snapshot written");
        Ok(())
    }

    async fn delete_snapshot(&self, id: &EntityId) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ExtractionError::storage(e)),
        }
    }

    async fn list_ids(&self) -> Result<Vec<EntityId>> {
        let mut ids = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(ExtractionError::storage)?;

        while let Some(entry) = dir.next_entry().await.map_err(ExtractionError::storage)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(ExtractionError::storage)?;
            let snapshot: ExtractionSnapshot = serde_json::from_slice(&bytes)?;
            ids.push(snapshot.entity_id);
        }
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
        let mut record = ManuscriptRecord::new(EntityId::new(id));
        record.title = Some(text.to_string());
        ExtractionSnapshot::new(
            record,
            ContentFingerprint::of_text(text),
            ExtractionReport::default(),
        )
    }

    #[tokio::test]
    async fn test_round_trip_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).await.unwrap();
        let id = EntityId::new("MF-2024-0001.R1");

        assert!(store.get_snapshot(&id).await.unwrap().is_none());

        let first = snapshot("MF-2024-0001.R1", "first");
        store.store_snapshot(&first).await.unwrap();
        assert_eq!(store.get_snapshot(&id).await.unwrap(), Some(first));

        let second = snapshot("MF-2024-0001.R1", "second");
        store.store_snapshot(&second).await.unwrap();
        let loaded = store.get_snapshot(&id).await.unwrap().unwrap();
        assert_eq!(loaded.record.title.as_deref(), Some("second"));
        assert_eq!(store.list_ids().await.unwrap(), vec![id.clone()]);

        store.delete_snapshot(&id).await.unwrap();
        store.delete_snapshot(&id).await.unwrap();
        assert!(store.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsafe_ids_stay_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path()).await.unwrap();

        let id = EntityId::new("../../etc/passwd");
        store.store_snapshot(&snapshot("../../etc/passwd", "x")).await.unwrap();

        assert_eq!(store.path_for(&id).parent(), Some(dir.path()));
        assert_eq!(store.list_ids().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_reopened_store_sees_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileSnapshotStore::open(dir.path()).await.unwrap();
            store.store_snapshot(&snapshot("MF-2024-0002", "a")).await.unwrap();
        }
        let store = FileSnapshotStore::open(dir.path()).await.unwrap();
        let ids = [EntityId::new("MF-2024-0002"), EntityId::new("MF-2024-0003")];
        assert_eq!(store.get_snapshots(&ids).await.unwrap().len(), 1);
    }
}
