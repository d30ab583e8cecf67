//! SQLite snapshot storage.
//!
//! A file-based storage backend using SQLite. Good for:
//! - Long-running deployments that revisit the same journals
//! - Inspecting cached snapshots with ordinary SQL tooling

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::error::{ExtractionError, Result};
use crate::traits::store::SnapshotStore;
use crate::types::{entity::EntityId, snapshot::ExtractionSnapshot};

/// SQLite-based snapshot store.
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite://./snapshots.db?mode=rwc` - Create if not exists
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(ExtractionError::storage)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> Result<Self> {
        // One connection: every pooled connection would get its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(ExtractionError::storage)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                entity_id TEXT PRIMARY KEY,
                content_fingerprint TEXT NOT NULL,
                captured_at TEXT NOT NULL,
                complete INTEGER NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_snapshots_complete ON snapshots(complete);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Ids whose stored snapshot is missing at least one pass.
    pub async fn incomplete_ids(&self) -> Result<Vec<EntityId>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT entity_id FROM snapshots WHERE complete = 0 ORDER BY entity_id")
                .fetch_all(&self.pool)
                .await
                .map_err(ExtractionError::storage)?;
        Ok(rows.into_iter().map(|(id,)| EntityId::new(id)).collect())
    }
}

#[derive(Debug, FromRow)]
struct SnapshotRow {
    payload: String,
}

impl SnapshotRow {
    fn into_snapshot(self) -> Result<ExtractionSnapshot> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn get_snapshot(&self, id: &EntityId) -> Result<Option<ExtractionSnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT payload FROM snapshots WHERE entity_id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        match row {
            Some(r) => Ok(Some(r.into_snapshot()?)),
            None => Ok(None),
        }
    }

    async fn store_snapshot(&self, snapshot: &ExtractionSnapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot)?;

        sqlx::query(
            r#"
            INSERT INTO snapshots (entity_id, content_fingerprint, captured_at, complete, payload)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(entity_id) DO UPDATE SET
                content_fingerprint = excluded.content_fingerprint,
                captured_at = excluded.captured_at,
                complete = excluded.complete,
                payload = excluded.payload
            "#,
        )
        .bind(snapshot.entity_id.as_str())
        .bind(snapshot.content_fingerprint.as_str())
        .bind(snapshot.captured_at.to_rfc3339())
        .bind(snapshot.is_complete())
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(ExtractionError::storage)?;

        Ok(())
    }

    async fn delete_snapshot(&self, id: &EntityId) -> Result<()> {
        sqlx::query("DELETE FROM snapshots WHERE entity_id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(ExtractionError::storage)?;
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<EntityId>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT entity_id FROM snapshots ORDER BY entity_id")
                .fetch_all(&self.pool)
                .await
                .map_err(ExtractionError::storage)?;
        Ok(rows.into_iter().map(|(id,)| EntityId::new(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::ManuscriptRecord;
    use crate::types::snapshot::{
        ContentFingerprint, ExtractionReport, PassKind, PassOutcome, PassStatus,
    };

    async fn test_store() -> SqliteSnapshotStore {
        SqliteSnapshotStore::in_memory().await.unwrap()
    }

    fn snapshot(id: &str, complete: bool) -> ExtractionSnapshot {
        let mut report = ExtractionReport::default();
        for pass in PassKind::ORDER {
            let status = if complete || pass != PassKind::Documents {
                PassStatus::Completed
            } else {
                PassStatus::Failed {
                    error: "documents: link has no href".into(),
                }
            };
            report.record(PassOutcome {
                pass,
                status,
                attempts: 1,
                duration_ms: 3,
            });
        }
        ExtractionSnapshot::new(
            ManuscriptRecord::new(EntityId::new(id)),
            ContentFingerprint::of_text(id),
            report,
        )
    }

    #[tokio::test]
    async fn test_snapshot_storage() {
        let store = test_store().await;
        let s = snapshot("MF-2024-0001", true);
        store.store_snapshot(&s).await.unwrap();

        let loaded = store.get_snapshot(&s.entity_id).await.unwrap();
        assert_eq!(loaded, Some(s));
        assert!(store
            .get_snapshot(&EntityId::new("MF-2024-0404"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_upsert_and_incomplete_ids() {
        let store = test_store().await;
        store.store_snapshot(&snapshot("MF-2024-0002", false)).await.unwrap();
        store.store_snapshot(&snapshot("MF-2024-0001", true)).await.unwrap();
        assert_eq!(
            store.incomplete_ids().await.unwrap(),
            vec![EntityId::new("MF-2024-0002")]
        );

        store.store_snapshot(&snapshot("MF-2024-0002", true)).await.unwrap();
        assert!(store.incomplete_ids().await.unwrap().is_empty());
        assert_eq!(store.list_ids().await.unwrap().len(), 2);

        store.delete_snapshot(&EntityId::new("MF-2024-0001")).await.unwrap();
        assert_eq!(
            store.list_ids().await.unwrap(),
            vec![EntityId::new("MF-2024-0002")]
        );
    }
}
