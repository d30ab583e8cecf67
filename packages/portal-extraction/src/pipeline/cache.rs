//! Change-aware snapshot cache.
//!
//! The fingerprint is computed from the detail page before any parsing, so an
//! unchanged entity skips the whole multi-pass pipeline.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::error::{ExtractionError, Result};
use crate::traits::store::SnapshotStore;
use crate::types::{
    entity::EntityId,
    snapshot::{ContentFingerprint, ExtractionSnapshot},
};

/// Why an entity needs extracting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// Never extracted
    Missing,
    /// Remote content changed
    FingerprintChanged,
    /// Caller forced a refresh
    Forced,
    /// Previous extraction had failed passes
    Incomplete,
    /// Stored snapshot could not be decoded, e.g. an older layout
    Unreadable,
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone)]
pub enum Freshness {
    /// The stored snapshot is current and complete.
    Fresh(Box<ExtractionSnapshot>),
    /// Extraction must run. `previous` is the old snapshot, if any.
    Stale {
        reason: StaleReason,
        previous: Option<Box<ExtractionSnapshot>>,
    },
}

impl Freshness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Freshness::Stale { .. })
    }
}

/// Counters for one cache instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

/// Fingerprint-keyed front for a [`SnapshotStore`].
///
/// Snapshots are written whole; nothing here merges old and new records.
pub struct ChangeAwareCache<S: SnapshotStore> {
    store: S,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl<S: SnapshotStore> ChangeAwareCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn get(&self, id: &EntityId) -> Result<Option<ExtractionSnapshot>> {
        self.store.get_snapshot(id).await
    }

    /// Persist a snapshot, replacing any previous one.
    pub async fn put(&self, snapshot: &ExtractionSnapshot) -> Result<()> {
        self.store.store_snapshot(snapshot).await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!(
            entity = %snapshot.entity_id,
            fingerprint = %snapshot.content_fingerprint,
            complete = snapshot.is_complete(),
            "Snapshot stored"
        );
        Ok(())
    }

    /// Whether `id` must be re-extracted given its current fingerprint.
    pub async fn is_stale(
        &self,
        id: &EntityId,
        fingerprint: &ContentFingerprint,
        force_refresh: bool,
    ) -> Result<bool> {
        Ok(self.check(id, fingerprint, force_refresh).await?.is_stale())
    }

    /// Look up `id` and decide whether it is fresh. Updates hit/miss counters.
    pub async fn check(
        &self,
        id: &EntityId,
        fingerprint: &ContentFingerprint,
        force_refresh: bool,
    ) -> Result<Freshness> {
        // An undecodable snapshot is replaced, never fatal
        let (stored, unreadable) = match self.store.get_snapshot(id).await {
            Ok(stored) => (stored, false),
            Err(ExtractionError::JsonParse(e)) => {
                warn!(entity = %id, error = %e, "Stored snapshot unreadable, re-extracting");
                (None, true)
            }
            Err(e) => return Err(e),
        };

        let reason = match &stored {
            None if unreadable => Some(StaleReason::Unreadable),
            None => Some(StaleReason::Missing),
            Some(_) if force_refresh => Some(StaleReason::Forced),
            Some(s) if &s.content_fingerprint != fingerprint => Some(StaleReason::FingerprintChanged),
            Some(s) if !s.is_complete() => Some(StaleReason::Incomplete),
            Some(_) => None,
        };

        match (reason, stored) {
            (None, Some(snapshot)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                info!(entity = %id, "Cache hit, content unchanged");
                Ok(Freshness::Fresh(Box::new(snapshot)))
            }
            (reason, previous) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let reason = reason.unwrap_or(StaleReason::Missing);
                debug!(entity = %id, ?reason, "Cache miss");
                Ok(Freshness::Stale {
                    reason,
                    previous: previous.map(Box::new),
                })
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{FileSnapshotStore, MemorySnapshotStore};
    use crate::types::record::ManuscriptRecord;
    use crate::types::snapshot::{ExtractionReport, PassKind, PassOutcome, PassStatus};

    fn complete_report() -> ExtractionReport {
        let mut report = ExtractionReport::default();
        for pass in PassKind::ORDER {
            report.record(PassOutcome {
                pass,
                status: PassStatus::Completed,
                attempts: 1,
                duration_ms: 0,
            });
        }
        report
    }

    fn snapshot(id: &str, content: &str, report: ExtractionReport) -> ExtractionSnapshot {
        ExtractionSnapshot::new(
            ManuscriptRecord::new(EntityId::new(id)),
            ContentFingerprint::of_text(content),
            report,
        )
    }

    #[tokio::test]
    async fn test_missing_is_stale() {
        let cache = ChangeAwareCache::new(MemorySnapshotStore::new());
        let id = EntityId::new("MF-2024-0001");
        let fp = ContentFingerprint::of_text("v1");

        assert!(cache.is_stale(&id, &fp, false).await.unwrap());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_unchanged_is_fresh() {
        let cache = ChangeAwareCache::new(MemorySnapshotStore::new());
        let id = EntityId::new("MF-2024-0001");
        cache
            .put(&snapshot("MF-2024-0001", "v1", complete_report()))
            .await
            .unwrap();

        let fresh = cache
            .check(&id, &ContentFingerprint::of_text("v1"), false)
            .await
            .unwrap();
        assert!(matches!(fresh, Freshness::Fresh(_)));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 0, writes: 1 });
    }

    #[tokio::test]
    async fn test_changed_fingerprint_and_force_are_stale() {
        let cache = ChangeAwareCache::new(MemorySnapshotStore::new());
        let id = EntityId::new("MF-2024-0001");
        cache
            .put(&snapshot("MF-2024-0001", "v1", complete_report()))
            .await
            .unwrap();

        match cache
            .check(&id, &ContentFingerprint::of_text("v2"), false)
            .await
            .unwrap()
        {
            Freshness::Stale { reason, previous } => {
                assert_eq!(reason, StaleReason::FingerprintChanged);
                assert!(previous.is_some());
            }
            other => panic!("expected stale, got {:?}", other),
        }

        assert!(cache
            .is_stale(&id, &ContentFingerprint::of_text("v1"), true)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_incomplete_snapshot_is_always_stale() {
        let cache = ChangeAwareCache::new(MemorySnapshotStore::new());
        let id = EntityId::new("MF-2024-0001");
        let mut report = complete_report();
        report.passes[2].status = PassStatus::Failed {
            error: "malformed".into(),
        };
        cache
            .put(&snapshot("MF-2024-0001", "v1", report))
            .await
            .unwrap();

        match cache
            .check(&id, &ContentFingerprint::of_text("v1"), false)
            .await
            .unwrap()
        {
            Freshness::Stale { reason, .. } => assert_eq!(reason, StaleReason::Incomplete),
            other => panic!("expected stale, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_is_stale_and_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChangeAwareCache::new(FileSnapshotStore::open(dir.path()).await.unwrap());
        let id = EntityId::new("MF-2024-0001");
        let fp = ContentFingerprint::of_text("v1");
        std::fs::write(dir.path().join("_MF-2024-0001.json"), r#"{"entity_id":"#).unwrap();

        for force in [false, true] {
            match cache.check(&id, &fp, force).await.unwrap() {
                Freshness::Stale { reason, previous } => {
                    assert_eq!(reason, StaleReason::Unreadable);
                    assert!(previous.is_none());
                }
                other => panic!("expected stale, got {:?}", other),
            }
        }

        cache
            .put(&snapshot("MF-2024-0001", "v1", complete_report()))
            .await
            .unwrap();
        assert!(matches!(
            cache.check(&id, &fp, false).await.unwrap(),
            Freshness::Fresh(_)
        ));
        assert_eq!(cache.stats().misses, 2);
    }
}
