//! Resilient Record Extraction for Editorial Portals
//!
//! Extracts structured manuscript records (people, metadata, documents,
//! version history, audit trail) from legacy browser-rendered portals that
//! expose no API.
//!
//! # Design Philosophy
//!
//! **"Survive the session, never lie about completeness"**
//!
//! - Every pass is isolated: one broken section never sinks the record
//! - Sessions die; recovery is a first-class state transition
//! - Unchanged entities are never parsed twice
//! - Partial records are marked partial
//!
//! # Usage
//!
//! ```rust,ignore
//! use portal_extraction::{
//!     ChangeAwareCache, ExtractionConfig, ExtractionOrchestrator, FileSnapshotStore,
//!     FormAuthenticator, PortalConfig, PortalCredentials, SessionMonitor,
//! };
//!
//! let portal = PortalConfig::from_path("portals/mf.json")?;
//! let credentials = PortalCredentials::from_env("MF").expect("credentials");
//! let auth = FormAuthenticator::new(portal.login_url(), portal.login.clone(), credentials);
//!
//! let config = ExtractionConfig::default();
//! let monitor = SessionMonitor::new(driver, Box::new(auth));
//! let cache = ChangeAwareCache::new(FileSnapshotStore::open("cache/mf").await?);
//!
//! let mut orchestrator = ExtractionOrchestrator::new(portal, config, monitor, cache)?;
//! let report = orchestrator
//!     .run_journal(&["awaiting-reviewer-scores".to_string()])
//!     .await;
//! for line in report.errors() {
//!     eprintln!("{}", line);
//! }
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator abstractions (Driver, Authenticator, SnapshotStore)
//! - [`types`] - Records, snapshots and configuration
//! - [`pipeline`] - Retry, session, cache, listing, history, resolver, passes
//! - [`stores`] - Snapshot storage implementations
//! - [`security`] - Credential handling
//! - [`testing`] - Scripted mock driver and page builders

pub mod error;
pub mod pipeline;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{AuthError, DriverError, ErrorSeverity, ExtractionError, Result};
pub use pipeline::{
    CacheStats, Candidate, CandidateSource, CategoryReport, ChangeAwareCache, EntityExtraction,
    EntityResolver, ExtractionOrchestrator, Freshness, JournalJob, JournalReport, ListCollector,
    Listing, PaginatedHistoryReader, RetryExecutor, RunReport, Runner, SessionMonitor,
    SessionState,
};
pub use security::PortalCredentials;
pub use stores::{FileSnapshotStore, MemorySnapshotStore};
pub use traits::{
    auth::{Authenticator, FormAuthenticator, NoSecondFactor, SecondFactorProvider},
    driver::{Driver, ElementHandle, Locator},
    store::SnapshotStore,
};
pub use types::{
    audit::{AuditEvent, EventType},
    config::{
        ExtractionConfig, HistoryConfig, PortalConfig, ResolverConfig, RetryPolicy, RunConfig,
    },
    entity::EntityId,
    person::{PersonDates, PersonRecord, PersonRole},
    record::{DocumentKind, Documents, ManuscriptRecord, StatusDetails, VersionEntry},
    snapshot::{ContentFingerprint, ExtractionReport, ExtractionSnapshot, PassKind, PassStatus},
};

#[cfg(feature = "sqlite")]
pub use stores::SqliteSnapshotStore;
