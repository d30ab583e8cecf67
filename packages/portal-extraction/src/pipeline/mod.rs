//! Extraction pipeline - the core of the library.
//!
//! The pipeline composes:
//! - Retry with exponential backoff around every driver interaction
//! - Session health tracking and recovery
//! - Fingerprint-based snapshot caching
//! - Listing collection with a fallback strategy
//! - Paginated audit-trail reading with convergence detection
//! - Email-to-person resolution
//! - The ordered per-entity passes and the journal runner

pub mod cache;
pub mod history;
pub mod listing;
pub mod normalize;
pub mod orchestrator;
pub mod passes;
pub mod resolver;
pub mod retry;
pub mod run;
pub mod session;

pub use cache::{CacheStats, ChangeAwareCache, Freshness, StaleReason};
pub use history::{
    default_patterns, EventFilter, EventPattern, HistoryOutcome, PaginatedHistoryReader,
    Termination,
};
pub use listing::{ListCollector, Listing, ListingStrategy};
pub use normalize::{classify_roles, fold_people, normalize_record};
pub use orchestrator::{
    CategoryReport, EntityError, EntityExtraction, ExtractionOrchestrator, JournalReport,
};
pub use passes::{derive_status, run_pass, PassContext, PassData};
pub use resolver::{carry_forward_emails, Candidate, CandidateSource, EntityResolver};
pub use retry::{RetryExecutor, RetryOutcome};
pub use run::{JournalJob, RunReport, Runner};
pub use session::{SessionMonitor, SessionState};
