//! Extraction snapshots and per-pass reports.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::types::entity::EntityId;
use crate::types::record::ManuscriptRecord;
use crate::types::text::html_to_text;

/// The fixed sequence of passes run for each entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    People,
    Metadata,
    Documents,
    VersionHistory,
    AuditTrail,
    DerivedStatus,
}

impl PassKind {
    /// Passes in execution order. Later passes rely on navigation state
    /// left by earlier ones.
    pub const ORDER: [PassKind; 6] = [
        PassKind::People,
        PassKind::Metadata,
        PassKind::Documents,
        PassKind::VersionHistory,
        PassKind::AuditTrail,
        PassKind::DerivedStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PassKind::People => "people",
            PassKind::Metadata => "metadata",
            PassKind::Documents => "documents",
            PassKind::VersionHistory => "version_history",
            PassKind::AuditTrail => "audit_trail",
            PassKind::DerivedStatus => "derived_status",
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PassStatus {
    Completed,
    Failed { error: String },
    Skipped { reason: String },
}

/// Outcome of one pass for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassOutcome {
    pub pass: PassKind,
    #[serde(flatten)]
    pub status: PassStatus,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl PassOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == PassStatus::Completed
    }
}

/// What happened while building a record.
///
/// A record is only trustworthy as complete when every pass completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub passes: Vec<PassOutcome>,
    pub recoveries: u32,
    pub budget_exhausted: bool,
}

impl ExtractionReport {
    pub fn record(&mut self, outcome: PassOutcome) {
        self.passes.push(outcome);
    }

    /// Every pass in the fixed order ran to completion.
    pub fn is_complete(&self) -> bool {
        !self.budget_exhausted
            && PassKind::ORDER
                .iter()
                .all(|kind| self.passes.iter().any(|p| p.pass == *kind && p.is_completed()))
    }

    /// Human-readable error lines for failed or skipped passes.
    pub fn errors(&self) -> Vec<String> {
        self.passes
            .iter()
            .filter_map(|p| match &p.status {
                PassStatus::Completed => None,
                PassStatus::Failed { error } => Some(format!("{} failed: {}", p.pass, error)),
                PassStatus::Skipped { reason } => Some(format!("{} skipped: {}", p.pass, reason)),
            })
            .collect()
    }

    pub fn outcome(&self, pass: PassKind) -> Option<&PassOutcome> {
        self.passes.iter().find(|p| p.pass == pass)
    }
}

/// Hash of an entity's raw page content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFingerprint(pub String);

impl ContentFingerprint {
    /// SHA-256 of the visible page text with volatile fragments removed.
    pub fn compute(page_source: &str, volatile: &[Regex]) -> Self {
        let mut text = html_to_text(page_source);
        for pattern in volatile {
            text = pattern.replace_all(&text, "").into_owned();
        }
        Self::of_text(&text)
    }

    /// SHA-256 of already-extracted text.
    pub fn of_text(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A captured, normalized record plus the fingerprint it was built from.
///
/// Snapshots are replaced wholesale, never merged field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSnapshot {
    pub entity_id: EntityId,
    pub content_fingerprint: ContentFingerprint,
    pub captured_at: DateTime<Utc>,
    pub record: ManuscriptRecord,
    #[serde(default)]
    pub report: ExtractionReport,
}

impl ExtractionSnapshot {
    pub fn new(
        record: ManuscriptRecord,
        content_fingerprint: ContentFingerprint,
        report: ExtractionReport,
    ) -> Self {
        Self {
            entity_id: record.id.clone(),
            content_fingerprint,
            captured_at: Utc::now(),
            record,
            report,
        }
    }

    /// Whether every pass completed.
    pub fn is_complete(&self) -> bool {
        self.report.is_complete()
    }
}
