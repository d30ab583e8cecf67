//! The normalized per-entity output record.
//!
//! Field names are stable; downstream reporting reads them as-is.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::audit::AuditEvent;
use crate::types::entity::EntityId;
use crate::types::person::PersonRecord;

/// Kind of attached document, guessed from its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Manuscript,
    CoverLetter,
    ResponseToReviewers,
    RefereeReport,
    Supplementary,
    Other,
}

impl DocumentKind {
    pub fn classify(label: &str) -> Self {
        let l = label.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| l.contains(w));

        if has(&["cover letter"]) {
            DocumentKind::CoverLetter
        } else if has(&["response to review", "author response", "reply to review"]) {
            DocumentKind::ResponseToReviewers
        } else if has(&["referee report", "review report", "reviewer attachment", "report"]) {
            DocumentKind::RefereeReport
        } else if has(&["supplement", "appendix", "supporting"]) {
            DocumentKind::Supplementary
        } else if has(&["manuscript", "main document", "pdf", "proof"]) {
            DocumentKind::Manuscript
        } else {
            DocumentKind::Other
        }
    }
}

/// One attached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLink {
    pub label: String,
    pub url: String,
    pub kind: DocumentKind,
}

/// Attached files of an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Documents {
    pub files: Vec<DocumentLink>,
}

impl Documents {
    pub fn of_kind(&self, kind: DocumentKind) -> impl Iterator<Item = &DocumentLink> {
        self.files.iter().filter(move |f| f.kind == kind)
    }

    pub fn has(&self, kind: DocumentKind) -> bool {
        self.of_kind(kind).next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// One earlier (or the current) version of a revised entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub id: EntityId,
    pub revision: u32,
    pub date: Option<NaiveDate>,
    pub decision: Option<String>,
}

/// Status derived from referees and audit events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDetails {
    pub stage: Option<String>,
    pub referees_invited: usize,
    pub referees_agreed: usize,
    pub referees_declined: usize,
    pub reports_returned: usize,
    pub reports_pending: usize,
    pub reports_overdue: usize,
    pub last_activity: Option<NaiveDate>,
    pub reminders_sent: usize,
}

/// A person dropped from the referee list because they hold another role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConflict {
    pub name: String,
    pub listed_as: String,
    pub actual_role: String,
}

/// Normalized record for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManuscriptRecord {
    pub id: EntityId,
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub authors: Vec<PersonRecord>,
    #[serde(default)]
    pub referees: Vec<PersonRecord>,
    #[serde(default)]
    pub editors: Vec<PersonRecord>,
    #[serde(default)]
    pub documents: Documents,
    #[serde(default)]
    pub audit_trail: Vec<AuditEvent>,
    #[serde(default)]
    pub version_history: Vec<VersionEntry>,
    #[serde(default)]
    pub status_details: StatusDetails,
    #[serde(default)]
    pub role_conflicts: Vec<RoleConflict>,
}

impl ManuscriptRecord {
    /// An empty record for an entity.
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            title: None,
            metadata: BTreeMap::new(),
            authors: vec![],
            referees: vec![],
            editors: vec![],
            documents: Documents::default(),
            audit_trail: vec![],
            version_history: vec![],
            status_details: StatusDetails::default(),
            role_conflicts: vec![],
        }
    }

    /// Referees and authors, the people whose emails get resolved.
    pub fn resolvable_people_mut(&mut self) -> impl Iterator<Item = &mut PersonRecord> {
        self.referees.iter_mut().chain(self.authors.iter_mut())
    }
}
