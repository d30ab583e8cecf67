//! Audit trail events.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::text::{extract_emails, truncate_chars};

/// Characters of raw text that participate in the identity key.
pub const EVENT_KEY_PREFIX_CHARS: usize = 50;

/// What kind of thing happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ReviewerInvited,
    ReviewerAgreed,
    ReviewerDeclined,
    Reminder,
    ReviewReturned,
    Decision,
    RevisionSubmitted,
    Submission,
    Communication,
    Other,
}

impl EventType {
    /// Classify event text by keyword. Order matters: the first rule wins.
    pub fn classify(text: &str) -> Self {
        let t = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| t.contains(w));

        if has(&["declined", "unavailable to review", "decline to review"]) {
            EventType::ReviewerDeclined
        } else if has(&["agreed", "accepted invitation", "accepted to review"]) {
            EventType::ReviewerAgreed
        } else if has(&["remind", "overdue"]) {
            EventType::Reminder
        } else if has(&["invited", "invitation"]) {
            EventType::ReviewerInvited
        } else if has(&["review received", "review returned", "report received", "review submitted", "scores submitted"]) {
            EventType::ReviewReturned
        } else if has(&["decision", "accept", "reject"]) {
            EventType::Decision
        } else if has(&["revision", "revised"]) {
            EventType::RevisionSubmitted
        } else if has(&["submitted", "submission"]) {
            EventType::Submission
        } else if has(&["email", "e-mail", "sent", "message"]) {
            EventType::Communication
        } else {
            EventType::Other
        }
    }
}

/// Identity of an event: date, time and the first characters of its text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub text_prefix: String,
}

/// One entry of an entity's audit trail. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub raw_text: String,
    pub event_type: EventType,
    #[serde(default)]
    pub parsed_fields: BTreeMap<String, String>,
}

impl AuditEvent {
    /// Build an event, classifying it and pulling out addresses and counterparts.
    pub fn new(date: NaiveDate, time: Option<NaiveTime>, raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into().split_whitespace().collect::<Vec<_>>().join(" ");
        let event_type = EventType::classify(&raw_text);
        let parsed_fields = parse_fields(&raw_text);
        Self {
            date,
            time,
            raw_text,
            event_type,
            parsed_fields,
        }
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            date: self.date,
            time: self.time,
            text_prefix: truncate_chars(&self.raw_text, EVENT_KEY_PREFIX_CHARS).to_string(),
        }
    }

    /// Email addresses mentioned in the event.
    pub fn emails(&self) -> Vec<String> {
        extract_emails(&self.raw_text)
    }
}

fn parse_fields(text: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    let emails = extract_emails(text);
    if !emails.is_empty() {
        fields.insert("emails".to_string(), emails.join(","));
    }

    for label in ["to", "from"] {
        if let Some(value) = counterpart(text, label) {
            fields.insert(label.to_string(), value);
        }
    }
    fields
}

/// Text after "to:" / "from:" up to the next separator.
fn counterpart(text: &str, label: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let needle = format!("{}:", label);
    let start = lower.find(&needle)? + needle.len();
    let rest = &text[start..];
    let end = rest
        .find(|c: char| c == ';' || c == '|' || c == '(' || c == '<')
        .unwrap_or(rest.len());
    let value = rest[..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Sort newest first; events on the same day order by time, untimed last.
pub fn sort_newest_first(events: &mut [AuditEvent]) {
    events.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.time.cmp(&a.time)));
}
