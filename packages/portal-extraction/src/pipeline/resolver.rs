//! Heuristic email-to-person resolution.
//!
//! Portals often list referees by name only while their addresses appear
//! elsewhere (mailto links, reminder logs, audit events). The resolver scores
//! each unused address against each person and assigns the best one above a
//! source-dependent threshold. It is best effort: a missed match is fine, a
//! wrong one is what the thresholds and single-use rule guard against.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::types::audit::{AuditEvent, EventType};
use crate::types::config::ResolverConfig;
use crate::types::person::PersonRecord;
use crate::types::record::ManuscriptRecord;
use crate::types::text::extract_emails;

/// Score at which resolution confidence reaches 1.0.
const FULL_CONFIDENCE_SCORE: f32 = 25.0;

/// Words that carry no identity in an affiliation.
const AFFILIATION_STOPWORDS: &[&str] = &[
    "university", "universite", "universidad", "universitat", "institute", "institut",
    "department", "dept", "school", "college", "faculty", "center", "centre", "laboratory",
    "lab", "national", "research", "sciences", "science", "technology", "the", "of", "and",
    "for", "at", "de", "la",
];

/// Connector words skipped when building an acronym.
const ACRONYM_SKIP: &[&str] = &["of", "the", "and", "for", "at", "de", "la", "in"];

/// Domain labels that say nothing about the institution.
const GENERIC_LABELS: &[&str] = &["www", "mail", "email", "post", "students", "alumni"];

/// Where a candidate address was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateSource {
    /// The entity's own detail page
    Page,
    /// Communication history (invitations, reminders, emails)
    History,
    /// Any other audit event
    Audit,
}

/// An address that may belong to one of the people.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub email: String,
    pub source: CandidateSource,
}

impl Candidate {
    pub fn new(email: impl Into<String>, source: CandidateSource) -> Self {
        Self {
            email: email.into().trim().to_lowercase(),
            source,
        }
    }

    /// Addresses in free page text.
    pub fn from_page_text(text: &str) -> Vec<Candidate> {
        extract_emails(text)
            .into_iter()
            .map(|e| Candidate::new(e, CandidateSource::Page))
            .collect()
    }

    /// Addresses mentioned by an audit event.
    pub fn from_event(event: &AuditEvent) -> Vec<Candidate> {
        let source = match event.event_type {
            EventType::Communication | EventType::Reminder | EventType::ReviewerInvited => {
                CandidateSource::History
            }
            _ => CandidateSource::Audit,
        };
        event
            .emails()
            .into_iter()
            .map(|e| Candidate::new(e, source))
            .collect()
    }

    fn domain(&self) -> &str {
        self.email.split_once('@').map(|(_, d)| d).unwrap_or("")
    }

    fn local(&self) -> &str {
        self.email.split_once('@').map(|(l, _)| l).unwrap_or(self.email.as_str())
    }
}

impl From<&str> for Candidate {
    fn from(email: &str) -> Self {
        Candidate::new(email, CandidateSource::History)
    }
}

/// Assigns candidate addresses to people.
///
/// Holds per-entity hints only; create one per entity.
#[derive(Debug, Clone)]
pub struct EntityResolver {
    config: ResolverConfig,
    domain_hints: HashMap<String, String>,
}

impl EntityResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            domain_hints: HashMap::new(),
        }
    }

    /// Remember a known email domain for the person with `identity_key`.
    pub fn with_domain_hint(mut self, identity_key: impl Into<String>, domain: impl Into<String>) -> Self {
        self.domain_hints
            .insert(identity_key.into(), domain.into().to_lowercase());
        self
    }

    /// Learn domain hints from every email in a previous record.
    pub fn with_hints_from(mut self, previous: &ManuscriptRecord) -> Self {
        let people = previous
            .referees
            .iter()
            .chain(&previous.authors)
            .chain(&previous.editors);
        for person in people {
            if let Some((_, domain)) = person.email.as_deref().and_then(|e| e.split_once('@')) {
                self.domain_hints
                    .entry(person.identity_key())
                    .or_insert_with(|| domain.to_string());
            }
        }
        self
    }

    /// Score `email` for `person`. Higher is a better match.
    pub fn score(&self, person: &PersonRecord, candidate: &Candidate) -> u32 {
        let c = &self.config;
        let name = person.parsed_name();
        let last = alnum(&name.last);
        let first = alnum(&name.first);
        let local = candidate.local();
        let local_alnum = alnum(local);
        let domain = candidate.domain();
        let mut score = 0;

        // Last name anywhere in the address: group domains often carry it
        if last.len() >= c.min_last_name_len && alnum(&candidate.email).contains(&last) {
            score += c.last_name_score;
        }
        if first.len() >= 3 && local_alnum.contains(&first) {
            score += c.first_name_score;
        }
        if let Some(initial) = first.chars().next() {
            if !last.is_empty() {
                let patterns = [
                    format!("{}{}", initial, last),
                    format!("{}.{}", initial, last),
                    format!("{}_{}", initial, last),
                    format!("{}{}", last, initial),
                    format!("{}.{}", last, initial),
                ];
                if patterns.iter().any(|p| local.starts_with(p.as_str())) {
                    score += c.initials_score;
                }
            }
        }
        if let Some(affiliation) = &person.affiliation {
            if affiliation_matches(affiliation, domain) {
                score += c.affiliation_score;
            }
        }
        if self
            .domain_hints
            .get(&person.identity_key())
            .is_some_and(|hint| hint == domain)
        {
            score += c.domain_hint_score;
        }
        score
    }

    fn threshold(&self, source: CandidateSource) -> u32 {
        match source {
            CandidateSource::Page => self.config.page_threshold,
            CandidateSource::History => self.config.history_threshold,
            CandidateSource::Audit => self.config.audit_threshold,
        }
    }

    /// Fill in missing emails. Returns the people in their original order.
    pub fn resolve(&self, mut people: Vec<PersonRecord>, candidates: &[Candidate]) -> Vec<PersonRecord> {
        self.assign(people.iter_mut().collect(), candidates);
        people
    }

    /// Resolve referees and authors of a record in place.
    ///
    /// Returns how many people received an address.
    pub fn resolve_record(&self, record: &mut ManuscriptRecord, candidates: &[Candidate]) -> usize {
        self.assign(record.resolvable_people_mut().collect(), candidates)
    }

    fn assign(&self, mut people: Vec<&mut PersonRecord>, candidates: &[Candidate]) -> usize {
        let high = self.config.high_confidence;

        // Settled addresses are never offered to anyone else.
        let taken: HashSet<String> = people
            .iter()
            .filter(|p| p.has_confident_email(high))
            .filter_map(|p| p.email.clone())
            .collect();
        let pool = candidate_pool(candidates, &taken);
        let mut used = vec![false; pool.len()];

        // Low-confidence addresses are re-decided; keep them aside as fallback.
        let mut fallback = Vec::new();
        for (idx, person) in people.iter_mut().enumerate() {
            if !person.has_confident_email(high) {
                if let Some(email) = person.email.take() {
                    fallback.push((idx, email, person.resolution_confidence.take()));
                }
            }
        }

        let mut assigned = 0;
        for person in people.iter_mut() {
            if person.has_confident_email(high) || person.email.is_some() {
                continue;
            }

            let mut best: Option<(usize, u32)> = None;
            for (i, candidate) in pool.iter().enumerate() {
                if used[i] {
                    continue;
                }
                let score = self.score(person, candidate);
                if score < self.threshold(candidate.source) {
                    continue;
                }
                if best.map_or(true, |(_, b)| score > b) {
                    best = Some((i, score));
                }
            }

            if let Some((i, score)) = best {
                used[i] = true;
                let email = pool[i].email.clone();
                debug!(person = %person.name, email = %email, score, "Email resolved");
                person.email = Some(email);
                person.resolution_confidence =
                    Some((score as f32 / FULL_CONFIDENCE_SCORE).min(1.0));
                assigned += 1;
            }
        }

        let in_use: HashSet<String> = people.iter().filter_map(|p| p.email.clone()).collect();
        for (idx, email, confidence) in fallback {
            let person = &mut people[idx];
            if person.email.is_none() && !in_use.contains(&email) {
                person.email = Some(email);
                person.resolution_confidence = confidence;
            }
        }
        assigned
    }
}

/// Unique candidates in first-seen order, minus taken addresses.
///
/// An address seen from several sources keeps its most trusted source.
fn candidate_pool(candidates: &[Candidate], taken: &HashSet<String>) -> Vec<Candidate> {
    let mut pool: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if candidate.email.is_empty() || taken.contains(&candidate.email) {
            continue;
        }
        match pool.iter_mut().find(|c| c.email == candidate.email) {
            Some(existing) => {
                if trust(candidate.source) > trust(existing.source) {
                    existing.source = candidate.source;
                }
            }
            None => pool.push(candidate.clone()),
        }
    }
    pool
}

fn trust(source: CandidateSource) -> u8 {
    match source {
        CandidateSource::Page => 2,
        CandidateSource::History => 1,
        CandidateSource::Audit => 0,
    }
}

/// Carry addresses from a previous record to people who now lack one.
///
/// Keeps settled addresses stable across runs when a page stops showing them.
pub fn carry_forward_emails(previous: &ManuscriptRecord, record: &mut ManuscriptRecord) {
    let known: HashMap<String, (&str, Option<f32>)> = previous
        .referees
        .iter()
        .chain(&previous.authors)
        .filter_map(|p| {
            p.email
                .as_deref()
                .map(|e| (p.identity_key(), (e, p.resolution_confidence)))
        })
        .collect();

    for person in record.resolvable_people_mut() {
        if person.email.is_some() {
            continue;
        }
        if let Some((email, confidence)) = known.get(&person.identity_key()) {
            person.email = Some(email.to_string());
            person.resolution_confidence = *confidence;
        }
    }
}

fn alnum(text: &str) -> String {
    text.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Whether an affiliation token or its acronym names a domain label.
fn affiliation_matches(affiliation: &str, domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    let Some((_, institutional)) = labels.split_last() else {
        return false;
    };
    let labels: Vec<&str> = institutional
        .iter()
        .copied()
        .filter(|l| l.len() >= 2 && !GENERIC_LABELS.contains(l))
        .collect();
    if labels.is_empty() {
        return false;
    }

    let words: Vec<String> = affiliation
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();

    let acronym: String = words
        .iter()
        .filter(|w| !ACRONYM_SKIP.contains(&w.as_str()))
        .filter_map(|w| w.chars().next())
        .collect();
    if acronym.len() >= 2 && labels.contains(&acronym.as_str()) {
        return true;
    }

    words
        .iter()
        .filter(|w| w.len() >= 3 && !AFFILIATION_STOPWORDS.contains(&w.as_str()))
        .any(|w| labels.contains(&w.as_str()))
}
