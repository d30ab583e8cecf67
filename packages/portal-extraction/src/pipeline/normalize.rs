//! Record normalization run before resolution and again before caching.
//!
//! Placeholder strings become absent values, duplicate people fold into one
//! record, and people listed as referees while holding another role are moved
//! out of the referee list.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::types::audit::sort_newest_first;
use crate::types::person::{PersonRecord, PersonRole};
use crate::types::record::{ManuscriptRecord, RoleConflict};

/// Strings portals use to mean "no value".
const PLACEHOLDERS: &[&str] = &[
    "", "-", "--", "n/a", "na", "none", "null", "unknown", "tbd", "not available",
];

pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    PLACEHOLDERS.contains(&v.as_str())
}

/// Trim a value and drop it if it is a placeholder.
pub fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|v| !is_placeholder(v))
}

/// Normalize a record in place. Safe to run more than once.
pub fn normalize_record(record: &mut ManuscriptRecord) {
    record.title = clean(record.title.take());
    record.metadata = std::mem::take(&mut record.metadata)
        .into_iter()
        .filter_map(|(k, v)| clean(Some(v)).map(|v| (k.trim().to_string(), v)))
        .collect();

    for list in [&mut record.referees, &mut record.authors, &mut record.editors] {
        let people = std::mem::take(list);
        *list = fold_people(people.into_iter().filter_map(clean_person).collect());
    }
    classify_roles(record);

    let mut urls = HashSet::new();
    record.documents.files.retain(|f| urls.insert(f.url.clone()));

    let mut ids = HashSet::new();
    record.version_history.retain(|v| ids.insert(v.id.clone()));
    record.version_history.sort_by_key(|v| v.revision);

    let mut keys = HashSet::new();
    record.audit_trail.retain(|e| keys.insert(e.key()));
    sort_newest_first(&mut record.audit_trail);
}

fn clean_person(mut person: PersonRecord) -> Option<PersonRecord> {
    if is_placeholder(&person.name) || person.parsed_name().last.is_empty() {
        return None;
    }
    person.email = clean(person.email.take()).map(|e| e.to_lowercase());
    if person.email.is_none() {
        person.resolution_confidence = None;
    }
    person.affiliation = clean(person.affiliation.take());
    person.status = clean(person.status.take());
    Some(person)
}

/// Merge people with the same identity key, keeping first-seen order.
///
/// Missing fields are filled from later duplicates; of two emails the one
/// with higher confidence wins.
pub fn fold_people(people: Vec<PersonRecord>) -> Vec<PersonRecord> {
    let mut out: Vec<PersonRecord> = Vec::with_capacity(people.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for person in people {
        let key = person.identity_key();
        let Some(&i) = index.get(&key) else {
            index.insert(key, out.len());
            out.push(person);
            continue;
        };

        let existing = &mut out[i];
        debug!(name = %person.name, "Folding duplicate person");
        let incoming_conf = person.resolution_confidence.unwrap_or(0.0);
        let existing_conf = existing.resolution_confidence.unwrap_or(0.0);
        if person.email.is_some() && (existing.email.is_none() || incoming_conf > existing_conf) {
            existing.email = person.email;
            existing.resolution_confidence = person.resolution_confidence;
        }
        if existing.affiliation.is_none() {
            existing.affiliation = person.affiliation;
        }
        if existing.status.is_none() {
            existing.status = person.status;
        }
        existing.dates.fill_from(&person.dates);
    }
    out
}

/// Move referees who are also authors or editors into `role_conflicts`.
pub fn classify_roles(record: &mut ManuscriptRecord) {
    let roles: HashMap<String, PersonRole> = record
        .editors
        .iter()
        .chain(&record.authors)
        .map(|p| (p.identity_key(), p.role))
        .collect();
    if roles.is_empty() {
        return;
    }

    let mut conflicts = Vec::new();
    record.referees.retain(|referee| match roles.get(&referee.identity_key()) {
        Some(role) => {
            conflicts.push(RoleConflict {
                name: referee.name.clone(),
                listed_as: PersonRole::Referee.to_string(),
                actual_role: role.to_string(),
            });
            false
        }
        None => true,
    });

    for conflict in conflicts {
        debug!(name = %conflict.name, role = %conflict.actual_role, "Referee holds another role");
        if !record.role_conflicts.contains(&conflict) {
            record.role_conflicts.push(conflict);
        }
    }
}
