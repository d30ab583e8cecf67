//! People attached to a manuscript: referees, authors, editors.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Which list a person was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonRole {
    Referee,
    Author,
    Editor,
}

impl std::fmt::Display for PersonRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersonRole::Referee => write!(f, "referee"),
            PersonRole::Author => write!(f, "author"),
            PersonRole::Editor => write!(f, "editor"),
        }
    }
}

/// Dates on a person's involvement with a manuscript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonDates {
    pub invited: Option<NaiveDate>,
    pub agreed: Option<NaiveDate>,
    pub due: Option<NaiveDate>,
    pub returned: Option<NaiveDate>,
}

impl PersonDates {
    pub fn is_empty(&self) -> bool {
        self.invited.is_none() && self.agreed.is_none() && self.due.is_none() && self.returned.is_none()
    }

    /// Fill unset dates from another record.
    pub fn fill_from(&mut self, other: &PersonDates) {
        self.invited = self.invited.or(other.invited);
        self.agreed = self.agreed.or(other.agreed);
        self.due = self.due.or(other.due);
        self.returned = self.returned.or(other.returned);
    }
}

/// A referee, author or editor.
///
/// `email` may be filled post hoc by the resolver; `resolution_confidence`
/// says how sure it was (1.0 for an explicit `mailto:` link).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub name: String,
    pub role: PersonRole,
    pub email: Option<String>,
    pub affiliation: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub dates: PersonDates,
    pub resolution_confidence: Option<f32>,
}

impl PersonRecord {
    /// Create a record with only a name.
    pub fn new(name: impl Into<String>, role: PersonRole) -> Self {
        Self {
            name: collapse_whitespace(&name.into()),
            role,
            email: None,
            affiliation: None,
            status: None,
            dates: PersonDates::default(),
            resolution_confidence: None,
        }
    }

    /// Set an email read directly from the page.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into().trim().to_lowercase());
        self.resolution_confidence = Some(1.0);
        self
    }

    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliation = Some(affiliation.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_dates(mut self, dates: PersonDates) -> Self {
        self.dates = dates;
        self
    }

    /// Parsed first/last name.
    pub fn parsed_name(&self) -> PersonName {
        PersonName::parse(&self.name)
    }

    /// Key used to fold duplicates and compare people across lists.
    pub fn identity_key(&self) -> String {
        self.parsed_name().key()
    }

    /// Whether the email is settled and must not be replaced.
    pub fn has_confident_email(&self, threshold: f32) -> bool {
        self.email.is_some() && self.resolution_confidence.unwrap_or(0.0) >= threshold
    }
}

const HONORIFICS: &[&str] = &["dr", "prof", "professor", "mr", "mrs", "ms", "miss", "sir"];
const SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv", "phd", "md"];

/// First and last name, lower-cased and stripped of punctuation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonName {
    pub first: String,
    pub last: String,
}

impl PersonName {
    /// Parse "Last, First" or "First [Middle] Last".
    ///
    /// Honorifics, suffixes and parenthesised notes are dropped.
    pub fn parse(raw: &str) -> Self {
        let without_notes = strip_parenthesised(raw);

        let (first_part, last_part) = match without_notes.split_once(',') {
            Some((last, first)) => (first.to_string(), last.to_string()),
            None => {
                let tokens = clean_tokens(&without_notes);
                match tokens.len() {
                    0 => return Self::default(),
                    1 => (String::new(), tokens[0].clone()),
                    n => (tokens[0].clone(), tokens[n - 1].clone()),
                }
            }
        };

        let first = clean_tokens(&first_part).into_iter().next().unwrap_or_default();
        let last = clean_tokens(&last_part).into_iter().last().unwrap_or_default();
        Self { first, last }
    }

    /// Stable identity key, `last|first`.
    pub fn key(&self) -> String {
        format!("{}|{}", self.last, self.first)
    }

    /// First letter of the first name.
    pub fn initial(&self) -> Option<char> {
        self.first.chars().next()
    }
}

fn strip_parenthesised(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn clean_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| {
            t.chars()
                .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '\'')
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .filter(|t| !HONORIFICS.contains(&t.as_str()) && !SUFFIXES.contains(&t.as_str()))
        .collect()
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_last_first() {
        let name = PersonName::parse("Smith, John");
        assert_eq!(name.first, "john");
        assert_eq!(name.last, "smith");
        assert_eq!(name.key(), "smith|john");
    }

    #[test]
    fn test_parse_first_last_with_honorific() {
        let name = PersonName::parse("Prof. Anna  Maria Lee (Reviewer 2)");
        assert_eq!(name.first, "anna");
        assert_eq!(name.last, "lee");
    }

    #[test]
    fn test_parse_single_token() {
        let name = PersonName::parse("Plato");
        assert_eq!(name.first, "");
        assert_eq!(name.last, "plato");
    }

    #[test]
    fn test_identity_key_ignores_format() {
        let a = PersonRecord::new("Smith, John", PersonRole::Referee);
        let b = PersonRecord::new("Dr. John Smith", PersonRole::Author);
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn test_explicit_email_is_confident() {
        let p = PersonRecord::new("Lee, Anna", PersonRole::Referee).with_email(" ALee@Stanford.edu ");
        assert_eq!(p.email.as_deref(), Some("alee@stanford.edu"));
        assert!(p.has_confident_email(0.8));
    }

    #[test]
    fn test_dates_fill_from() {
        let mut a = PersonDates {
            invited: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        };
        let b = PersonDates {
            invited: NaiveDate::from_ymd_opt(2023, 1, 1),
            due: NaiveDate::from_ymd_opt(2024, 2, 1),
            ..Default::default()
        };
        a.fill_from(&b);
        assert_eq!(a.invited, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(a.due, NaiveDate::from_ymd_opt(2024, 2, 1));
    }
}
