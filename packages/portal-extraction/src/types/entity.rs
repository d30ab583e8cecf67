//! Entity identifiers.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Stable identifier of a remote record, e.g. `MF-2024-0417.R2`.
///
/// Equality is structural on the raw string. A trailing revision suffix
/// (`.R2`, `-R2`, `_R2`) is recognised but kept as part of the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

fn revision_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?P<base>.+?)[.\-_][Rr](?P<rev>\d+)$").unwrap())
}

impl EntityId {
    /// Create an id from raw text, trimming surrounding whitespace.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id without its revision suffix.
    pub fn base(&self) -> &str {
        revision_pattern()
            .captures(&self.0)
            .and_then(|c| c.name("base"))
            .map(|m| m.as_str())
            .unwrap_or(&self.0)
    }

    /// Revision number; 0 for an original submission.
    pub fn revision(&self) -> u32 {
        revision_pattern()
            .captures(&self.0)
            .and_then(|c| c.name("rev"))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    }

    /// Whether this id refers to a revised submission.
    pub fn is_revision(&self) -> bool {
        self.revision() > 0
    }

    /// Ids of every earlier version, oldest first.
    pub fn earlier_versions(&self) -> Vec<EntityId> {
        let rev = self.revision();
        if rev == 0 {
            return vec![];
        }
        let base = self.base();
        let sep = self.0[base.len()..].chars().next().unwrap_or('.');
        let mut out = vec![EntityId::new(base)];
        out.extend((1..rev).map(|r| EntityId::new(format!("{}{}R{}", base, sep, r))));
        out
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_id() {
        let id = EntityId::new(" MF-2024-0417 ");
        assert_eq!(id.as_str(), "MF-2024-0417");
        assert_eq!(id.base(), "MF-2024-0417");
        assert_eq!(id.revision(), 0);
        assert!(id.earlier_versions().is_empty());
    }

    #[test]
    fn test_revision_suffix() {
        let id = EntityId::new("MF-2024-0417.R2");
        assert_eq!(id.base(), "MF-2024-0417");
        assert_eq!(id.revision(), 2);
        assert!(id.is_revision());
        assert_eq!(
            id.earlier_versions(),
            vec![EntityId::new("MF-2024-0417"), EntityId::new("MF-2024-0417.R1")]
        );
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(EntityId::from("SICON-2023-1"), EntityId::new("SICON-2023-1"));
        assert_ne!(EntityId::from("SICON-2023-1"), EntityId::new("SICON-2023-1.R1"));
    }
}
