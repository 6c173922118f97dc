//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using a BugId
//! where a PrNumber is expected) and make the code more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A pull request number within a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrNumber(pub u64);

impl fmt::Display for PrNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for PrNumber {
    fn from(n: u64) -> Self {
        PrNumber(n)
    }
}

/// A tracking bug identifier.
///
/// Displays as the bare number, which is also the row key used by the
/// subscription table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BugId(pub u64);

impl fmt::Display for BugId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BugId {
    fn from(n: u64) -> Self {
        BugId(n)
    }
}

/// Error returned when a string is not a valid 40-character hex SHA.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid SHA {0:?}: expected 40 hex characters")]
pub struct InvalidSha(pub String);

/// A git commit SHA (40 hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sha(String);

impl Sha {
    /// Parses and validates a SHA, normalizing it to lowercase.
    pub fn parse(s: impl AsRef<str>) -> Result<Self, InvalidSha> {
        let s = s.as_ref();
        if s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Sha(s.to_ascii_lowercase()))
        } else {
            Err(InvalidSha(s.to_string()))
        }
    }

    /// Returns the SHA as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short (7-character) version of the SHA for display.
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for Sha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a CI run, as handed out by the task runner on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new(s: impl Into<String>) -> Self {
        RunId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A repository identifier (owner/repo format).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        RepoId {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parses `owner/repo`. Both halves must be non-empty and contain no further `/`.
    pub fn parse(s: &str) -> Option<Self> {
        let (owner, repo) = s.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(RepoId::new(owner, repo))
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod pr_number {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn display_format(n: u64) {
                prop_assert_eq!(format!("{}", PrNumber(n)), format!("#{}", n));
            }

            #[test]
            fn ordering_matches_underlying(a: u64, b: u64) {
                prop_assert_eq!(PrNumber(a).cmp(&PrNumber(b)), a.cmp(&b));
            }
        }
    }

    mod bug_id {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn display_is_bare_number(n: u64) {
                prop_assert_eq!(BugId(n).to_string(), n.to_string());
            }

            #[test]
            fn serde_is_transparent(n: u64) {
                let json = serde_json::to_string(&BugId(n)).unwrap();
                prop_assert_eq!(json, n.to_string());
            }
        }
    }

    mod sha {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_accepts_hex(s in "[0-9a-fA-F]{40}") {
                let sha = Sha::parse(&s).unwrap();
                prop_assert_eq!(sha.as_str(), s.to_ascii_lowercase());
            }

            #[test]
            fn short_returns_prefix(s in "[0-9a-f]{40}") {
                let sha = Sha::parse(&s).unwrap();
                prop_assert_eq!(sha.short(), &s[..7]);
            }
        }

        #[test]
        fn parse_rejects_wrong_length() {
            assert!(Sha::parse("abc").is_err());
            assert!(Sha::parse("a".repeat(41)).is_err());
        }

        #[test]
        fn parse_rejects_non_hex() {
            assert_eq!(
                Sha::parse("g".repeat(40)),
                Err(InvalidSha("g".repeat(40)))
            );
        }
    }

    mod repo_id {
        use super::*;

        #[test]
        fn parse_owner_and_repo() {
            assert_eq!(
                RepoId::parse("mozilla-b2g/gaia"),
                Some(RepoId::new("mozilla-b2g", "gaia"))
            );
        }

        #[test]
        fn parse_rejects_malformed() {
            assert_eq!(RepoId::parse("gaia"), None);
            assert_eq!(RepoId::parse("/gaia"), None);
            assert_eq!(RepoId::parse("owner/"), None);
            assert_eq!(RepoId::parse("a/b/c"), None);
        }
    }
}
