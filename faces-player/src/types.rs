//! Core data types shared by the store, the session and the play loop

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a quiz photo, derived from its bytes
///
/// Primary key of the hash table. Identical bytes always produce the
/// identical hash; matching is exact on the string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageHash(String);

impl ImageHash {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageHash {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ImageHash {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What the table knows about a hash
///
/// Persisted as `null` (unresolved) or a string (the learned name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum NameEntry {
    Unresolved,
    Resolved(String),
}

impl NameEntry {
    pub fn is_resolved(&self) -> bool {
        matches!(self, NameEntry::Resolved(_))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            NameEntry::Resolved(name) => Some(name),
            NameEntry::Unresolved => None,
        }
    }
}

impl From<Option<String>> for NameEntry {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(name) => NameEntry::Resolved(name),
            None => NameEntry::Unresolved,
        }
    }
}

impl From<NameEntry> for Option<String> {
    fn from(value: NameEntry) -> Self {
        match value {
            NameEntry::Resolved(name) => Some(name),
            NameEntry::Unresolved => None,
        }
    }
}

impl fmt::Display for NameEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameEntry::Resolved(name) => f.write_str(name),
            NameEntry::Unresolved => f.write_str("<unresolved>"),
        }
    }
}

/// Entire persisted state: hash -> entry
pub type HashTable = BTreeMap<ImageHash, NameEntry>;

/// One captured quiz photo, as delivered by the driver's network layer
#[derive(Debug, Clone)]
pub struct ImageObserved {
    /// 0-based question index the photo belongs to
    pub index: u32,
    pub bytes: Vec<u8>,
    /// Declared `Content-Type` of the response
    pub content_type: String,
}

/// A question as displayed by the quiz
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub index: u32,
    /// Answer labels in presentation order
    pub candidates: Vec<String>,
}

/// Result of submitting an answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Ground truth revealed by the quiz
    pub true_answer: String,
}
