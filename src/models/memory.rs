use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of note kept in the memory ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Pitfall,
    Convention,
    Decision,
}

impl MemoryCategory {
    pub const ALL: [MemoryCategory; 3] = [Self::Pitfall, Self::Convention, Self::Decision];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pitfall => "pitfall",
            Self::Convention => "convention",
            Self::Decision => "decision",
        }
    }

    /// Name of the stream holding this category's entries.
    pub(crate) fn stream_name(&self) -> &'static str {
        match self {
            Self::Pitfall => "pitfalls",
            Self::Convention => "conventions",
            Self::Decision => "decisions",
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s || c.stream_name() == s)
            .ok_or_else(|| {
                Error::Invalid(format!(
                    "unknown memory type '{}'. Must be one of: pitfall, convention, decision",
                    s
                ))
            })
    }
}

/// A timestamped free-text note. Append-only; the timestamp is its only
/// identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub category: MemoryCategory,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

/// What is persisted per line; the category is implied by the stream.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct MemoryRecord {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}
