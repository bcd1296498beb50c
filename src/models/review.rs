use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{EpicId, TaskId};
use crate::error::{Error, Result};

/// Reviewer recorded when the caller does not name one.
pub const DEFAULT_REVIEWER: &str = "qa-auditor";

/// Outcome of one review pass over a task's implementation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Ship,
    NeedsWork,
    MajorRethink,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ship => "SHIP",
            Self::NeedsWork => "NEEDS_WORK",
            Self::MajorRethink => "MAJOR_RETHINK",
        }
    }

    /// `SHIP` and `MAJOR_RETHINK` both close a work cycle.
    pub fn ends_cycle(&self) -> bool {
        matches!(self, Self::Ship | Self::MajorRethink)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "SHIP" => Ok(Self::Ship),
            "NEEDS_WORK" => Ok(Self::NeedsWork),
            "MAJOR_RETHINK" => Ok(Self::MajorRethink),
            _ => Err(Error::Invalid(format!(
                "unknown verdict '{}'. Must be one of: SHIP, NEEDS_WORK, MAJOR_RETHINK",
                s
            ))),
        }
    }
}

/// An immutable, append-only record of one review verdict.
///
/// Iterations are 1-based and contiguous per task. `forced` marks receipts
/// whose verdict was escalated by the review gate rather than submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewReceipt {
    pub task_id: TaskId,
    pub epic_id: EpicId,
    pub verdict: Verdict,
    pub reviewer: String,
    #[serde(default)]
    pub notes: String,
    pub iteration: u32,
    #[serde(default)]
    pub forced: bool,
    pub timestamp: DateTime<Utc>,
}

/// Input for logging a review.
#[derive(Debug, Clone)]
pub struct ReviewInput {
    pub verdict: Verdict,
    pub reviewer: Option<String>,
    pub notes: String,
}
