use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::EpicId;
use crate::error::{Error, Result};

/// A unit of work decomposed into tasks.
///
/// Epics are never deleted; cancellation is a status. Progress counts are
/// derived from the child tasks whenever they are needed (see
/// [`EpicSummary`]) rather than stored on the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epic {
    pub id: EpicId,
    pub title: String,
    pub status: EpicStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The lifecycle state of an epic.
///
/// - `Planning`: created, still being decomposed into tasks
/// - `Ready`: decomposed, tasks may be picked up
/// - `InProgress`: work has started
/// - `Done`: every task is done or cancelled
/// - `Cancelled`: abandoned, reachable from any non-terminal state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EpicStatus {
    Planning,
    Ready,
    InProgress,
    Done,
    Cancelled,
}

impl EpicStatus {
    pub const ALL: [EpicStatus; 5] = [
        Self::Planning,
        Self::Ready,
        Self::InProgress,
        Self::Done,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    /// Position along the forward path; `Cancelled` sits outside it.
    pub(crate) fn rank(&self) -> Option<u8> {
        match self {
            Self::Planning => Some(0),
            Self::Ready => Some(1),
            Self::InProgress => Some(2),
            Self::Done => Some(3),
            Self::Cancelled => None,
        }
    }
}

impl fmt::Display for EpicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EpicStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                Error::Invalid(format!(
                    "unknown epic status '{}'. Must be one of: planning, ready, in_progress, done, cancelled",
                    s
                ))
            })
    }
}

/// An epic with its derived progress counters, used for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpicSummary {
    #[serde(flatten)]
    pub epic: Epic,
    pub task_count: usize,
    pub tasks_done: usize,
}

/// Seed content for a new epic specification body.
pub fn epic_spec_template(title: &str) -> String {
    format!("# {title}\n\n## Overview\n\n## Requirements\n\n## Acceptance Criteria\n")
}
