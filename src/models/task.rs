use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{EpicId, TaskId};
use crate::error::{Error, Result};

/// A unit of work owned by exactly one epic.
///
/// The dependency list is the only place edges are declared; the
/// dependency graph is derived from the union of these lists. Once a task
/// reaches `done` or `cancelled` its record is frozen, and further work
/// needs a new task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub epic_id: EpicId,
    pub title: String,
    pub status: TaskStatus,
    /// Tasks this one is blocked on, in declaration order.
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// What was done, supplied by the caller when completing the task.
    #[serde(default, alias = "done_summary", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// The stored status of a task.
///
/// `blocked` is deliberately absent: it is computed from the dependency
/// graph and reported through [`DisplayStatus`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [Self::Pending, Self::InProgress, Self::Done, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "blocked" {
            return Err(Error::Invalid(
                "'blocked' is derived from dependencies and cannot be set".to_string(),
            ));
        }
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                Error::Invalid(format!(
                    "unknown task status '{}'. Must be one of: pending, in_progress, done, cancelled",
                    s
                ))
            })
    }
}

/// Status as reported to callers: the stored status plus the derived
/// `Blocked` state for pending tasks with incomplete dependencies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Pending,
    Blocked,
    InProgress,
    Done,
    Cancelled,
}

impl DisplayStatus {
    pub const ALL: [DisplayStatus; 5] = [
        Self::Pending,
        Self::Blocked,
        Self::InProgress,
        Self::Done,
        Self::Cancelled,
    ];

    pub fn of(status: TaskStatus, blocked: bool) -> Self {
        match status {
            TaskStatus::Pending if blocked => Self::Blocked,
            TaskStatus::Pending => Self::Pending,
            TaskStatus::InProgress => Self::InProgress,
            TaskStatus::Done => Self::Done,
            TaskStatus::Cancelled => Self::Cancelled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Blocked => "blocked",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                Error::Invalid(format!(
                    "unknown task status '{}'. Must be one of: pending, blocked, in_progress, done, cancelled",
                    s
                ))
            })
    }
}

/// Read-only projection of a task together with its blocking dependencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub display_status: DisplayStatus,
    /// Dependencies that are not yet `done`.
    pub blocked_by: Vec<TaskId>,
}

/// Filter for task listings. `status` matches the display status, except
/// that `Pending` also matches blocked tasks (they are stored as pending).
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub epic: Option<EpicId>,
    pub status: Option<DisplayStatus>,
}

impl TaskFilter {
    pub fn matches(&self, view: &TaskView) -> bool {
        if let Some(epic) = &self.epic {
            if &view.task.epic_id != epic {
                return false;
            }
        }
        match self.status {
            None => true,
            Some(DisplayStatus::Pending) => view.task.status == TaskStatus::Pending,
            Some(status) => view.display_status == status,
        }
    }
}

/// Seed content for a new task specification body.
pub fn task_spec_template(title: &str) -> String {
    format!("# {title}\n\n## Description\n\n## Implementation Notes\n")
}
