//! Guard interceptor for file mutations made on behalf of a task.
//!
//! The calling tool layer passes the ambient "current task" and asks
//! whether an edit may proceed. Only an `in_progress` task permits it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Task, TaskId, TaskStatus};

/// Tool names, as sent in PreToolUse hook payloads, that mutate files.
pub const MUTATING_TOOLS: [&str; 4] = ["Edit", "Write", "MultiEdit", "NotebookEdit"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny { reason: DenyReason },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum DenyReason {
    Pending { task: TaskId },
    Blocked { task: TaskId, blocked_by: Vec<TaskId> },
    Terminal { task: TaskId, status: TaskStatus },
}

impl DenyReason {
    /// Short machine-facing reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "pending",
            Self::Blocked { .. } => "blocked",
            Self::Terminal { .. } => "terminal",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending { task } => {
                write!(f, "pending: {task} has not been started; run `taskctl task start {task}` first")
            }
            Self::Blocked { task, blocked_by } => {
                let ids: Vec<String> = blocked_by.iter().map(ToString::to_string).collect();
                write!(f, "blocked: {task} is waiting on {}", ids.join(", "))
            }
            Self::Terminal { task, status } => {
                write!(f, "terminal: {task} is {status}; create a new task for further work")
            }
        }
    }
}

/// Decide whether a mutation may proceed. `task` is the snapshot of the
/// current task, if one is set; `blockers` its incomplete dependencies.
pub fn check(task: Option<&Task>, blockers: &[TaskId]) -> Decision {
    let Some(task) = task else {
        return Decision::Allow;
    };
    let reason = match task.status {
        TaskStatus::InProgress => return Decision::Allow,
        TaskStatus::Done | TaskStatus::Cancelled => DenyReason::Terminal {
            task: task.id.clone(),
            status: task.status,
        },
        TaskStatus::Pending if !blockers.is_empty() => DenyReason::Blocked {
            task: task.id.clone(),
            blocked_by: blockers.to_vec(),
        },
        TaskStatus::Pending => DenyReason::Pending {
            task: task.id.clone(),
        },
    };
    Decision::Deny { reason }
}

/// The part of a PreToolUse hook payload the guard looks at.
#[derive(Debug, Clone, Deserialize)]
pub struct HookPayload {
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
}

impl HookPayload {
    pub fn is_mutating(&self) -> bool {
        MUTATING_TOOLS.contains(&self.tool_name.as_str())
    }

    /// Target file of the mutation, when the tool input names one.
    pub fn file_path(&self) -> Option<&str> {
        ["file_path", "notebook_path", "path"]
            .iter()
            .find_map(|k| self.tool_input.get(*k).and_then(Value::as_str))
    }
}
