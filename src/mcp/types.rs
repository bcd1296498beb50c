//! Request and response types for MCP tools.

use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::models::{MemoryEntry, ReviewReceipt, TaskView};
use crate::review::ReviewState;

// ============================================================
// Request Types
// ============================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListTasksRequest {
    #[schemars(description = "Only tasks of this epic id (e.g. 'ca-1-a3f')")]
    #[serde(default)]
    pub epic_id: Option<String>,
    #[schemars(
        description = "Filter by status: 'pending', 'blocked', 'in_progress', 'done' or 'cancelled'. 'pending' includes blocked tasks"
    )]
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadyTasksRequest {
    #[schemars(description = "Only ready tasks of this epic id")]
    #[serde(default)]
    pub epic_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTaskRequest {
    #[schemars(description = "The task id, e.g. 'ca-1-a3f.2'")]
    pub task_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateEpicRequest {
    #[schemars(description = "Short title of the epic")]
    pub title: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTaskRequest {
    #[schemars(description = "The epic that owns the new task")]
    pub epic_id: String,
    #[schemars(description = "Short title describing what this task accomplishes")]
    pub title: String,
    #[schemars(description = "Ids of tasks that must be done before this one can start")]
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetDependenciesRequest {
    #[schemars(description = "The pending task whose dependencies are replaced")]
    pub task_id: String,
    #[schemars(description = "The complete new dependency list; empty clears it")]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StartTaskRequest {
    #[schemars(description = "The ready task to start working on")]
    pub task_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompleteTaskRequest {
    #[schemars(description = "The in-progress task to mark as done")]
    pub task_id: String,
    #[schemars(description = "What was implemented and how it was verified")]
    pub summary: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LogReviewRequest {
    #[schemars(description = "The reviewed task")]
    pub task_id: String,
    #[schemars(description = "One of 'SHIP', 'NEEDS_WORK' or 'MAJOR_RETHINK'")]
    pub verdict: String,
    #[schemars(description = "Review findings")]
    #[serde(default)]
    pub notes: Option<String>,
    #[schemars(description = "Who reviewed; defaults to 'qa-auditor'")]
    #[serde(default)]
    pub reviewer: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CheckMutationRequest {
    #[schemars(description = "The task the edit is made for; omit when not working on a task")]
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddMemoryRequest {
    #[schemars(description = "One of 'pitfall', 'convention' or 'decision'")]
    pub category: String,
    #[schemars(description = "The note to remember")]
    pub text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListMemoryRequest {
    #[schemars(description = "Only notes of this category")]
    #[serde(default)]
    pub category: Option<String>,
}

// ============================================================
// Response Types
// ============================================================

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Serialize)]
pub struct ReviewLoggedResponse {
    pub receipt: ReviewReceipt,
    pub state: ReviewState,
}

#[derive(Debug, Serialize)]
pub struct MutationCheckResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MemoryListResponse {
    pub entries: Vec<MemoryEntry>,
}
