//! MCP server exposing the workspace to coding agents.

mod types;

pub use types::*;

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;

use crate::error::Error;
use crate::guard::Decision;
use crate::models::*;
use crate::workspace::{NextAction, Workspace};

#[derive(Clone)]
pub struct McpServer {
    workspace: Workspace,
    tool_router: ToolRouter<Self>,
}

/// Caller mistakes and vetoes go back verbatim as invalid params; storage
/// failures are internal errors.
fn to_mcp(err: Error) -> McpError {
    if err.is_user_error() {
        McpError::invalid_params(err.to_string(), None)
    } else {
        McpError::internal_error(err.to_string(), None)
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn parse<T>(raw: &str) -> Result<T, McpError>
where
    T: std::str::FromStr<Err = Error>,
{
    raw.trim().parse().map_err(to_mcp)
}

fn parse_opt<T>(raw: Option<&str>) -> Result<Option<T>, McpError>
where
    T: std::str::FromStr<Err = Error>,
{
    raw.filter(|s| !s.trim().is_empty()).map(parse).transpose()
}

impl McpServer {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            tool_router: Self::tool_router(),
        }
    }

    // ============================================================
    // Tool logic, shared by the tool handlers and tests
    // ============================================================

    pub fn handle_next_action(&self) -> Result<NextAction, McpError> {
        self.workspace.next().map_err(to_mcp)
    }

    pub fn handle_list_tasks(&self, req: ListTasksRequest) -> Result<TaskListResponse, McpError> {
        let filter = TaskFilter {
            epic: parse_opt(req.epic_id.as_deref())?,
            status: parse_opt(req.status.as_deref())?,
        };
        let tasks = self.workspace.list_tasks(&filter).map_err(to_mcp)?;
        Ok(TaskListResponse { tasks })
    }

    pub fn handle_ready_tasks(&self, req: ReadyTasksRequest) -> Result<TaskListResponse, McpError> {
        let epic: Option<EpicId> = parse_opt(req.epic_id.as_deref())?;
        let tasks = self.workspace.ready(epic.as_ref()).map_err(to_mcp)?;
        Ok(TaskListResponse { tasks })
    }

    pub fn handle_get_task(&self, req: GetTaskRequest) -> Result<TaskView, McpError> {
        let id: TaskId = parse(&req.task_id)?;
        self.workspace.task(&id).map_err(to_mcp)
    }

    pub fn handle_create_epic(&self, req: CreateEpicRequest) -> Result<Epic, McpError> {
        self.workspace.create_epic(&req.title).map_err(to_mcp)
    }

    pub fn handle_create_task(&self, req: CreateTaskRequest) -> Result<Task, McpError> {
        let epic: EpicId = parse(&req.epic_id)?;
        let deps = parse_task_ids(&req.depends_on).map_err(to_mcp)?;
        self.workspace
            .create_task(&epic, &req.title, &deps)
            .map_err(to_mcp)
    }

    pub fn handle_set_dependencies(&self, req: SetDependenciesRequest) -> Result<Task, McpError> {
        let id: TaskId = parse(&req.task_id)?;
        let deps = parse_task_ids(&req.depends_on).map_err(to_mcp)?;
        self.workspace.set_dependencies(&id, &deps).map_err(to_mcp)
    }

    pub fn handle_start_task(&self, req: StartTaskRequest) -> Result<Task, McpError> {
        let id: TaskId = parse(&req.task_id)?;
        self.workspace.start_task(&id).map_err(to_mcp)
    }

    pub fn handle_complete_task(&self, req: CompleteTaskRequest) -> Result<Task, McpError> {
        let id: TaskId = parse(&req.task_id)?;
        self.workspace
            .complete_task(&id, &req.summary)
            .map_err(to_mcp)
    }

    pub fn handle_log_review(&self, req: LogReviewRequest) -> Result<ReviewLoggedResponse, McpError> {
        let id: TaskId = parse(&req.task_id)?;
        let input = ReviewInput {
            verdict: parse(&req.verdict)?,
            reviewer: req.reviewer,
            notes: req.notes.unwrap_or_default(),
        };
        let receipt = self.workspace.log_review(&id, input).map_err(to_mcp)?;
        let state = self.workspace.review_state(&id).map_err(to_mcp)?;
        Ok(ReviewLoggedResponse { receipt, state })
    }

    pub fn handle_check_mutation(
        &self,
        req: CheckMutationRequest,
    ) -> Result<MutationCheckResponse, McpError> {
        let id: Option<TaskId> = parse_opt(req.task_id.as_deref())?;
        let decision = self
            .workspace
            .check_mutation_allowed(id.as_ref())
            .map_err(to_mcp)?;
        Ok(match decision {
            Decision::Allow => MutationCheckResponse {
                allowed: true,
                code: None,
                reason: None,
            },
            Decision::Deny { reason } => MutationCheckResponse {
                allowed: false,
                code: Some(reason.code().to_string()),
                reason: Some(reason.to_string()),
            },
        })
    }

    pub fn handle_add_memory(&self, req: AddMemoryRequest) -> Result<MemoryEntry, McpError> {
        let category: MemoryCategory = parse(&req.category)?;
        self.workspace
            .add_memory(category, &req.text)
            .map_err(to_mcp)
    }

    pub fn handle_list_memory(&self, req: ListMemoryRequest) -> Result<MemoryListResponse, McpError> {
        let category = parse_opt(req.category.as_deref())?;
        let entries = self.workspace.list_memory(category).map_err(to_mcp)?;
        Ok(MemoryListResponse { entries })
    }
}

#[tool_router]
impl McpServer {
    // ============================================================
    // Planning tools
    // ============================================================

    #[tool(
        description = "Decide what to work on. Returns one of: 'resume' (a task already in progress), 'start' (the first ready task of an active epic), 'plan' (an epic still in planning that needs breaking into tasks) or 'idle'. Call this FIRST when picking up work."
    )]
    async fn next_action(&self) -> Result<CallToolResult, McpError> {
        json_result(&self.handle_next_action()?)
    }

    #[tool(
        description = "List tasks with their derived status. A pending task with unfinished dependencies is reported as 'blocked' together with the blocking ids."
    )]
    async fn list_tasks(
        &self,
        params: Parameters<ListTasksRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.handle_list_tasks(params.0)?)
    }

    #[tool(
        description = "List tasks that can be started now: pending, every dependency done, epic not closed. Ordered by creation."
    )]
    async fn ready_tasks(
        &self,
        params: Parameters<ReadyTasksRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.handle_ready_tasks(params.0)?)
    }

    #[tool(description = "Get one task with its dependencies, blockers and timestamps.")]
    async fn get_task(
        &self,
        params: Parameters<GetTaskRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.handle_get_task(params.0)?)
    }

    #[tool(description = "Create an epic in 'planning'. Returns the epic with its new id.")]
    async fn create_epic(
        &self,
        params: Parameters<CreateEpicRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.handle_create_epic(params.0)?)
    }

    #[tool(
        description = "Create a pending task in an epic, optionally depending on existing tasks. Fails if a dependency does not exist or the epic is closed."
    )]
    async fn create_task(
        &self,
        params: Parameters<CreateTaskRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.handle_create_task(params.0)?)
    }

    #[tool(
        description = "Replace the dependency list of a pending task. Rejected with the offending path if it would create a cycle; nothing changes on rejection."
    )]
    async fn set_dependencies(
        &self,
        params: Parameters<SetDependenciesRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.handle_set_dependencies(params.0)?)
    }

    // ============================================================
    // Execution tools
    // ============================================================

    #[tool(
        description = "Move a ready task to 'in_progress'. Call this BEFORE editing any files for the task; edits are refused while the task is pending."
    )]
    async fn start_task(
        &self,
        params: Parameters<StartTaskRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.handle_start_task(params.0)?)
    }

    #[tool(
        description = "Mark an in-progress task done with a summary of the work. When review gating is enabled the latest review must be SHIP."
    )]
    async fn complete_task(
        &self,
        params: Parameters<CompleteTaskRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.handle_complete_task(params.0)?)
    }

    #[tool(
        description = "Record a review verdict for a task. After maxIterations NEEDS_WORK verdicts in one cycle the verdict is escalated to MAJOR_RETHINK (marked forced)."
    )]
    async fn log_review(
        &self,
        params: Parameters<LogReviewRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.handle_log_review(params.0)?)
    }

    #[tool(
        description = "Ask whether a file edit is allowed for the current task. Allowed only when no task is given or the task is in progress; otherwise the reason is 'pending', 'blocked' or 'terminal'."
    )]
    async fn check_mutation(
        &self,
        params: Parameters<CheckMutationRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.handle_check_mutation(params.0)?)
    }

    // ============================================================
    // Memory tools
    // ============================================================

    #[tool(description = "Remember a pitfall, convention or decision for future work.")]
    async fn add_memory(
        &self,
        params: Parameters<AddMemoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.handle_add_memory(params.0)?)
    }

    #[tool(description = "List remembered notes in chronological order.")]
    async fn list_memory(
        &self,
        params: Parameters<ListMemoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.handle_list_memory(params.0)?)
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: rmcp::model::Implementation {
                name: "taskctl".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            instructions: Some(
                r#"taskctl tracks epics, their tasks and the dependencies between tasks.

WORKFLOW:
1. Call next_action to find out what to do
2. 'plan': break the epic into tasks with create_task (set depends_on for ordering)
3. 'start': call start_task, then implement
4. Before editing files, check_mutation must allow it (the task must be in progress)
5. When review gating is on, log_review with the reviewer's verdict
6. complete_task with a summary once the work is verified

RULES:
- A task can only start when all of its dependencies are done
- Dependencies never form cycles; set_dependencies rejects them
- Done and cancelled tasks are frozen; create a new task for further work
- Every refusal comes back with a reason; fix the cause, do not retry blindly"#
                    .into(),
            ),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(workspace: Workspace) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let service = McpServer::new(workspace);
    let server = service.serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}
