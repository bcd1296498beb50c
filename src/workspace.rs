//! Query/command façade over the engine components.
//!
//! Every command-line and MCP operation goes through [`Workspace`]. It owns
//! the lock discipline: the graph lock is always taken before any entity
//! lock, shared for readiness and task start, exclusive for dependency
//! changes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::config::{Config, ConfigKey};
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::guard::{self, Decision};
use crate::memory;
use crate::models::*;
use crate::review::{self, ReviewState};
use crate::state;
use crate::store::{lock, Meta, Store, DIR_NAME};

#[derive(Debug, Clone)]
pub struct Workspace {
    store: Store,
}

/// Result of looking for a workspace without requiring one.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub found: bool,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpicDetail {
    #[serde(flatten)]
    pub summary: EpicSummary,
    pub tasks: Vec<TaskView>,
}

/// What to work on next.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NextAction {
    /// A task is already in progress.
    Resume { task: TaskView },
    /// The first ready task of an active epic.
    Start { task: TaskView },
    /// An epic still in planning that needs decomposing into tasks.
    Plan { epic: EpicSummary },
    Idle,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EpicCounts {
    pub planning: usize,
    pub ready: usize,
    pub in_progress: usize,
    pub done: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub blocked: usize,
    pub in_progress: usize,
    pub done: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub epics: EpicCounts,
    pub tasks: TaskCounts,
    pub ready: usize,
    pub review_enabled: bool,
    pub memory_enabled: bool,
}

impl Workspace {
    /// Directory holding the workspace of `project`.
    pub fn dir_for(project: &Path) -> PathBuf {
        project.join(DIR_NAME)
    }

    /// Create (or reuse) the workspace of `project`. The flag reports
    /// whether it was newly created.
    pub fn init(project: &Path) -> Result<(Self, bool)> {
        let (store, created) = Store::init(Self::dir_for(project))?;
        Ok((Self { store }, created))
    }

    pub fn open(project: &Path) -> Result<Self> {
        Ok(Self {
            store: Store::open(Self::dir_for(project))?,
        })
    }

    pub fn detect(project: &Path) -> Detection {
        let path = Self::dir_for(project);
        let meta = Store::open(&path).and_then(|s| s.meta()).ok();
        Detection {
            found: meta.is_some(),
            path,
            meta,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Snapshot of the whole dependency graph. Callers hold the graph lock
    /// when the answer must stay valid while they act on it.
    fn snapshot(&self) -> Result<DependencyGraph> {
        let tasks = self.store.list_tasks()?;
        let epics = self.store.list_epics()?;
        Ok(DependencyGraph::build(&tasks, &epics))
    }

    pub fn graph(&self) -> Result<DependencyGraph> {
        let _graph = self.store.lock_shared(lock::GRAPH)?;
        self.snapshot()
    }

    fn view(graph: &DependencyGraph, task: Task) -> TaskView {
        let blocked_by = if task.status == TaskStatus::Pending {
            graph.blockers(&task.id)
        } else {
            Vec::new()
        };
        TaskView {
            display_status: DisplayStatus::of(task.status, !blocked_by.is_empty()),
            blocked_by,
            task,
        }
    }

    fn summarize(epic: Epic, tasks: &[Task]) -> EpicSummary {
        let children: Vec<&Task> = tasks.iter().filter(|t| t.epic_id == epic.id).collect();
        EpicSummary {
            task_count: children.len(),
            tasks_done: children
                .iter()
                .filter(|t| t.status == TaskStatus::Done)
                .count(),
            epic,
        }
    }

    // ============================================================
    // Epic commands
    // ============================================================

    pub fn create_epic(&self, title: &str) -> Result<Epic> {
        self.store.create_epic(title)
    }

    pub fn list_epics(&self, status: Option<EpicStatus>) -> Result<Vec<EpicSummary>> {
        let tasks = self.store.list_tasks()?;
        Ok(self
            .store
            .list_epics()?
            .into_iter()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .map(|e| Self::summarize(e, &tasks))
            .collect())
    }

    pub fn show_epic(&self, id: &EpicId) -> Result<EpicDetail> {
        let epic = self.store.get_epic(id)?;
        let all = self.store.list_tasks()?;
        let graph = DependencyGraph::build(&all, std::slice::from_ref(&epic));
        let summary = Self::summarize(epic, &all);
        let tasks = all
            .into_iter()
            .filter(|t| &t.epic_id == id)
            .map(|t| Self::view(&graph, t))
            .collect();
        Ok(EpicDetail { summary, tasks })
    }

    /// Explicit epic transition. Holding the epic lock keeps new tasks out
    /// while the child-task preconditions are evaluated.
    pub fn set_epic_status(&self, id: &EpicId, to: EpicStatus) -> Result<Epic> {
        let epic = self.store.update_epic(id, |epic| {
            let tasks = self.store.list_epic_tasks(id)?;
            state::transition_epic(epic, to, &tasks)
        })?;
        tracing::info!(%id, status = %to, "epic status changed");
        Ok(epic)
    }

    // ============================================================
    // Task commands
    // ============================================================

    /// Create a task, validating any dependencies under the exclusive graph
    /// lock so the edges cannot go stale before the insert.
    pub fn create_task(&self, epic: &EpicId, title: &str, deps: &[TaskId]) -> Result<Task> {
        if deps.is_empty() {
            return self.store.create_task(epic, title, Vec::new());
        }
        let _graph = self.store.lock(lock::GRAPH)?;
        let deps = dedupe(deps);
        let graph = self.snapshot()?;
        ensure_known(&graph, &deps)?;
        self.store.create_task(epic, title, deps)
    }

    pub fn task(&self, id: &TaskId) -> Result<TaskView> {
        let task = self.store.get_task(id)?;
        let graph = self.snapshot()?;
        Ok(Self::view(&graph, task))
    }

    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskView>> {
        let tasks = self.store.list_tasks()?;
        let epics = self.store.list_epics()?;
        let graph = DependencyGraph::build(&tasks, &epics);
        Ok(tasks
            .into_iter()
            .map(|t| Self::view(&graph, t))
            .filter(|v| filter.matches(v))
            .collect())
    }

    /// Ready tasks in creation order.
    pub fn ready(&self, epic: Option<&EpicId>) -> Result<Vec<TaskView>> {
        let _graph = self.store.lock_shared(lock::GRAPH)?;
        let graph = self.snapshot()?;
        graph
            .ready(epic)
            .iter()
            .map(|id| Ok(Self::view(&graph, self.store.get_task(id)?)))
            .collect()
    }

    pub fn start_task(&self, id: &TaskId) -> Result<Task> {
        let _graph = self.store.lock_shared(lock::GRAPH)?;
        let task = self.store.update_task(id, |task| {
            let graph = self.snapshot()?;
            state::start_task(task, &graph.readiness(id))
        })?;
        tracing::info!(%id, "task started");
        Ok(task)
    }

    /// Finish a started task. With review gating on, only receipts logged
    /// since the task started count towards approval.
    pub fn complete_task(&self, id: &TaskId, summary: &str) -> Result<Task> {
        let task = self.store.update_task(id, |task| {
            let config = self.store.read_config()?;
            if !config.review.enabled {
                return state::complete_task(task, summary, None);
            }
            let _reviews = self.store.lock_reviews(id)?;
            let receipts = self.store.read_receipts(id)?;
            let review = ReviewState::since(&receipts, task.started_at);
            state::complete_task(task, summary, Some(review))
        })?;
        tracing::info!(%id, "task done");
        Ok(task)
    }

    pub fn cancel_task(&self, id: &TaskId) -> Result<Task> {
        let task = self.store.update_task(id, state::cancel_task)?;
        tracing::info!(%id, "task cancelled");
        Ok(task)
    }

    /// Generic status change, dispatching to the specific transition.
    pub fn set_task_status(&self, id: &TaskId, status: &str, summary: Option<&str>) -> Result<Task> {
        match status.parse::<TaskStatus>()? {
            TaskStatus::InProgress => self.start_task(id),
            TaskStatus::Done => self.complete_task(id, summary.unwrap_or_default()),
            TaskStatus::Cancelled => self.cancel_task(id),
            TaskStatus::Pending => {
                let task = self.store.get_task(id)?;
                if task.status.is_terminal() {
                    return Err(Error::terminal(id, task.status));
                }
                Err(Error::illegal(
                    task.status,
                    TaskStatus::Pending,
                    "tasks never return to pending",
                ))
            }
        }
    }

    /// Replace the dependency set of a pending task.
    pub fn set_dependencies(&self, id: &TaskId, deps: &[TaskId]) -> Result<Task> {
        self.amend_dependencies(id, |_| deps.to_vec())
    }

    pub fn add_dependency(&self, id: &TaskId, on: &TaskId) -> Result<Task> {
        self.amend_dependencies(id, |current| {
            let mut deps = current.to_vec();
            deps.push(on.clone());
            deps
        })
    }

    pub fn remove_dependency(&self, id: &TaskId, on: &TaskId) -> Result<Task> {
        let _graph = self.store.lock(lock::GRAPH)?;
        self.store.update_task(id, |task| {
            ensure_amendable(task)?;
            let before = task.depends_on.len();
            task.depends_on.retain(|d| d != on);
            if task.depends_on.len() == before {
                return Err(Error::NotFound(format!("dependency {on} of task {id}")));
            }
            Ok(())
        })
    }

    fn amend_dependencies(
        &self,
        id: &TaskId,
        compute: impl FnOnce(&[TaskId]) -> Vec<TaskId>,
    ) -> Result<Task> {
        let _graph = self.store.lock(lock::GRAPH)?;
        let graph = self.snapshot()?;
        let task = self.store.update_task(id, |task| {
            ensure_amendable(task)?;
            let deps = dedupe(&compute(&task.depends_on));
            ensure_known(&graph, &deps)?;
            graph.check_dependencies(id, &deps)?;
            task.depends_on = deps;
            Ok(())
        })?;
        tracing::info!(%id, deps = task.depends_on.len(), "dependencies updated");
        Ok(task)
    }

    pub fn check_graph(&self) -> Result<usize> {
        let graph = self.graph()?;
        graph.validate_no_cycle()?;
        Ok(graph.len())
    }

    // ============================================================
    // Spec bodies
    // ============================================================

    pub fn read_spec(&self, id: &EntityId) -> Result<String> {
        self.store.read_spec(id)
    }

    pub fn write_spec(&self, id: &EntityId, body: &str) -> Result<()> {
        self.store.write_spec(id, body)
    }

    // ============================================================
    // Planning queries
    // ============================================================

    pub fn next(&self) -> Result<NextAction> {
        let _graph = self.store.lock_shared(lock::GRAPH)?;
        let tasks = self.store.list_tasks()?;
        let epics = self.store.list_epics()?;
        let graph = DependencyGraph::build(&tasks, &epics);

        if let Some(task) = tasks.iter().find(|t| t.status == TaskStatus::InProgress) {
            return Ok(NextAction::Resume {
                task: Self::view(&graph, task.clone()),
            });
        }

        let active: HashSet<&EpicId> = epics
            .iter()
            .filter(|e| matches!(e.status, EpicStatus::Ready | EpicStatus::InProgress))
            .map(|e| &e.id)
            .collect();
        let first_ready = graph
            .ready(None)
            .into_iter()
            .find(|id| active.contains(id.epic()));
        if let Some(id) = first_ready {
            if let Some(task) = tasks.iter().find(|t| t.id == id) {
                return Ok(NextAction::Start {
                    task: Self::view(&graph, task.clone()),
                });
            }
        }

        if let Some(epic) = epics.iter().find(|e| e.status == EpicStatus::Planning) {
            return Ok(NextAction::Plan {
                epic: Self::summarize(epic.clone(), &tasks),
            });
        }
        Ok(NextAction::Idle)
    }

    pub fn status(&self) -> Result<StatusReport> {
        let tasks = self.store.list_tasks()?;
        let epics = self.store.list_epics()?;
        let config = self.store.read_config()?;
        let graph = DependencyGraph::build(&tasks, &epics);

        let mut epic_counts = EpicCounts::default();
        for epic in &epics {
            let slot = match epic.status {
                EpicStatus::Planning => &mut epic_counts.planning,
                EpicStatus::Ready => &mut epic_counts.ready,
                EpicStatus::InProgress => &mut epic_counts.in_progress,
                EpicStatus::Done => &mut epic_counts.done,
                EpicStatus::Cancelled => &mut epic_counts.cancelled,
            };
            *slot += 1;
        }
        let mut task_counts = TaskCounts::default();
        for task in &tasks {
            let blocked = task.status == TaskStatus::Pending && !graph.blockers(&task.id).is_empty();
            let slot = match DisplayStatus::of(task.status, blocked) {
                DisplayStatus::Pending => &mut task_counts.pending,
                DisplayStatus::Blocked => &mut task_counts.blocked,
                DisplayStatus::InProgress => &mut task_counts.in_progress,
                DisplayStatus::Done => &mut task_counts.done,
                DisplayStatus::Cancelled => &mut task_counts.cancelled,
            };
            *slot += 1;
        }
        Ok(StatusReport {
            epics: epic_counts,
            tasks: task_counts,
            ready: graph.ready(None).len(),
            review_enabled: config.review.enabled,
            memory_enabled: config.memory.enabled,
        })
    }

    // ============================================================
    // Review gate
    // ============================================================

    /// Enable review gating with the default iteration bound.
    pub fn review_init(&self) -> Result<Config> {
        self.store.update_config(|config| {
            config.review.enabled = true;
            config.review.max_iterations = crate::config::DEFAULT_MAX_ITERATIONS;
            Ok(())
        })
    }

    /// Append a receipt. Refused while review gating is off.
    pub fn log_review(&self, id: &TaskId, input: ReviewInput) -> Result<ReviewReceipt> {
        let task = self.store.get_task(id)?;
        let config = self.store.read_config()?;
        if !config.review.enabled {
            return Err(Error::Invalid(
                "review gating is not enabled; run `taskctl review init` first".to_string(),
            ));
        }
        let receipt = self.store.append_receipt(id, |existing| {
            Ok(review::build_receipt(
                &task,
                existing,
                input,
                config.review.max_iterations,
                Utc::now(),
            ))
        })?;
        tracing::info!(
            %id,
            verdict = %receipt.verdict,
            iteration = receipt.iteration,
            forced = receipt.forced,
            "review logged"
        );
        Ok(receipt)
    }

    pub fn reviews(&self, id: &TaskId) -> Result<Vec<ReviewReceipt>> {
        self.store.get_task(id)?;
        self.store.read_receipts(id)
    }

    /// One receipt: the given iteration, or the latest.
    pub fn review(&self, id: &TaskId, iteration: Option<u32>) -> Result<ReviewReceipt> {
        let receipts = self.reviews(id)?;
        let found = match iteration {
            Some(n) => receipts.into_iter().find(|r| r.iteration == n),
            None => receipts.into_iter().last(),
        };
        found.ok_or_else(|| match iteration {
            Some(n) => Error::NotFound(format!("review iteration {n} of task {id}")),
            None => Error::NotFound(format!("reviews of task {id}")),
        })
    }

    pub fn review_count(&self, id: &TaskId) -> Result<usize> {
        Ok(self.reviews(id)?.len())
    }

    /// The state the completion gate would see right now.
    pub fn review_state(&self, id: &TaskId) -> Result<ReviewState> {
        let task = self.store.get_task(id)?;
        Ok(ReviewState::since(&self.reviews(id)?, task.started_at))
    }

    // ============================================================
    // Guard
    // ============================================================

    /// Read-only veto check for a file mutation scoped to `current`.
    pub fn check_mutation_allowed(&self, current: Option<&TaskId>) -> Result<Decision> {
        let Some(id) = current else {
            return Ok(guard::check(None, &[]));
        };
        let task = self.store.get_task(id)?;
        let blockers = if task.status == TaskStatus::Pending {
            self.snapshot()?.blockers(id)
        } else {
            Vec::new()
        };
        let decision = guard::check(Some(&task), &blockers);
        if let Decision::Deny { reason } = &decision {
            tracing::info!(%id, code = reason.code(), "mutation denied");
        }
        Ok(decision)
    }

    /// Like [`check_mutation_allowed`](Self::check_mutation_allowed), with a
    /// denial surfaced as [`Error::Denied`].
    pub fn guard(&self, current: Option<&TaskId>) -> Result<()> {
        match self.check_mutation_allowed(current)? {
            Decision::Allow => Ok(()),
            Decision::Deny { reason } => Err(Error::Denied(reason)),
        }
    }

    // ============================================================
    // Memory ledger
    // ============================================================

    pub fn memory_init(&self) -> Result<Config> {
        self.store.update_config(|config| {
            config.memory.enabled = true;
            Ok(())
        })
    }

    pub fn add_memory(&self, category: MemoryCategory, text: &str) -> Result<MemoryEntry> {
        memory::append(&self.store, category, text)
    }

    pub fn list_memory(&self, category: Option<MemoryCategory>) -> Result<Vec<MemoryEntry>> {
        memory::list(&self.store, category)
    }

    // ============================================================
    // Configuration
    // ============================================================

    pub fn config(&self) -> Result<Config> {
        self.store.read_config()
    }

    pub fn config_get(&self, key: &str) -> Result<Value> {
        let key: ConfigKey = key.parse()?;
        Ok(self.store.read_config()?.get(key))
    }

    pub fn config_set(&self, key: &str, value: &str) -> Result<Config> {
        let key: ConfigKey = key.parse()?;
        self.store.update_config(|config| config.set(key, value))
    }
}

/// Dependencies may only change while a task is pending.
fn ensure_amendable(task: &Task) -> Result<()> {
    match task.status {
        TaskStatus::Pending => Ok(()),
        TaskStatus::Done | TaskStatus::Cancelled => Err(Error::terminal(&task.id, task.status)),
        TaskStatus::InProgress => Err(Error::Invalid(format!(
            "dependencies of {} can only change while it is pending",
            task.id
        ))),
    }
}

fn ensure_known(graph: &DependencyGraph, deps: &[TaskId]) -> Result<()> {
    match deps.iter().find(|d| !graph.contains(d)) {
        Some(missing) => Err(Error::NotFound(format!("task {missing}"))),
        None => Ok(()),
    }
}

/// Collapse duplicates, keeping first-seen order.
fn dedupe(ids: &[TaskId]) -> Vec<TaskId> {
    let mut seen = HashSet::new();
    ids.iter().filter(|id| seen.insert(*id)).cloned().collect()
}
