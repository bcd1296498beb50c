//! Plain-text rendering for the command line.

use crate::models::{
    DisplayStatus, EpicSummary, MemoryEntry, ReviewReceipt, TaskId, TaskView,
};
use crate::workspace::{EpicDetail, NextAction, StatusReport};

const PENDING: char = '○';
const BLOCKED: char = '⊘';
const IN_PROGRESS: char = '◐';
const DONE: char = '●';
const CANCELLED: char = '✗';

fn status_symbol(status: DisplayStatus) -> char {
    match status {
        DisplayStatus::Pending => PENDING,
        DisplayStatus::Blocked => BLOCKED,
        DisplayStatus::InProgress => IN_PROGRESS,
        DisplayStatus::Done => DONE,
        DisplayStatus::Cancelled => CANCELLED,
    }
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// `id [status] (done/total) title`
pub fn epic_line(summary: &EpicSummary) -> String {
    format!(
        "{} [{}] ({}/{}) {}",
        summary.epic.id, summary.epic.status, summary.tasks_done, summary.task_count, summary.epic.title
    )
}

pub fn task_line(view: &TaskView) -> String {
    let mut line = format!(
        "{} [{}] {}",
        view.task.id, view.display_status, view.task.title
    );
    if !view.blocked_by.is_empty() {
        line.push_str(&format!(" (blocked by {})", join_ids(&view.blocked_by)));
    }
    line
}

/// Render an epic and its tasks as a tree with status symbols.
///
/// ```text
/// ca-1-a3f [in_progress] (1/3) Authentication
/// ├── ● ca-1-a3f.1 Password login
/// ├── ◐ ca-1-a3f.2 Session tokens
/// └── ⊘ ca-1-a3f.3 Logout (blocked by ca-1-a3f.2)
/// ```
pub fn epic_tree(detail: &EpicDetail) -> String {
    let mut output = epic_line(&detail.summary);
    output.push('\n');
    for (i, view) in detail.tasks.iter().enumerate() {
        let branch = if i + 1 == detail.tasks.len() {
            "└── "
        } else {
            "├── "
        };
        output.push_str(branch);
        output.push(status_symbol(view.display_status));
        output.push(' ');
        output.push_str(&view.task.id.to_string());
        output.push(' ');
        output.push_str(&view.task.title);
        if !view.blocked_by.is_empty() {
            output.push_str(&format!(" (blocked by {})", join_ids(&view.blocked_by)));
        }
        output.push('\n');
    }
    output
}

pub fn task_detail(view: &TaskView) -> String {
    let task = &view.task;
    let mut out = format!("{} {}\n", task.id, task.title);
    out.push_str(&format!("  epic:       {}\n", task.epic_id));
    out.push_str(&format!("  status:     {}\n", view.display_status));
    if !task.depends_on.is_empty() {
        out.push_str(&format!("  depends on: {}\n", join_ids(&task.depends_on)));
    }
    if !view.blocked_by.is_empty() {
        out.push_str(&format!("  blocked by: {}\n", join_ids(&view.blocked_by)));
    }
    out.push_str(&format!("  created:    {}\n", task.created_at.to_rfc3339()));
    if let Some(at) = task.started_at {
        out.push_str(&format!("  started:    {}\n", at.to_rfc3339()));
    }
    if let Some(at) = task.completed_at {
        out.push_str(&format!("  completed:  {}\n", at.to_rfc3339()));
    }
    if let Some(summary) = &task.summary {
        out.push_str(&format!("  summary:    {summary}\n"));
    }
    out
}

pub fn receipt(receipt: &ReviewReceipt) -> String {
    let forced = if receipt.forced { " (forced)" } else { "" };
    let mut out = format!(
        "#{} {}{} by {} at {}\n",
        receipt.iteration,
        receipt.verdict,
        forced,
        receipt.reviewer,
        receipt.timestamp.to_rfc3339()
    );
    if !receipt.notes.is_empty() {
        for line in receipt.notes.lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

pub fn memory_line(entry: &MemoryEntry) -> String {
    format!(
        "{} [{}] {}",
        entry.timestamp.format("%Y-%m-%d %H:%M"),
        entry.category,
        entry.text
    )
}

pub fn next_action(action: &NextAction) -> String {
    match action {
        NextAction::Resume { task } => format!("resume {}", task_line(task)),
        NextAction::Start { task } => format!("start {}", task_line(task)),
        NextAction::Plan { epic } => format!("plan {}", epic_line(epic)),
        NextAction::Idle => "idle: nothing to do".to_string(),
    }
}

pub fn status(report: &StatusReport) -> String {
    let e = &report.epics;
    let t = &report.tasks;
    format!(
        "epics: {} planning, {} ready, {} in progress, {} done, {} cancelled\n\
         tasks: {} pending, {} blocked, {} in progress, {} done, {} cancelled\n\
         ready: {}\n\
         review gating: {}\n\
         memory: {}\n",
        e.planning,
        e.ready,
        e.in_progress,
        e.done,
        e.cancelled,
        t.pending,
        t.blocked,
        t.in_progress,
        t.done,
        t.cancelled,
        report.ready,
        on_off(report.review_enabled),
        on_off(report.memory_enabled),
    )
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Epic, EpicId, EpicStatus, Task, TaskStatus};
    use chrono::Utc;

    fn view(seq: u32, status: DisplayStatus, blocked_by: Vec<TaskId>) -> TaskView {
        let epic: EpicId = "ca-1-a3f".parse().unwrap();
        let now = Utc::now();
        let stored = match status {
            DisplayStatus::Pending | DisplayStatus::Blocked => TaskStatus::Pending,
            DisplayStatus::InProgress => TaskStatus::InProgress,
            DisplayStatus::Done => TaskStatus::Done,
            DisplayStatus::Cancelled => TaskStatus::Cancelled,
        };
        TaskView {
            task: Task {
                id: epic.task(seq),
                epic_id: epic,
                title: format!("Task {seq}"),
                status: stored,
                depends_on: blocked_by.clone(),
                created_at: now,
                updated_at: now,
                started_at: None,
                completed_at: None,
                summary: None,
            },
            display_status: status,
            blocked_by,
        }
    }

    fn summary(done: usize, total: usize) -> EpicSummary {
        let now = Utc::now();
        EpicSummary {
            epic: Epic {
                id: "ca-1-a3f".parse().unwrap(),
                title: "Auth".into(),
                status: EpicStatus::InProgress,
                created_at: now,
                updated_at: now,
            },
            task_count: total,
            tasks_done: done,
        }
    }

    #[test]
    fn test_epic_line() {
        assert_eq!(epic_line(&summary(1, 3)), "ca-1-a3f [in_progress] (1/3) Auth");
    }

    #[test]
    fn test_epic_without_tasks() {
        let detail = EpicDetail {
            summary: summary(0, 0),
            tasks: vec![],
        };
        assert_eq!(epic_tree(&detail), "ca-1-a3f [in_progress] (0/0) Auth\n");
    }

    #[test]
    fn test_tree_with_blocked_task() {
        let blocker: TaskId = "ca-1-a3f.2".parse().unwrap();
        let detail = EpicDetail {
            summary: summary(1, 3),
            tasks: vec![
                view(1, DisplayStatus::Done, vec![]),
                view(2, DisplayStatus::InProgress, vec![]),
                view(3, DisplayStatus::Blocked, vec![blocker]),
            ],
        };
        assert_eq!(
            epic_tree(&detail),
            "ca-1-a3f [in_progress] (1/3) Auth\n\
             ├── ● ca-1-a3f.1 Task 1\n\
             ├── ◐ ca-1-a3f.2 Task 2\n\
             └── ⊘ ca-1-a3f.3 Task 3 (blocked by ca-1-a3f.2)\n"
        );
    }
}
