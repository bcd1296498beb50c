//! Lifecycle rules for tasks and epics.
//!
//! These are pure checks over snapshots; the workspace applies them inside
//! the store's read-modify-write so the check and the write are atomic.

use chrono::Utc;

use crate::error::{Error, Result};
use crate::graph::Readiness;
use crate::models::{Epic, EpicStatus, Task, TaskStatus};
use crate::review::ReviewState;

fn list(ids: &[impl ToString]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// `pending -> in_progress`, only for ready tasks.
pub fn start_task(task: &mut Task, readiness: &Readiness) -> Result<()> {
    match task.status {
        TaskStatus::Done | TaskStatus::Cancelled => {
            return Err(Error::terminal(&task.id, task.status))
        }
        TaskStatus::InProgress => {
            return Err(Error::illegal(
                TaskStatus::InProgress,
                TaskStatus::InProgress,
                "task already started",
            ))
        }
        TaskStatus::Pending => {}
    }
    match readiness {
        Readiness::Ready => {}
        Readiness::Blocked(blockers) => {
            return Err(Error::illegal(
                TaskStatus::Pending,
                TaskStatus::InProgress,
                format!("blocked by {}; complete those first", list(blockers)),
            ))
        }
        Readiness::EpicInactive { epic, status } => {
            let status = status.map_or("missing".to_string(), |s| s.to_string());
            return Err(Error::illegal(
                TaskStatus::Pending,
                TaskStatus::InProgress,
                format!("epic {epic} is {status}"),
            ));
        }
        Readiness::NotPending(status) => {
            return Err(Error::illegal(
                *status,
                TaskStatus::InProgress,
                "task is not pending",
            ))
        }
    }
    let now = Utc::now();
    task.status = TaskStatus::InProgress;
    task.started_at = Some(now);
    Ok(())
}

/// `in_progress -> done` with a summary, and an approving review when
/// `review` is given (review gating enabled).
pub fn complete_task(task: &mut Task, summary: &str, review: Option<ReviewState>) -> Result<()> {
    match task.status {
        TaskStatus::Done | TaskStatus::Cancelled => {
            return Err(Error::terminal(&task.id, task.status))
        }
        TaskStatus::Pending => {
            return Err(Error::illegal(
                TaskStatus::Pending,
                TaskStatus::Done,
                "task not started",
            ))
        }
        TaskStatus::InProgress => {}
    }
    let summary = summary.trim();
    if summary.is_empty() {
        return Err(Error::illegal(
            TaskStatus::InProgress,
            TaskStatus::Done,
            "a completion summary is required",
        ));
    }
    if let Some(reason) = review.and_then(|r| r.blocking_reason()) {
        return Err(Error::illegal(TaskStatus::InProgress, TaskStatus::Done, reason));
    }
    task.status = TaskStatus::Done;
    task.completed_at = Some(Utc::now());
    task.summary = Some(summary.to_string());
    Ok(())
}

pub fn cancel_task(task: &mut Task) -> Result<()> {
    if task.status.is_terminal() {
        return Err(Error::terminal(&task.id, task.status));
    }
    task.status = TaskStatus::Cancelled;
    task.completed_at = Some(Utc::now());
    Ok(())
}

/// Move an epic along `planning -> ready -> in_progress -> done`, or to
/// `cancelled` from any non-terminal state. `tasks` are the epic's children.
pub fn transition_epic(epic: &mut Epic, to: EpicStatus, tasks: &[Task]) -> Result<()> {
    let from = epic.status;
    if from.is_terminal() {
        return Err(Error::terminal(&epic.id, from));
    }
    if to == EpicStatus::Cancelled {
        epic.status = to;
        return Ok(());
    }
    match (from.rank(), to.rank()) {
        (Some(a), Some(b)) if b == a + 1 => {}
        _ if from == to => return Err(Error::illegal(from, to, format!("epic is already {to}"))),
        _ => {
            return Err(Error::illegal(
                from,
                to,
                "epics move planning -> ready -> in_progress -> done one step at a time",
            ))
        }
    }
    match to {
        EpicStatus::Ready if tasks.is_empty() => {
            return Err(Error::illegal(
                from,
                to,
                "epic has no tasks; decompose it first",
            ))
        }
        EpicStatus::Done => {
            let open: Vec<_> = tasks
                .iter()
                .filter(|t| !t.status.is_terminal())
                .map(|t| &t.id)
                .collect();
            if !open.is_empty() {
                return Err(Error::illegal(
                    from,
                    to,
                    format!("tasks still open: {}", list(&open)),
                ));
            }
        }
        _ => {}
    }
    epic.status = to;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EpicId;

    fn epic_id() -> EpicId {
        "ca-1-abc".parse().unwrap()
    }

    fn task(status: TaskStatus) -> Task {
        let now = Utc::now();
        Task {
            id: epic_id().task(1),
            epic_id: epic_id(),
            title: "t".into(),
            status,
            depends_on: vec![],
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            summary: None,
        }
    }

    fn epic(status: EpicStatus) -> Epic {
        let now = Utc::now();
        Epic {
            id: epic_id(),
            title: "e".into(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn start_checks_run_in_order() {
        let mut done = task(TaskStatus::Done);
        assert!(matches!(
            start_task(&mut done, &Readiness::Ready),
            Err(Error::AlreadyTerminal { .. })
        ));

        let mut started = task(TaskStatus::InProgress);
        let err = start_task(&mut started, &Readiness::Ready).unwrap_err();
        assert!(err.to_string().contains("task already started"));

        let mut pending = task(TaskStatus::Pending);
        let blocker = epic_id().task(2);
        let err = start_task(&mut pending, &Readiness::Blocked(vec![blocker])).unwrap_err();
        assert!(err.to_string().contains("ca-1-abc.2"), "{err}");
        assert_eq!(pending.status, TaskStatus::Pending);

        start_task(&mut pending, &Readiness::Ready).unwrap();
        assert_eq!(pending.status, TaskStatus::InProgress);
        assert!(pending.started_at.is_some());
    }

    #[test]
    fn done_requires_start_summary_and_approval() {
        let mut pending = task(TaskStatus::Pending);
        let err = complete_task(&mut pending, "did it", None).unwrap_err();
        assert!(err.to_string().contains("task not started"));

        let mut t = task(TaskStatus::InProgress);
        let err = complete_task(&mut t, "  ", None).unwrap_err();
        assert!(err.to_string().contains("summary is required"));

        let err = complete_task(&mut t, "did it", Some(ReviewState::NotReviewed)).unwrap_err();
        assert!(matches!(err, Error::IllegalTransition { .. }));

        complete_task(&mut t, "did it", Some(ReviewState::Approved)).unwrap();
        assert_eq!(t.status, TaskStatus::Done);
        assert_eq!(t.summary.as_deref(), Some("did it"));
    }

    #[test]
    fn cancel_is_refused_once_terminal() {
        let mut t = task(TaskStatus::Pending);
        cancel_task(&mut t).unwrap();
        assert!(matches!(cancel_task(&mut t), Err(Error::AlreadyTerminal { .. })));
    }

    #[test]
    fn epic_moves_forward_one_step() {
        let mut e = epic(EpicStatus::Planning);
        let err = transition_epic(&mut e, EpicStatus::Ready, &[]).unwrap_err();
        assert!(err.to_string().contains("decompose"));

        let tasks = [task(TaskStatus::Pending)];
        assert!(transition_epic(&mut e, EpicStatus::InProgress, &tasks).is_err());
        transition_epic(&mut e, EpicStatus::Ready, &tasks).unwrap();
        assert!(transition_epic(&mut e, EpicStatus::Ready, &tasks).is_err());
        assert!(transition_epic(&mut e, EpicStatus::Planning, &tasks).is_err());
        transition_epic(&mut e, EpicStatus::InProgress, &tasks).unwrap();

        let err = transition_epic(&mut e, EpicStatus::Done, &tasks).unwrap_err();
        assert!(err.to_string().contains("ca-1-abc.1"));
        transition_epic(&mut e, EpicStatus::Done, &[task(TaskStatus::Cancelled)]).unwrap();
        assert!(matches!(
            transition_epic(&mut e, EpicStatus::Cancelled, &[]),
            Err(Error::AlreadyTerminal { .. })
        ));
    }

    #[test]
    fn cancel_epic_from_any_open_state() {
        for from in [EpicStatus::Planning, EpicStatus::Ready, EpicStatus::InProgress] {
            let mut e = epic(from);
            transition_epic(&mut e, EpicStatus::Cancelled, &[]).unwrap();
            assert_eq!(e.status, EpicStatus::Cancelled);
        }
    }
}
