//! Review gate: bounded review iterations on a task's implementation.
//!
//! Receipts form an append-only log per task. A work cycle runs until a
//! `SHIP` or `MAJOR_RETHINK` receipt; within a cycle, once the attempt
//! number reaches `maxIterations` a further `NEEDS_WORK` is recorded as a
//! forced `MAJOR_RETHINK`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{ReviewInput, ReviewReceipt, Task, Verdict, DEFAULT_REVIEWER};

/// Where a task stands with respect to review, derived from its receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReviewState {
    NotReviewed,
    NeedsWork { attempt: u32 },
    Approved,
    Escalated,
}

impl ReviewState {
    pub fn of(receipts: &[ReviewReceipt]) -> Self {
        match receipts.last().map(|r| r.verdict) {
            None => Self::NotReviewed,
            Some(Verdict::Ship) => Self::Approved,
            Some(Verdict::MajorRethink) => Self::Escalated,
            Some(Verdict::NeedsWork) => Self::NeedsWork {
                attempt: current_cycle(receipts).len() as u32,
            },
        }
    }

    /// State over the receipts logged at or after `started`, the start of
    /// the implementation being gated. Older receipts stay in the log but
    /// never approve later work.
    pub fn since(receipts: &[ReviewReceipt], started: Option<DateTime<Utc>>) -> Self {
        let Some(started) = started else {
            return Self::of(receipts);
        };
        let first = receipts
            .iter()
            .position(|r| r.timestamp >= started)
            .unwrap_or(receipts.len());
        Self::of(&receipts[first..])
    }

    /// Remediation text when this state does not permit completion.
    pub fn blocking_reason(&self) -> Option<String> {
        match self {
            Self::Approved => None,
            Self::NotReviewed => {
                Some("review is enabled and the task has no review; log a SHIP verdict first".into())
            }
            Self::NeedsWork { attempt } => Some(format!(
                "latest review is NEEDS_WORK (attempt {attempt}); address the notes and log a new review"
            )),
            Self::Escalated => Some(
                "latest review is MAJOR_RETHINK; rework the approach and log a new review".into(),
            ),
        }
    }
}

/// Receipts since the last cycle-closing verdict.
fn current_cycle(receipts: &[ReviewReceipt]) -> &[ReviewReceipt] {
    let start = receipts
        .iter()
        .rposition(|r| r.verdict.ends_cycle())
        .map_or(0, |i| i + 1);
    &receipts[start..]
}

/// Attempt number the next receipt will carry within its cycle.
pub fn next_attempt(receipts: &[ReviewReceipt]) -> u32 {
    current_cycle(receipts).len() as u32 + 1
}

/// Apply the iteration bound to a submitted verdict.
/// Returns the verdict to record and whether it was forced.
pub fn resolve_verdict(submitted: Verdict, attempt: u32, max_iterations: u32) -> (Verdict, bool) {
    if submitted == Verdict::NeedsWork && attempt >= max_iterations {
        (Verdict::MajorRethink, true)
    } else {
        (submitted, false)
    }
}

/// Build the next receipt for `task` given the receipts already recorded.
pub fn build_receipt(
    task: &Task,
    existing: &[ReviewReceipt],
    input: ReviewInput,
    max_iterations: u32,
    now: DateTime<Utc>,
) -> ReviewReceipt {
    let attempt = next_attempt(existing);
    let (verdict, forced) = resolve_verdict(input.verdict, attempt, max_iterations);
    if forced {
        tracing::warn!(
            task = %task.id,
            attempt,
            max_iterations,
            "review iterations exhausted, escalating to MAJOR_RETHINK"
        );
    }
    ReviewReceipt {
        task_id: task.id.clone(),
        epic_id: task.epic_id.clone(),
        verdict,
        reviewer: input
            .reviewer
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REVIEWER.to_string()),
        notes: input.notes,
        iteration: existing.len() as u32 + 1,
        forced,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EpicId, TaskStatus};

    fn task() -> Task {
        let epic: EpicId = "ca-1-abc".parse().unwrap();
        let now = Utc::now();
        Task {
            id: epic.task(1),
            epic_id: epic,
            title: "t".into(),
            status: TaskStatus::InProgress,
            depends_on: vec![],
            created_at: now,
            updated_at: now,
            started_at: Some(now),
            completed_at: None,
            summary: None,
        }
    }

    fn log(receipts: &mut Vec<ReviewReceipt>, verdict: Verdict, max: u32) -> ReviewReceipt {
        let input = ReviewInput {
            verdict,
            reviewer: None,
            notes: String::new(),
        };
        let receipt = build_receipt(&task(), receipts, input, max, Utc::now());
        receipts.push(receipt.clone());
        receipt
    }

    #[test]
    fn forces_major_rethink_at_the_bound() {
        let mut receipts = Vec::new();
        let first = log(&mut receipts, Verdict::NeedsWork, 3);
        let second = log(&mut receipts, Verdict::NeedsWork, 3);
        let third = log(&mut receipts, Verdict::NeedsWork, 3);
        assert_eq!((first.verdict, first.forced), (Verdict::NeedsWork, false));
        assert_eq!((second.verdict, second.forced), (Verdict::NeedsWork, false));
        assert_eq!((third.verdict, third.forced), (Verdict::MajorRethink, true));
        assert_eq!(third.iteration, 3);
        assert_eq!(ReviewState::of(&receipts), ReviewState::Escalated);
    }

    #[test]
    fn a_new_cycle_starts_after_escalation() {
        let mut receipts = Vec::new();
        for _ in 0..3 {
            log(&mut receipts, Verdict::NeedsWork, 3);
        }
        let next = log(&mut receipts, Verdict::NeedsWork, 3);
        assert_eq!((next.verdict, next.forced), (Verdict::NeedsWork, false));
        assert_eq!(next.iteration, 4);
        assert_eq!(ReviewState::of(&receipts), ReviewState::NeedsWork { attempt: 1 });
    }

    #[test]
    fn ship_is_never_forced() {
        let mut receipts = Vec::new();
        log(&mut receipts, Verdict::NeedsWork, 1);
        let ship = log(&mut receipts, Verdict::Ship, 1);
        assert!(!ship.forced);
        assert_eq!(ship.reviewer, DEFAULT_REVIEWER);
        assert_eq!(ReviewState::of(&receipts), ReviewState::Approved);
        assert!(ReviewState::Approved.blocking_reason().is_none());
    }

    #[test]
    fn receipts_before_the_start_are_ignored() {
        let mut receipts = Vec::new();
        log(&mut receipts, Verdict::Ship, 3);
        let started = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(ReviewState::of(&receipts), ReviewState::Approved);
        assert_eq!(ReviewState::since(&receipts, Some(started)), ReviewState::NotReviewed);
        assert_eq!(ReviewState::since(&receipts, None), ReviewState::Approved);
    }

    #[test]
    fn max_of_one_escalates_the_first_needs_work() {
        assert_eq!(resolve_verdict(Verdict::NeedsWork, 1, 1), (Verdict::MajorRethink, true));
        assert_eq!(resolve_verdict(Verdict::MajorRethink, 1, 3), (Verdict::MajorRethink, false));
    }
}
