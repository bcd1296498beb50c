//! Dependency graph over tasks.
//!
//! A [`DependencyGraph`] is a snapshot built from the store on every query
//! and owned by the caller; nothing is cached between calls. Edges point
//! from a task to the tasks it depends on.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::{Epic, EpicId, EpicStatus, Task, TaskId, TaskStatus};

#[derive(Debug, Clone)]
struct Node {
    status: TaskStatus,
    epic_status: Option<EpicStatus>,
    created_at: DateTime<Utc>,
    deps: Vec<TaskId>,
}

/// Why a task can or cannot be started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotPending(TaskStatus),
    EpicInactive { epic: EpicId, status: Option<EpicStatus> },
    Blocked(Vec<TaskId>),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<TaskId, Node>,
}

impl DependencyGraph {
    pub fn build(tasks: &[Task], epics: &[Epic]) -> Self {
        let epic_status: HashMap<&EpicId, EpicStatus> =
            epics.iter().map(|e| (&e.id, e.status)).collect();
        let nodes = tasks
            .iter()
            .map(|t| {
                let node = Node {
                    status: t.status,
                    epic_status: epic_status.get(&t.epic_id).copied(),
                    created_at: t.created_at,
                    deps: t.depends_on.clone(),
                };
                (t.id.clone(), node)
            })
            .collect();
        Self { nodes }
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn deps(&self, id: &TaskId) -> &[TaskId] {
        self.nodes.get(id).map(|n| n.deps.as_slice()).unwrap_or(&[])
    }

    /// Reject the edge `task -> on` if it would close a cycle.
    ///
    /// Searches from `on` along dependency edges; reaching `task` means the
    /// new edge completes a loop, reported as `task -> on -> ... -> task`.
    pub fn check_edge(&self, task: &TaskId, on: &TaskId) -> Result<()> {
        if task == on {
            return Err(Error::Cycle {
                path: vec![task.clone(), task.clone()],
            });
        }
        let mut came_from: HashMap<TaskId, TaskId> = HashMap::new();
        let mut visited = HashSet::new();
        let mut stack = vec![on.clone()];

        while let Some(current) = stack.pop() {
            if &current == task {
                let mut path = vec![task.clone()];
                let mut back = vec![current.clone()];
                let mut cursor = &current;
                while let Some(prev) = came_from.get(cursor) {
                    back.push(prev.clone());
                    cursor = prev;
                }
                back.reverse();
                path.extend(back);
                return Err(Error::Cycle { path });
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            for dep in self.deps(&current) {
                if !visited.contains(dep) {
                    came_from.entry(dep.clone()).or_insert_with(|| current.clone());
                    stack.push(dep.clone());
                }
            }
        }
        Ok(())
    }

    /// Check a full replacement of `task`'s dependency set.
    ///
    /// Any new cycle must pass through `task` and leave it by exactly one
    /// new edge, so checking each edge against the current graph is enough;
    /// the task's old edges are never followed because the search stops on
    /// reaching it.
    pub fn check_dependencies(&self, task: &TaskId, deps: &[TaskId]) -> Result<()> {
        deps.iter().try_for_each(|dep| self.check_edge(task, dep))
    }

    /// First cycle in the graph, visiting nodes in id order.
    pub fn find_cycle(&self) -> Option<Vec<TaskId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Colour {
            White,
            Grey,
            Black,
        }

        let mut colour: HashMap<&TaskId, Colour> =
            self.nodes.keys().map(|k| (k, Colour::White)).collect();

        for root in self.nodes.keys() {
            if colour[root] != Colour::White {
                continue;
            }
            // Each frame is a node and the index of its next edge to follow.
            let mut stack: Vec<(&TaskId, usize)> = vec![(root, 0)];
            colour.insert(root, Colour::Grey);
            while let Some((node, edge)) = stack.last_mut() {
                let deps = self.deps(*node);
                if *edge >= deps.len() {
                    colour.insert(*node, Colour::Black);
                    stack.pop();
                    continue;
                }
                let next = &deps[*edge];
                *edge += 1;
                match colour.get(next).copied() {
                    // Dangling edge to a task that does not exist.
                    None => {}
                    Some(Colour::White) => {
                        colour.insert(next, Colour::Grey);
                        stack.push((next, 0));
                    }
                    Some(Colour::Grey) => {
                        let start = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                        let mut path: Vec<TaskId> =
                            stack[start..].iter().map(|(n, _)| (*n).clone()).collect();
                        path.push(next.clone());
                        return Some(path);
                    }
                    Some(Colour::Black) => {}
                }
            }
        }
        None
    }

    pub fn validate_no_cycle(&self) -> Result<()> {
        match self.find_cycle() {
            Some(path) => Err(Error::Cycle { path }),
            None => Ok(()),
        }
    }

    /// Dependencies of `id` that are not `done`, in declaration order.
    /// Dependencies missing from the graph count as incomplete.
    pub fn blockers(&self, id: &TaskId) -> Vec<TaskId> {
        self.deps(id)
            .iter()
            .filter(|dep| {
                self.nodes
                    .get(*dep)
                    .map_or(true, |n| n.status != TaskStatus::Done)
            })
            .cloned()
            .collect()
    }

    pub fn readiness(&self, id: &TaskId) -> Readiness {
        let Some(node) = self.nodes.get(id) else {
            return Readiness::Blocked(vec![id.clone()]);
        };
        if node.status != TaskStatus::Pending {
            return Readiness::NotPending(node.status);
        }
        match node.epic_status {
            Some(status) if !status.is_terminal() => {}
            status => {
                return Readiness::EpicInactive {
                    epic: id.epic().clone(),
                    status,
                }
            }
        }
        let blockers = self.blockers(id);
        if blockers.is_empty() {
            Readiness::Ready
        } else {
            Readiness::Blocked(blockers)
        }
    }

    /// Ready tasks in creation order, optionally restricted to one epic.
    pub fn ready(&self, epic: Option<&EpicId>) -> Vec<TaskId> {
        let mut ready: Vec<(&DateTime<Utc>, &TaskId)> = self
            .nodes
            .iter()
            .filter(|(id, _)| epic.map_or(true, |e| id.epic() == e))
            .filter(|(id, _)| self.readiness(id).is_ready())
            .map(|(id, node)| (&node.created_at, id))
            .collect();
        ready.sort();
        ready.into_iter().map(|(_, id)| id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn epic(status: EpicStatus) -> Epic {
        let now = Utc::now();
        Epic {
            id: "ca-1-abc".parse().unwrap(),
            title: "epic".into(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn task(seq: u32, status: TaskStatus, deps: &[u32]) -> Task {
        let epic: EpicId = "ca-1-abc".parse().unwrap();
        let created = Utc::now() + Duration::seconds(seq as i64);
        Task {
            id: epic.task(seq),
            epic_id: epic.clone(),
            title: format!("task {seq}"),
            status,
            depends_on: deps.iter().map(|d| epic.task(*d)).collect(),
            created_at: created,
            updated_at: created,
            started_at: None,
            completed_at: None,
            summary: None,
        }
    }

    fn id(seq: u32) -> TaskId {
        "ca-1-abc".parse::<EpicId>().unwrap().task(seq)
    }

    #[test]
    fn rejects_self_edge() {
        let graph = DependencyGraph::build(&[task(1, TaskStatus::Pending, &[])], &[]);
        match graph.check_edge(&id(1), &id(1)) {
            Err(Error::Cycle { path }) => assert_eq!(path, vec![id(1), id(1)]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn reports_cycle_path_through_new_edge() {
        // 1 -> 2 -> 3; adding 3 -> 1 closes the loop.
        let tasks = [
            task(1, TaskStatus::Pending, &[2]),
            task(2, TaskStatus::Pending, &[3]),
            task(3, TaskStatus::Pending, &[]),
        ];
        let graph = DependencyGraph::build(&tasks, &[]);
        match graph.check_edge(&id(3), &id(1)) {
            Err(Error::Cycle { path }) => assert_eq!(path, vec![id(3), id(1), id(2), id(3)]),
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(graph.check_edge(&id(1), &id(3)).is_ok());
    }

    #[test]
    fn finds_existing_cycles() {
        let acyclic = DependencyGraph::build(
            &[task(1, TaskStatus::Pending, &[2]), task(2, TaskStatus::Pending, &[])],
            &[],
        );
        assert!(acyclic.validate_no_cycle().is_ok());

        let cyclic = DependencyGraph::build(
            &[
                task(1, TaskStatus::Pending, &[2]),
                task(2, TaskStatus::Pending, &[3]),
                task(3, TaskStatus::Pending, &[2]),
            ],
            &[],
        );
        assert_eq!(cyclic.find_cycle(), Some(vec![id(2), id(3), id(2)]));
    }

    #[test]
    fn ready_requires_done_dependencies_and_active_epic() {
        let tasks = [
            task(1, TaskStatus::Done, &[]),
            task(2, TaskStatus::Pending, &[1]),
            task(3, TaskStatus::Pending, &[2]),
            task(4, TaskStatus::Pending, &[9]),
            task(5, TaskStatus::InProgress, &[]),
        ];
        let graph = DependencyGraph::build(&tasks, &[epic(EpicStatus::Ready)]);
        assert_eq!(graph.ready(None), vec![id(2)]);
        assert_eq!(graph.blockers(&id(3)), vec![id(2)]);
        assert_eq!(graph.readiness(&id(4)), Readiness::Blocked(vec![id(9)]));
        assert_eq!(
            graph.readiness(&id(5)),
            Readiness::NotPending(TaskStatus::InProgress)
        );

        let closed = DependencyGraph::build(&tasks, &[epic(EpicStatus::Cancelled)]);
        assert!(closed.ready(None).is_empty());
    }

    #[test]
    fn ready_follows_creation_order() {
        let tasks = [
            task(3, TaskStatus::Pending, &[]),
            task(1, TaskStatus::Pending, &[]),
            task(2, TaskStatus::Pending, &[]),
        ];
        let graph = DependencyGraph::build(&tasks, &[epic(EpicStatus::Planning)]);
        assert_eq!(graph.ready(None), vec![id(1), id(2), id(3)]);
    }
}
