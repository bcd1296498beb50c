//! Concurrent writers, each with its own handle on the same workspace the
//! way separate processes would have.

use std::collections::HashSet;
use std::thread;

use speculate2::speculate;
use taskctl::models::*;
use taskctl::Workspace;

const WRITERS: usize = 8;

speculate! {
    before {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (ws, _) = Workspace::init(dir.path()).expect("Failed to init workspace");
        let epic = ws.create_epic("Shared").unwrap();
        let root = dir.path().to_path_buf();
    }

    describe "concurrent writers" {
        it "never hand out the same epic id twice" {
            let ids: Vec<EpicId> = thread::scope(|s| {
                let handles: Vec<_> = (0..WRITERS)
                    .map(|i| {
                        let root = root.clone();
                        s.spawn(move || {
                            let ws = Workspace::open(&root).unwrap();
                            ws.create_epic(&format!("epic {i}")).unwrap().id
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            let seqs: HashSet<u32> = ids.iter().map(EpicId::seq).collect();
            assert_eq!(seqs.len(), WRITERS);
            assert_eq!(ws.list_epics(None).unwrap().len(), WRITERS + 1);
        }

        it "never hand out the same task id twice" {
            let ids: Vec<TaskId> = thread::scope(|s| {
                let handles: Vec<_> = (0..WRITERS)
                    .map(|i| {
                        let root = root.clone();
                        let epic = epic.id.clone();
                        s.spawn(move || {
                            let ws = Workspace::open(&root).unwrap();
                            ws.create_task(&epic, &format!("task {i}"), &[]).unwrap().id
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            let unique: HashSet<&TaskId> = ids.iter().collect();
            assert_eq!(unique.len(), WRITERS);
            let mut seqs: Vec<u32> = ids.iter().map(TaskId::seq).collect();
            seqs.sort();
            assert_eq!(seqs, (1..=WRITERS as u32).collect::<Vec<_>>());
        }

        it "numbers concurrent reviews contiguously" {
            ws.review_init().unwrap();
            let task = ws.create_task(&epic.id, "reviewed", &[]).unwrap().id;
            thread::scope(|s| {
                for _ in 0..WRITERS {
                    let root = root.clone();
                    let task = task.clone();
                    s.spawn(move || {
                        let ws = Workspace::open(&root).unwrap();
                        ws.log_review(&task, ReviewInput {
                            verdict: Verdict::Ship,
                            reviewer: None,
                            notes: String::new(),
                        }).unwrap();
                    });
                }
            });
            let iterations: Vec<u32> = ws.reviews(&task).unwrap().iter().map(|r| r.iteration).collect();
            assert_eq!(iterations, (1..=WRITERS as u32).collect::<Vec<_>>());
        }

        it "keeps the graph acyclic under racing edges" {
            let a = ws.create_task(&epic.id, "a", &[]).unwrap().id;
            let b = ws.create_task(&epic.id, "b", &[]).unwrap().id;
            // a -> b and b -> a race; exactly one may win.
            let results: Vec<bool> = thread::scope(|s| {
                let pairs = [(a.clone(), b.clone()), (b.clone(), a.clone())];
                let handles: Vec<_> = pairs
                    .into_iter()
                    .map(|(from, on)| {
                        let root = root.clone();
                        s.spawn(move || {
                            let ws = Workspace::open(&root).unwrap();
                            ws.add_dependency(&from, &on).is_ok()
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
            ws.check_graph().unwrap();
        }

        it "lets exactly one of many racing starts win" {
            let task = ws.create_task(&epic.id, "contended", &[]).unwrap().id;
            let results: Vec<bool> = thread::scope(|s| {
                let handles: Vec<_> = (0..WRITERS)
                    .map(|_| {
                        let root = root.clone();
                        let task = task.clone();
                        s.spawn(move || {
                            let ws = Workspace::open(&root).unwrap();
                            ws.start_task(&task).is_ok()
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
            assert_eq!(ws.task(&task).unwrap().task.status, TaskStatus::InProgress);
        }

        it "lets either completion or cancellation win, never both" {
            let task = ws.create_task(&epic.id, "raced", &[]).unwrap().id;
            ws.start_task(&task).unwrap();
            let (done, cancelled) = thread::scope(|s| {
                let finish = {
                    let root = root.clone();
                    let task = task.clone();
                    s.spawn(move || {
                        let ws = Workspace::open(&root).unwrap();
                        ws.complete_task(&task, "finished").is_ok()
                    })
                };
                let cancel = {
                    let root = root.clone();
                    let task = task.clone();
                    s.spawn(move || {
                        let ws = Workspace::open(&root).unwrap();
                        ws.cancel_task(&task).is_ok()
                    })
                };
                (finish.join().unwrap(), cancel.join().unwrap())
            });
            assert!(done ^ cancelled, "done {done}, cancelled {cancelled}");
            let status = ws.task(&task).unwrap().task.status;
            let expected = if done { TaskStatus::Done } else { TaskStatus::Cancelled };
            assert_eq!(status, expected);
        }

        it "keeps every memory entry" {
            ws.memory_init().unwrap();
            thread::scope(|s| {
                for i in 0..WRITERS {
                    let root = root.clone();
                    s.spawn(move || {
                        let ws = Workspace::open(&root).unwrap();
                        ws.add_memory(MemoryCategory::Convention, &format!("note {i}")).unwrap();
                    });
                }
            });
            assert_eq!(ws.list_memory(None).unwrap().len(), WRITERS);
        }
    }
}
