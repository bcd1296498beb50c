use speculate2::speculate;
use taskctl::models::*;
use taskctl::{Error, Workspace};

fn ids(views: &[TaskView]) -> Vec<TaskId> {
    views.iter().map(|v| v.task.id.clone()).collect()
}

speculate! {
    before {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (ws, _) = Workspace::init(dir.path()).expect("Failed to init workspace");
        let epic = ws.create_epic("Graph").unwrap();
        let t1 = ws.create_task(&epic.id, "one", &[]).unwrap().id;
        let t2 = ws.create_task(&epic.id, "two", &[t1.clone()]).unwrap().id;
    }

    describe "create_task with dependencies" {
        it "records the edges" {
            assert_eq!(ws.task(&t2).unwrap().task.depends_on, vec![t1.clone()]);
        }

        it "rejects unknown dependencies" {
            let ghost = epic.id.task(99);
            let err = ws.create_task(&epic.id, "three", &[ghost]).unwrap_err();
            assert!(matches!(err, Error::NotFound(_)));
            assert_eq!(ws.list_tasks(&TaskFilter::default()).unwrap().len(), 2);
        }

        it "collapses duplicate dependencies" {
            let t3 = ws.create_task(&epic.id, "three", &[t1.clone(), t2.clone(), t1.clone()]).unwrap();
            assert_eq!(t3.depends_on, vec![t1.clone(), t2.clone()]);
        }

        it "insists on task-shaped ids" {
            let err = parse_task_ids(&[epic.id.to_string()]).unwrap_err();
            assert!(matches!(err, Error::InvalidId { .. }));
        }
    }

    describe "add_dependency" {
        it "rejects a cycle and leaves the graph unchanged" {
            let err = ws.add_dependency(&t1, &t2).unwrap_err();
            match err {
                Error::Cycle { path } => assert_eq!(path, vec![t1.clone(), t2.clone(), t1.clone()]),
                other => panic!("expected cycle, got {other:?}"),
            }
            assert!(ws.task(&t1).unwrap().task.depends_on.is_empty());
            assert_eq!(ws.task(&t2).unwrap().task.depends_on, vec![t1.clone()]);
        }

        it "rejects a self dependency" {
            match ws.add_dependency(&t1, &t1) {
                Err(Error::Cycle { path }) => assert_eq!(path, vec![t1.clone(), t1.clone()]),
                other => panic!("expected cycle, got {other:?}"),
            }
        }

        it "detects longer cycles" {
            let t3 = ws.create_task(&epic.id, "three", &[t2.clone()]).unwrap().id;
            match ws.add_dependency(&t1, &t3) {
                Err(Error::Cycle { path }) => {
                    assert_eq!(path, vec![t1.clone(), t3.clone(), t2.clone(), t1.clone()])
                }
                other => panic!("expected cycle, got {other:?}"),
            }
            assert!(ws.check_graph().is_ok());
        }

        it "is refused once the task has started" {
            let t3 = ws.create_task(&epic.id, "three", &[]).unwrap().id;
            ws.start_task(&t3).unwrap();
            assert!(matches!(ws.add_dependency(&t3, &t1), Err(Error::Invalid(_))));
        }

        it "is refused on terminal tasks" {
            ws.cancel_task(&t2).unwrap();
            assert!(matches!(
                ws.set_dependencies(&t2, &[]),
                Err(Error::AlreadyTerminal { .. })
            ));
        }
    }

    describe "set_dependencies" {
        it "replaces the whole set" {
            let t3 = ws.create_task(&epic.id, "three", &[]).unwrap().id;
            let updated = ws.set_dependencies(&t2, &[t3.clone()]).unwrap();
            assert_eq!(updated.depends_on, vec![t3.clone()]);
            // The old edge is gone, so t1 may now depend on t2.
            ws.add_dependency(&t1, &t2).unwrap();
        }

        it "clears with an empty list" {
            let updated = ws.set_dependencies(&t2, &[]).unwrap();
            assert!(updated.depends_on.is_empty());
        }
    }

    describe "remove_dependency" {
        it "drops a single edge" {
            let updated = ws.remove_dependency(&t2, &t1).unwrap();
            assert!(updated.depends_on.is_empty());
            assert!(matches!(ws.remove_dependency(&t2, &t1), Err(Error::NotFound(_))));
        }
    }

    describe "readiness" {
        it "lists pending tasks whose dependencies are done" {
            assert_eq!(ids(&ws.ready(Some(&epic.id)).unwrap()), vec![t1.clone()]);
            ws.start_task(&t1).unwrap();
            assert!(ws.ready(Some(&epic.id)).unwrap().is_empty());
            ws.complete_task(&t1, "done").unwrap();
            assert_eq!(ids(&ws.ready(Some(&epic.id)).unwrap()), vec![t2.clone()]);
        }

        it "treats cancelled dependencies as incomplete" {
            ws.cancel_task(&t1).unwrap();
            assert!(ws.ready(None).unwrap().is_empty());
            assert_eq!(ws.task(&t2).unwrap().blocked_by, vec![t1.clone()]);
        }

        it "excludes tasks of closed epics" {
            ws.set_epic_status(&epic.id, EpicStatus::Cancelled).unwrap();
            assert!(ws.ready(None).unwrap().is_empty());
        }

        it "scopes by epic" {
            let other = ws.create_epic("Other").unwrap();
            let o1 = ws.create_task(&other.id, "o", &[]).unwrap().id;
            assert_eq!(ids(&ws.ready(Some(&other.id)).unwrap()), vec![o1.clone()]);
            assert_eq!(ids(&ws.ready(None).unwrap()), vec![t1.clone(), o1]);
        }

        it "returns identical results on repeated reads" {
            let first = ids(&ws.ready(None).unwrap());
            let second = ids(&ws.ready(None).unwrap());
            assert_eq!(first, second);
        }

        it "reports blocked as a derived status" {
            let view = ws.task(&t2).unwrap();
            assert_eq!(view.display_status, DisplayStatus::Blocked);
            assert_eq!(view.task.status, TaskStatus::Pending);

            let blocked = ws.list_tasks(&TaskFilter {
                epic: None,
                status: Some(DisplayStatus::Blocked),
            }).unwrap();
            assert_eq!(ids(&blocked), vec![t2.clone()]);

            let pending = ws.list_tasks(&TaskFilter {
                epic: Some(epic.id.clone()),
                status: Some(DisplayStatus::Pending),
            }).unwrap();
            assert_eq!(ids(&pending), vec![t1.clone(), t2.clone()]);
        }
    }
}
