//! Applying a task split to the persisted graph and ledger.

use crate::errors::{LedgerError, RunError};
use crate::graph::{Task, TaskGraph};
use crate::ledger::{Ledger, TaskStatus};
use std::path::Path;
use tracing::info;

/// Replace `parent` with `subtasks` in a new graph version and persist both
/// documents.
///
/// A parent that has no outstanding split request gets one first, so the
/// operator can split a todo, ready or in-progress task directly. The parent
/// stays blocked on its sub-tasks until they all complete. Re-applying a split
/// that only reached the graph file completes it.
pub fn apply_split(
    graph: &TaskGraph,
    ledger: &mut Ledger,
    parent: &str,
    subtasks: Vec<Task>,
    graph_file: &Path,
    ledger_file: &Path,
) -> Result<TaskGraph, RunError> {
    let record = ledger.get(parent)?;
    if record.status == TaskStatus::Blocked && !record.awaiting_split && !record.blocking.is_empty()
    {
        return Err(LedgerError::InvalidTransition {
            task: parent.to_string(),
            from: record.status,
            to: TaskStatus::Blocked,
            reason: format!("already waiting on {}", record.blocking.join(", ")),
        }
        .into());
    }
    if !record.awaiting_split {
        ledger.request_split(parent, "split requested")?;
    }

    let sub_ids: Vec<String> = subtasks.iter().map(|t| t.id.clone()).collect();
    // A split whose graph was saved before the ledger write failed is
    // finished against the graph on disk instead of being added twice.
    let on_disk = !sub_ids.is_empty()
        && sub_ids.iter().all(|id| {
            graph
                .get(id)
                .is_some_and(|t| t.split_from.as_deref() == Some(parent))
        });
    let next = if on_disk {
        info!(task = parent, "Sub-tasks already in the graph, completing split");
        graph.clone()
    } else {
        let next = graph.extend_with_split(parent, subtasks)?;
        next.to_file().save(graph_file)?;
        next
    };

    ledger.sync_graph(&next);
    ledger.attach_subtasks(parent, sub_ids.clone())?;
    ledger.recompute_readiness()?;
    ledger.save(ledger_file)?;

    info!(
        task = parent,
        subtasks = %sub_ids.join(", "),
        version = next.version(),
        "Split task"
    );
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::graph::TaskGraphFile;
    use tempfile::tempdir;

    fn graph() -> TaskGraph {
        GraphBuilder::new(vec![
            Task::new("A", "Definitions", vec![]),
            Task::new("B", "Main lemma", vec!["A".to_string()]),
            Task::new("C", "Corollary", vec!["B".to_string()]),
        ])
        .build()
        .unwrap()
    }

    #[test]
    fn test_split_persists_graph_and_ledger() {
        let dir = tempdir().unwrap();
        let graph_file = dir.path().join("tasks.json");
        let ledger_file = dir.path().join("ledger.json");
        let graph = graph();
        let mut ledger = Ledger::new(&graph);
        ledger.request_split("B", "budget exhausted").unwrap();

        let next = apply_split(
            &graph,
            &mut ledger,
            "B",
            vec![
                Task::new("B1", "Helper", vec![]),
                Task::new("B2", "Rest", vec!["B1".to_string()]),
            ],
            &graph_file,
            &ledger_file,
        )
        .unwrap();

        assert_eq!(next.version(), graph.version() + 1);
        assert_eq!(next.dependencies("C"), &["B1".to_string(), "B2".to_string()]);
        assert_eq!(next.dependencies("B1"), &["A".to_string()]);

        let saved = TaskGraphFile::load(&graph_file).unwrap();
        assert_eq!(saved.version, next.version());

        let record = ledger.get("B").unwrap();
        assert_eq!(record.status, TaskStatus::Blocked);
        assert!(!record.awaiting_split);
        assert_eq!(record.blocking, vec!["B1".to_string(), "B2".to_string()]);
        assert_eq!(ledger.status("B1"), Some(TaskStatus::Todo));

        let reloaded = Ledger::load(&ledger_file, &next).unwrap();
        assert_eq!(reloaded.get("B").unwrap().blocking.len(), 2);
    }

    #[test]
    fn test_split_interrupted_before_ledger_save_can_be_reapplied() {
        let dir = tempdir().unwrap();
        let graph_file = dir.path().join("tasks.json");
        let ledger_file = dir.path().join("ledger.json");
        let graph = graph();
        graph.to_file().save(&graph_file).unwrap();
        let mut ledger = Ledger::new(&graph);
        ledger.request_split("B", "budget exhausted").unwrap();
        ledger.save(&ledger_file).unwrap();

        let subtasks = || {
            vec![
                Task::new("B1", "Helper", vec![]),
                Task::new("B2", "Rest", vec!["B1".to_string()]),
            ]
        };

        // A directory in place of the ledger makes the final write fail.
        let unwritable = dir.path().join("unwritable");
        std::fs::create_dir(&unwritable).unwrap();
        let err = apply_split(
            &graph,
            &mut ledger.clone(),
            "B",
            subtasks(),
            &graph_file,
            &unwritable,
        )
        .unwrap_err();
        assert!(matches!(err, RunError::Ledger(LedgerError::Write { .. })));

        let on_disk = TaskGraph::load(&graph_file).unwrap();
        assert_eq!(on_disk.version(), graph.version() + 1);
        let mut ledger = Ledger::load(&ledger_file, &on_disk).unwrap();
        assert!(ledger.get("B").unwrap().awaiting_split);

        let next = apply_split(
            &on_disk,
            &mut ledger,
            "B",
            subtasks(),
            &graph_file,
            &ledger_file,
        )
        .unwrap();

        assert_eq!(next.version(), on_disk.version());
        assert_eq!(TaskGraphFile::load(&graph_file).unwrap().tasks.len(), 5);
        let reloaded = Ledger::load(&ledger_file, &next).unwrap();
        let record = reloaded.get("B").unwrap();
        assert!(!record.awaiting_split);
        assert_eq!(record.blocking, vec!["B1".to_string(), "B2".to_string()]);
    }

    #[test]
    fn test_split_of_todo_task_requests_split_first() {
        let dir = tempdir().unwrap();
        let graph = graph();
        let mut ledger = Ledger::new(&graph);

        apply_split(
            &graph,
            &mut ledger,
            "A",
            vec![Task::new("A1", "Half", vec![])],
            &dir.path().join("tasks.json"),
            &dir.path().join("ledger.json"),
        )
        .unwrap();

        assert_eq!(ledger.status("A"), Some(TaskStatus::Blocked));
        assert_eq!(ledger.status("A1"), Some(TaskStatus::Ready));
    }

    #[test]
    fn test_split_of_already_split_task_is_rejected() {
        let dir = tempdir().unwrap();
        let graph_file = dir.path().join("tasks.json");
        let ledger_file = dir.path().join("ledger.json");
        let graph = graph();
        let mut ledger = Ledger::new(&graph);
        let next = apply_split(
            &graph,
            &mut ledger,
            "A",
            vec![Task::new("A1", "Half", vec![])],
            &graph_file,
            &ledger_file,
        )
        .unwrap();

        let err = apply_split(
            &next,
            &mut ledger,
            "A",
            vec![Task::new("A2", "Other half", vec![])],
            &graph_file,
            &ledger_file,
        )
        .unwrap_err();
        assert!(matches!(err, RunError::Ledger(LedgerError::InvalidTransition { .. })));
    }

    #[test]
    fn test_split_with_unknown_sub_dependency_leaves_files_untouched() {
        let dir = tempdir().unwrap();
        let graph_file = dir.path().join("tasks.json");
        let graph = graph();
        let mut ledger = Ledger::new(&graph);

        let err = apply_split(
            &graph,
            &mut ledger,
            "B",
            vec![Task::new("B1", "Helper", vec!["Z".to_string()])],
            &graph_file,
            &dir.path().join("ledger.json"),
        )
        .unwrap_err();
        assert!(matches!(err, RunError::Graph(_)));
        assert!(!graph_file.exists());
    }
}
