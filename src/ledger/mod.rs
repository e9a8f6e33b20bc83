//! Progress ledger: the durable per-task status store.
//!
//! The ledger is an explicit document. Callers load it, mutate it through
//! validated transitions and save it after every change. Saving is atomic
//! (temp file, fsync, rename), so a crash leaves either the previous or the
//! new ledger on disk.
//!
//! Every status change is checked against the state machine in
//! [`TaskStatus::can_transition_to`] and against the dependency invariant:
//! a task may only be ready, in progress, completed or failed once all of its
//! dependencies are completed. At most one task is in progress at a time.

pub mod status;

pub use status::TaskStatus;

use crate::errors::LedgerError;
use crate::graph::TaskGraph;
use crate::util::atomic_write_with;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One entry in a record's append-only transition history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

/// Mutable status of a single task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub task_id: String,
    pub status: TaskStatus,
    /// Failed attempts so far
    #[serde(default)]
    pub attempts: u32,
    /// Splits spent by this task or, for a sub-task, by the task it was split from
    #[serde(default)]
    pub split_count: u32,
    /// A split was requested and no sub-tasks exist yet
    #[serde(default)]
    pub awaiting_split: bool,
    /// Tasks this one waits on; only meaningful while blocked
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocking: Vec<String>,
    /// Files produced or changed by the last implementation attempt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<StatusTransition>,
}

impl StatusRecord {
    pub fn new(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: TaskStatus::Todo,
            attempts: 0,
            split_count: 0,
            awaiting_split: false,
            blocking: Vec::new(),
            artifacts: Vec::new(),
            note: None,
            updated_at: Utc::now(),
            history: Vec::new(),
        }
    }
}

/// Count of records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub todo: usize,
    pub ready: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub completed: usize,
    pub failed: usize,
}

impl LedgerSummary {
    pub fn total(&self) -> usize {
        self.todo + self.ready + self.in_progress + self.blocked + self.completed + self.failed
    }
}

/// The persisted progress ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    /// Version of the graph this ledger was last synced with
    #[serde(default)]
    graph_version: u32,
    /// SHA-256 of the graph document at last sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    graph_fingerprint: Option<String>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    records: BTreeMap<String, StatusRecord>,
    /// Dependency lists copied from the graph; rebuilt on every sync
    #[serde(skip)]
    dependencies: HashMap<String, Vec<String>>,
}

impl Ledger {
    /// Fresh ledger with a todo record for every task.
    pub fn new(graph: &TaskGraph) -> Self {
        let mut ledger = Self {
            graph_version: 0,
            graph_fingerprint: None,
            updated_at: Utc::now(),
            records: BTreeMap::new(),
            dependencies: HashMap::new(),
        };
        ledger.sync_graph(graph);
        ledger
    }

    /// Load the ledger at `path`, or start a fresh one if the file does not exist.
    pub fn load(path: &Path, graph: &TaskGraph) -> Result<Self, LedgerError> {
        if !path.exists() {
            debug!("No ledger at {}, starting fresh", path.display());
            return Ok(Self::new(graph));
        }

        let content = std::fs::read_to_string(path).map_err(|source| LedgerError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut ledger: Ledger =
            serde_json::from_str(&content).map_err(|source| LedgerError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let fingerprint = graph.fingerprint();
        if let Some(previous) = &ledger.graph_fingerprint
            && *previous != fingerprint
        {
            info!(
                from = ledger.graph_version,
                to = graph.version(),
                "Task graph changed since the ledger was last saved"
            );
        }

        ledger.sync_graph(graph);
        Ok(ledger)
    }

    /// Atomically write the ledger to `path`.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        self.save_with(path, |file, bytes| file.write_all(bytes))
    }

    pub(crate) fn save_with<F>(&self, path: &Path, write: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        let content = serde_json::to_vec_pretty(self).map_err(LedgerError::Serialize)?;
        atomic_write_with(path, &content, write).map_err(|source| LedgerError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Align the ledger with `graph`: add a todo record for each new task and
    /// refresh the dependency lists. Records are never deleted; orphans are
    /// only reported. Returns the ids of the added records.
    pub fn sync_graph(&mut self, graph: &TaskGraph) -> Vec<String> {
        self.dependencies = graph
            .tasks()
            .iter()
            .map(|t| (t.id.clone(), t.depends_on.clone()))
            .collect();

        let mut added = Vec::new();
        for id in graph.ids() {
            if !self.records.contains_key(id) {
                self.records.insert(id.to_string(), StatusRecord::new(id));
                added.push(id.to_string());
            }
        }

        for (id, record) in &self.records {
            if !graph.contains(id) {
                warn!(task = %id, "Ledger record has no matching task in the graph");
                continue;
            }
            if record.status.requires_completed_dependencies()
                && let Some(dep) = self.first_incomplete_dependency(id)
            {
                warn!(
                    task = %id,
                    status = %record.status,
                    dependency = %dep,
                    "Ledger status conflicts with an incomplete dependency"
                );
            }
        }

        self.graph_version = graph.version();
        self.graph_fingerprint = Some(graph.fingerprint());
        if !added.is_empty() {
            self.updated_at = Utc::now();
        }
        added
    }

    pub fn graph_version(&self) -> u32 {
        self.graph_version
    }

    pub fn graph_fingerprint(&self) -> Option<&str> {
        self.graph_fingerprint.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Get the record for a task.
    pub fn get(&self, id: &str) -> Result<&StatusRecord, LedgerError> {
        self.records.get(id).ok_or_else(|| LedgerError::UnknownTask {
            id: id.to_string(),
        })
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut StatusRecord, LedgerError> {
        self.records
            .get_mut(id)
            .ok_or_else(|| LedgerError::UnknownTask { id: id.to_string() })
    }

    pub fn status(&self, id: &str) -> Option<TaskStatus> {
        self.records.get(id).map(|r| r.status)
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.status(id) == Some(TaskStatus::Completed)
    }

    /// All records, ordered by task id.
    pub fn records(&self) -> impl Iterator<Item = &StatusRecord> {
        self.records.values()
    }

    /// The task currently in progress, if any.
    pub fn in_progress(&self) -> Option<&str> {
        self.records
            .values()
            .find(|r| r.status == TaskStatus::InProgress)
            .map(|r| r.task_id.as_str())
    }

    /// First dependency of `id` that is not completed.
    pub fn first_incomplete_dependency(&self, id: &str) -> Option<String> {
        self.dependencies
            .get(id)?
            .iter()
            .find(|dep| !self.is_completed(dep))
            .cloned()
    }

    /// Move a task to `to`, validating the state machine, the dependency
    /// invariant and the single-task policy.
    pub fn transition(&mut self, id: &str, to: TaskStatus, note: &str) -> Result<(), LedgerError> {
        let from = self.get(id)?.status;
        let invalid = |reason: String| LedgerError::InvalidTransition {
            task: id.to_string(),
            from,
            to,
            reason,
        };

        if !from.can_transition_to(to) {
            return Err(invalid(format!("{} is not reachable from {}", to, from)));
        }
        if to.requires_completed_dependencies()
            && let Some(dep) = self.first_incomplete_dependency(id)
        {
            return Err(invalid(format!("dependency '{}' is not completed", dep)));
        }
        if to == TaskStatus::InProgress
            && let Some(active) = self.in_progress()
        {
            return Err(invalid(format!("task '{}' is already in progress", active)));
        }

        let now = Utc::now();
        let note = (!note.is_empty()).then(|| note.to_string());
        let record = self.get_mut(id)?;
        record.history.push(StatusTransition {
            from,
            to,
            note: note.clone(),
            at: now,
        });
        record.status = to;
        record.note = note;
        record.updated_at = now;
        if from == TaskStatus::Blocked {
            record.blocking.clear();
            record.awaiting_split = false;
        }
        self.updated_at = now;

        debug!(task = %id, %from, %to, "Status transition");
        Ok(())
    }

    /// Block a task on `blocking`.
    pub fn block(&mut self, id: &str, blocking: Vec<String>, note: &str) -> Result<(), LedgerError> {
        self.transition(id, TaskStatus::Blocked, note)?;
        self.get_mut(id)?.blocking = blocking;
        Ok(())
    }

    /// Count one more failed attempt. Returns the new attempt count.
    pub fn record_attempt(&mut self, id: &str) -> Result<u32, LedgerError> {
        let record = self.get_mut(id)?;
        record.attempts = record.attempts.saturating_add(1);
        record.updated_at = Utc::now();
        Ok(record.attempts)
    }

    /// Count one more split for a task. Returns the new split count.
    pub fn record_split(&mut self, id: &str) -> Result<u32, LedgerError> {
        let record = self.get_mut(id)?;
        record.split_count = record.split_count.saturating_add(1);
        record.updated_at = Utc::now();
        Ok(record.split_count)
    }

    /// Block a task until sub-tasks are supplied for it.
    pub fn request_split(&mut self, id: &str, note: &str) -> Result<(), LedgerError> {
        if self.get(id)?.status != TaskStatus::Blocked {
            self.transition(id, TaskStatus::Blocked, note)?;
        }
        let record = self.get_mut(id)?;
        record.awaiting_split = true;
        record.blocking.clear();
        Ok(())
    }

    /// Record the sub-tasks a blocked split parent now waits on.
    pub fn attach_subtasks(&mut self, id: &str, subtasks: Vec<String>) -> Result<(), LedgerError> {
        let record = self.get(id)?;
        if record.status != TaskStatus::Blocked {
            return Err(LedgerError::InvalidTransition {
                task: id.to_string(),
                from: record.status,
                to: TaskStatus::Blocked,
                reason: "only a blocked task can wait on sub-tasks".to_string(),
            });
        }
        // Sub-tasks inherit the split budget already spent by their lineage.
        let inherited = record.split_count.max(1);
        for sub in &subtasks {
            self.get(sub)?;
        }

        let now = Utc::now();
        for sub in &subtasks {
            let child = self.get_mut(sub)?;
            child.split_count = child.split_count.max(inherited);
        }
        let record = self.get_mut(id)?;
        record.note = Some(format!("split into {}", subtasks.join(", ")));
        record.blocking = subtasks;
        record.awaiting_split = false;
        record.updated_at = now;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_artifacts(&mut self, id: &str, artifacts: Vec<PathBuf>) -> Result<(), LedgerError> {
        let record = self.get_mut(id)?;
        record.artifacts = artifacts;
        record.updated_at = Utc::now();
        Ok(())
    }

    /// Promote every todo task whose dependencies are all completed to ready.
    /// Returns the promoted ids.
    pub fn recompute_readiness(&mut self) -> Result<Vec<String>, LedgerError> {
        let promotable: Vec<String> = self
            .records
            .values()
            .filter(|r| r.status == TaskStatus::Todo)
            .filter(|r| self.dependencies.contains_key(&r.task_id))
            .filter(|r| self.first_incomplete_dependency(&r.task_id).is_none())
            .map(|r| r.task_id.clone())
            .collect();

        for id in &promotable {
            self.transition(id, TaskStatus::Ready, "dependencies completed")?;
        }
        Ok(promotable)
    }

    /// Block every not-yet-started task in `dependents` on the failed task.
    /// Returns the ids that were blocked.
    pub fn block_dependents_of_failed<'a>(
        &mut self,
        failed: &str,
        dependents: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<String>, LedgerError> {
        let mut blocked = Vec::new();
        for id in dependents {
            if matches!(self.get(id)?.status, TaskStatus::Todo | TaskStatus::Ready) {
                self.block(
                    id,
                    vec![failed.to_string()],
                    &format!("dependency '{}' failed", failed),
                )?;
                blocked.push(id.to_string());
            }
        }
        Ok(blocked)
    }

    /// Complete every split parent whose sub-tasks are all completed.
    /// Repeats until nothing changes so nested splits resolve bottom-up.
    pub fn resolve_split_parents(&mut self) -> Result<Vec<String>, LedgerError> {
        let mut resolved = Vec::new();
        loop {
            let ready: Vec<String> = self
                .records
                .values()
                .filter(|r| r.status == TaskStatus::Blocked && !r.awaiting_split)
                .filter(|r| !r.blocking.is_empty())
                .filter(|r| r.blocking.iter().all(|b| self.is_completed(b)))
                .map(|r| r.task_id.clone())
                .collect();

            if ready.is_empty() {
                return Ok(resolved);
            }
            for id in ready {
                self.transition(&id, TaskStatus::Completed, "all sub-tasks completed")?;
                resolved.push(id);
            }
        }
    }

    pub fn summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary::default();
        for record in self.records.values() {
            match record.status {
                TaskStatus::Todo => summary.todo += 1,
                TaskStatus::Ready => summary.ready += 1,
                TaskStatus::InProgress => summary.in_progress += 1,
                TaskStatus::Blocked => summary.blocked += 1,
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, Task};
    use std::fs;
    use tempfile::tempdir;

    fn task(id: &str, deps: Vec<&str>) -> Task {
        Task::new(id, id, deps.into_iter().map(String::from).collect())
    }

    fn chain() -> TaskGraph {
        GraphBuilder::new(vec![
            task("A", vec![]),
            task("B", vec!["A"]),
            task("C", vec!["B"]),
        ])
        .build()
        .unwrap()
    }

    #[test]
    fn test_new_ledger_has_todo_record_per_task() {
        let ledger = Ledger::new(&chain());
        assert_eq!(ledger.records().count(), 3);
        assert!(ledger.records().all(|r| r.status == TaskStatus::Todo));
        assert!(ledger.records().all(|r| r.attempts == 0));
        assert_eq!(ledger.graph_version(), 1);
        assert!(ledger.graph_fingerprint().is_some());
    }

    #[test]
    fn test_get_unknown_task() {
        let ledger = Ledger::new(&chain());
        assert!(matches!(
            ledger.get("Z"),
            Err(LedgerError::UnknownTask { id }) if id == "Z"
        ));
    }

    #[test]
    fn test_transition_records_history() {
        let mut ledger = Ledger::new(&chain());
        ledger.transition("A", TaskStatus::InProgress, "selected").unwrap();
        ledger.transition("A", TaskStatus::Completed, "verified").unwrap();

        let record = ledger.get("A").unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.note.as_deref(), Some("verified"));
        assert_eq!(record.history.len(), 2);
        assert_eq!(record.history[0].from, TaskStatus::Todo);
        assert_eq!(record.history[1].to, TaskStatus::Completed);
    }

    #[test]
    fn test_transition_rejects_state_machine_violation() {
        let mut ledger = Ledger::new(&chain());
        let err = ledger
            .transition("A", TaskStatus::Completed, "skip ahead")
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidTransition {
                from: TaskStatus::Todo,
                to: TaskStatus::Completed,
                ..
            }
        ));
        assert_eq!(ledger.status("A"), Some(TaskStatus::Todo));
    }

    #[test]
    fn test_transition_rejects_incomplete_dependency() {
        let mut ledger = Ledger::new(&chain());
        let err = ledger
            .transition("B", TaskStatus::InProgress, "")
            .unwrap_err();
        assert!(err.to_string().contains("dependency 'A'"));

        let err = ledger.transition("B", TaskStatus::Ready, "").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    }

    #[test]
    fn test_only_one_task_in_progress() {
        let graph = GraphBuilder::new(vec![task("A", vec![]), task("B", vec![])])
            .build()
            .unwrap();
        let mut ledger = Ledger::new(&graph);
        ledger.transition("A", TaskStatus::InProgress, "").unwrap();
        let err = ledger
            .transition("B", TaskStatus::InProgress, "")
            .unwrap_err();
        assert!(err.to_string().contains("already in progress"));
        assert_eq!(ledger.in_progress(), Some("A"));
    }

    #[test]
    fn test_recompute_readiness() {
        let mut ledger = Ledger::new(&chain());
        assert_eq!(ledger.recompute_readiness().unwrap(), vec!["A"]);

        ledger.transition("A", TaskStatus::InProgress, "").unwrap();
        ledger.transition("A", TaskStatus::Completed, "").unwrap();
        assert_eq!(ledger.recompute_readiness().unwrap(), vec!["B"]);
        assert_eq!(ledger.status("C"), Some(TaskStatus::Todo));
    }

    #[test]
    fn test_block_dependents_of_failed() {
        let mut ledger = Ledger::new(&chain());
        ledger.transition("A", TaskStatus::InProgress, "").unwrap();
        ledger.transition("A", TaskStatus::Failed, "abandoned").unwrap();

        let graph = chain();
        let blocked = ledger
            .block_dependents_of_failed("A", graph.transitive_dependents("A"))
            .unwrap();
        assert_eq!(blocked, vec!["B", "C"]);
        let record = ledger.get("C").unwrap();
        assert_eq!(record.status, TaskStatus::Blocked);
        assert_eq!(record.blocking, vec!["A".to_string()]);

        // A task blocked on a failed dependency never resolves
        assert!(ledger.resolve_split_parents().unwrap().is_empty());
    }

    #[test]
    fn test_split_parent_resolves_when_subtasks_complete() {
        let graph = chain();
        let mut ledger = Ledger::new(&graph);
        ledger.transition("A", TaskStatus::InProgress, "").unwrap();
        ledger.transition("A", TaskStatus::Completed, "").unwrap();
        ledger.transition("B", TaskStatus::InProgress, "").unwrap();

        assert_eq!(ledger.record_split("B").unwrap(), 1);
        ledger.request_split("B", "too large").unwrap();
        let record = ledger.get("B").unwrap();
        assert_eq!(record.status, TaskStatus::Blocked);
        assert!(record.awaiting_split);

        let split = graph
            .extend_with_split("B", vec![task("B1", vec![]), task("B2", vec!["B1"])])
            .unwrap();
        assert_eq!(ledger.sync_graph(&split), vec!["B1", "B2"]);
        ledger
            .attach_subtasks("B", vec!["B1".into(), "B2".into()])
            .unwrap();
        assert!(!ledger.get("B").unwrap().awaiting_split);
        assert_eq!(ledger.get("B1").unwrap().split_count, 1);
        assert_eq!(ledger.get("B2").unwrap().split_count, 1);
        assert!(ledger.resolve_split_parents().unwrap().is_empty());

        for id in ["B1", "B2"] {
            ledger.transition(id, TaskStatus::InProgress, "").unwrap();
            ledger.transition(id, TaskStatus::Completed, "").unwrap();
        }

        assert_eq!(ledger.resolve_split_parents().unwrap(), vec!["B"]);
        let record = ledger.get("B").unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert!(record.blocking.is_empty());
        assert_eq!(record.split_count, 1);

        // C was rewired onto the sub-tasks and is now eligible
        assert_eq!(ledger.recompute_readiness().unwrap(), vec!["C"]);
    }

    #[test]
    fn test_attach_unknown_subtask_leaves_parent_untouched() {
        let mut ledger = Ledger::new(&chain());
        ledger.request_split("A", "too large").unwrap();
        assert!(matches!(
            ledger.attach_subtasks("A", vec!["A1".into()]),
            Err(LedgerError::UnknownTask { .. })
        ));
        let record = ledger.get("A").unwrap();
        assert!(record.awaiting_split);
        assert!(record.blocking.is_empty());
    }

    #[test]
    fn test_attach_subtasks_requires_blocked() {
        let mut ledger = Ledger::new(&chain());
        assert!(matches!(
            ledger.attach_subtasks("A", vec!["A1".into()]),
            Err(LedgerError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_record_attempt_is_monotonic() {
        let mut ledger = Ledger::new(&chain());
        assert_eq!(ledger.record_attempt("A").unwrap(), 1);
        assert_eq!(ledger.record_attempt("A").unwrap(), 2);
        assert_eq!(ledger.get("A").unwrap().attempts, 2);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let graph = chain();

        let mut ledger = Ledger::new(&graph);
        ledger.transition("A", TaskStatus::InProgress, "").unwrap();
        ledger
            .set_artifacts("A", vec![PathBuf::from("Thesis/A.lean")])
            .unwrap();
        ledger.save(&path).unwrap();

        let loaded = Ledger::load(&path, &graph).unwrap();
        let record = loaded.get("A").unwrap();
        assert_eq!(record.status, TaskStatus::InProgress);
        assert_eq!(record.artifacts, vec![PathBuf::from("Thesis/A.lean")]);
        // Dependencies come back from the graph, not the file
        assert_eq!(loaded.first_incomplete_dependency("B").as_deref(), Some("A"));
    }

    #[test]
    fn test_load_missing_file_starts_fresh() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::load(&dir.path().join("ledger.json"), &chain()).unwrap();
        assert_eq!(ledger.summary().todo, 3);
    }

    #[test]
    fn test_load_corrupt_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, "{\"records\": ").unwrap();
        assert!(matches!(
            Ledger::load(&path, &chain()),
            Err(LedgerError::Parse { .. })
        ));
    }

    #[test]
    fn test_sync_graph_keeps_orphans() {
        let mut ledger = Ledger::new(&chain());
        let smaller = GraphBuilder::new(vec![task("A", vec![])]).build().unwrap();
        ledger.sync_graph(&smaller);
        assert!(ledger.get("C").is_ok());
        assert_eq!(ledger.records().count(), 3);
    }

    #[test]
    fn test_save_survives_failure_at_every_byte_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let graph = chain();

        let original = Ledger::new(&graph);
        original.save(&path).unwrap();
        let original_bytes = fs::read(&path).unwrap();

        let mut updated = original.clone();
        updated.transition("A", TaskStatus::InProgress, "selected").unwrap();
        let updated_bytes = serde_json::to_vec_pretty(&updated).unwrap();

        for offset in 0..=updated_bytes.len() {
            let result = updated.save_with(&path, |file, bytes| {
                file.write_all(&bytes[..offset])?;
                Err(io::Error::other("injected write failure"))
            });
            assert!(result.is_err(), "offset {}", offset);

            assert_eq!(fs::read(&path).unwrap(), original_bytes, "offset {}", offset);
            let reloaded = Ledger::load(&path, &graph).unwrap();
            assert_eq!(reloaded.status("A"), Some(TaskStatus::Todo));
        }

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temp files must be cleaned up");

        updated.save(&path).unwrap();
        let reloaded = Ledger::load(&path, &graph).unwrap();
        assert_eq!(reloaded.status("A"), Some(TaskStatus::InProgress));
    }

    #[test]
    fn test_summary_counts() {
        let mut ledger = Ledger::new(&chain());
        ledger.transition("A", TaskStatus::InProgress, "").unwrap();
        let summary = ledger.summary();
        assert_eq!(summary.in_progress, 1);
        assert_eq!(summary.todo, 2);
        assert_eq!(summary.total(), 3);
    }
}
