//! Append-only run log (`run-log.jsonl`), one JSON entry per line.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// States of the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    Plan,
    SelectTask,
    Prepare,
    Implement,
    Verify,
    Reflect,
    Done,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Init => "init",
            RunPhase::Plan => "plan",
            RunPhase::SelectTask => "select_task",
            RunPhase::Prepare => "prepare",
            RunPhase::Implement => "implement",
            RunPhase::Verify => "verify",
            RunPhase::Reflect => "reflect",
            RunPhase::Done => "done",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of what happened in a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOutcome {
    Ok,
    Resumed,
    Selected,
    Passed,
    Failed,
    Retry,
    Split,
    Abandon,
    Stalled,
    Deadlock,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub phase: RunPhase,
    pub message: String,
    pub outcome: EntryOutcome,
}

impl RunLogEntry {
    pub fn new(
        run_id: Uuid,
        task_id: Option<&str>,
        phase: RunPhase,
        message: impl Into<String>,
        outcome: EntryOutcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id,
            task_id: task_id.map(String::from),
            phase,
            message: message.into(),
            outcome,
        }
    }
}

pub struct RunLog {
    log_file: PathBuf,
}

impl RunLog {
    pub fn new(log_file: &Path) -> Self {
        Self {
            log_file: log_file.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.log_file
    }

    /// Append one entry as a single line.
    pub fn append(&self, entry: &RunLogEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry).context("Failed to serialize run log entry")?;
        line.push('\n');

        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .context("Failed to open run log")?
            .write_all(line.as_bytes())
            .context("Failed to write run log entry")?;

        Ok(())
    }

    /// All entries in order. A torn last line from a crash mid-append is skipped.
    pub fn entries(&self) -> Result<Vec<RunLogEntry>> {
        if !self.log_file.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.log_file).context("Failed to read run log")?;
        let mut entries = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunLogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(line = i + 1, "Skipping unreadable run log entry: {}", e),
            }
        }
        Ok(entries)
    }

    pub fn entries_for_task(&self, task_id: &str) -> Result<Vec<RunLogEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.task_id.as_deref() == Some(task_id))
            .collect())
    }

    pub fn last_run_id(&self) -> Result<Option<Uuid>> {
        Ok(self.entries()?.last().map(|e| e.run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_read_entries() {
        let dir = tempdir().unwrap();
        let log = RunLog::new(&dir.path().join("run-log.jsonl"));
        let run_id = Uuid::new_v4();

        log.append(&RunLogEntry::new(run_id, None, RunPhase::Init, "loaded", EntryOutcome::Ok))
            .unwrap();
        log.append(&RunLogEntry::new(
            run_id,
            Some("A"),
            RunPhase::Verify,
            "build failed",
            EntryOutcome::Failed,
        ))
        .unwrap();

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].phase, RunPhase::Init);
        assert_eq!(entries[1].task_id.as_deref(), Some("A"));
        assert_eq!(entries[1].outcome, EntryOutcome::Failed);
        assert_eq!(log.last_run_id().unwrap(), Some(run_id));
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempdir().unwrap();
        let log = RunLog::new(&dir.path().join("run-log.jsonl"));
        assert!(log.entries().unwrap().is_empty());
        assert_eq!(log.last_run_id().unwrap(), None);
    }

    #[test]
    fn test_torn_line_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run-log.jsonl");
        let log = RunLog::new(&path);
        log.append(&RunLogEntry::new(Uuid::new_v4(), Some("A"), RunPhase::Plan, "ok", EntryOutcome::Ok))
            .unwrap();
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"timestamp\": \"2026-").unwrap();

        assert_eq!(log.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_entries_for_task() {
        let dir = tempdir().unwrap();
        let log = RunLog::new(&dir.path().join("run-log.jsonl"));
        let run_id = Uuid::new_v4();
        for task in ["A", "B", "A"] {
            log.append(&RunLogEntry::new(run_id, Some(task), RunPhase::Implement, "", EntryOutcome::Ok))
                .unwrap();
        }
        assert_eq!(log.entries_for_task("A").unwrap().len(), 2);
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&RunPhase::SelectTask).unwrap(), "\"select_task\"");
        assert_eq!(RunPhase::SelectTask.to_string(), "select_task");
    }
}
