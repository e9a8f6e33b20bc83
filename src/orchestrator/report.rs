//! End-of-run reports written to `.proofloop/runs/`.

use crate::graph::TaskGraph;
use crate::ledger::{Ledger, LedgerSummary, TaskStatus};
use crate::scheduler::StallReport;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every task completed
    Done,
    /// Remaining work waits on a split or on failed tasks
    Stalled { report: StallReport },
    /// A fatal error stopped the run
    Aborted { error: String },
}

/// Final status of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub split_count: u32,
    #[serde(default)]
    pub awaiting_split: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocking: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub graph_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_head: Option<String>,
    pub summary: LedgerSummary,
    pub tasks: Vec<TaskRow>,
}

impl RunReport {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        outcome: RunOutcome,
        graph: &TaskGraph,
        ledger: &Ledger,
    ) -> Self {
        let tasks = graph
            .tasks()
            .iter()
            .filter_map(|task| {
                let record = ledger.get(&task.id).ok()?;
                Some(TaskRow {
                    id: task.id.clone(),
                    title: task.title.clone(),
                    status: record.status,
                    attempts: record.attempts,
                    split_count: record.split_count,
                    awaiting_split: record.awaiting_split,
                    blocking: record.blocking.clone(),
                })
            })
            .collect();

        Self {
            run_id,
            started_at,
            ended_at: Utc::now(),
            outcome,
            graph_version: graph.version(),
            git_head: None,
            summary: ledger.summary(),
            tasks,
        }
    }

    pub fn with_git_head(mut self, head: Option<String>) -> Self {
        self.git_head = head;
        self
    }

    pub fn is_done(&self) -> bool {
        self.outcome == RunOutcome::Done
    }

    /// Write the report as `<started>_<run id prefix>.json` under `runs_dir`.
    pub fn write(&self, runs_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(runs_dir).context("Failed to create runs directory")?;
        let filename = format!(
            "{}_{}.json",
            self.started_at.format("%Y-%m-%dT%H-%M-%S"),
            &self.run_id.to_string()[..8]
        );
        let path = runs_dir.join(filename);
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        fs::write(&path, json).context("Failed to write run report")?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read run report")?;
        serde_json::from_str(&content).context("Failed to parse run report")
    }

    /// Report files, most recent first.
    pub fn list(runs_dir: &Path) -> Result<Vec<PathBuf>> {
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs: Vec<PathBuf> = fs::read_dir(runs_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();

        runs.sort();
        runs.reverse();
        Ok(runs)
    }
}
