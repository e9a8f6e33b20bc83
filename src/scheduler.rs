//! Scheduler: picks the next eligible task from the graph and ledger.
//!
//! A task is eligible when it is todo or ready and every dependency is
//! completed. Among eligible tasks the one with the smallest topological
//! depth wins, ties broken by lexical id order, so selection is fully
//! deterministic for a given graph and ledger.
//!
//! When nothing is eligible the scheduler tells apart:
//! - `Finished`: every task is completed
//! - `Stalled`: every remaining task is held back by a split request or a
//!   failed task (an operator has to act, nothing is wrong with the loop)
//! - `ScheduleError::Deadlock`: some todo/ready task can never become eligible

use crate::errors::ScheduleError;
use crate::graph::TaskGraph;
use crate::ledger::{Ledger, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// What the run loop should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Work on this task
    Next(String),
    /// Every task is completed
    Finished,
    /// Remaining work waits on a split or on failed tasks
    Stalled(StallReport),
}

/// Why the remaining tasks cannot run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StallReport {
    /// Blocked tasks waiting for sub-tasks to be supplied
    pub awaiting_split: Vec<String>,
    /// Blocked tasks waiting on failed tasks or on sub-tasks
    pub blocked: Vec<String>,
    /// Abandoned tasks
    pub failed: Vec<String>,
    /// Todo tasks held back transitively by one of the above
    pub waiting: Vec<String>,
}

impl StallReport {
    pub fn is_empty(&self) -> bool {
        self.awaiting_split.is_empty()
            && self.blocked.is_empty()
            && self.failed.is_empty()
            && self.waiting.is_empty()
    }
}

impl fmt::Display for StallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.awaiting_split.is_empty() {
            parts.push(format!("awaiting split: {}", self.awaiting_split.join(", ")));
        }
        if !self.blocked.is_empty() {
            parts.push(format!("blocked: {}", self.blocked.join(", ")));
        }
        if !self.failed.is_empty() {
            parts.push(format!("failed: {}", self.failed.join(", ")));
        }
        if !self.waiting.is_empty() {
            parts.push(format!("waiting: {}", self.waiting.join(", ")));
        }
        write!(f, "{}", parts.join("; "))
    }
}

/// Whether `id` may be selected right now.
pub fn is_eligible(graph: &TaskGraph, ledger: &Ledger, id: &str) -> bool {
    matches!(
        ledger.status(id),
        Some(TaskStatus::Todo | TaskStatus::Ready)
    ) && graph.dependencies(id).iter().all(|dep| ledger.is_completed(dep))
}

/// Eligible tasks in selection order.
pub fn eligible(graph: &TaskGraph, ledger: &Ledger) -> Vec<String> {
    let mut candidates: Vec<(usize, &str)> = graph
        .ids()
        .filter(|id| is_eligible(graph, ledger, id))
        .map(|id| (graph.topological_depth(id).unwrap_or(0), id))
        .collect();
    candidates.sort();
    candidates.into_iter().map(|(_, id)| id.to_string()).collect()
}

/// The next task to work on, if any is eligible and none is in progress.
pub fn select_next(graph: &TaskGraph, ledger: &Ledger) -> Option<String> {
    if ledger.in_progress().is_some() {
        return None;
    }
    eligible(graph, ledger).into_iter().next()
}

/// Decide the next step for the run loop.
pub fn next_step(graph: &TaskGraph, ledger: &Ledger) -> Result<Selection, ScheduleError> {
    if let Some(active) = ledger.in_progress() {
        return Err(ScheduleError::TaskInProgress {
            id: active.to_string(),
        });
    }

    if let Some(id) = select_next(graph, ledger) {
        return Ok(Selection::Next(id));
    }

    let remaining: Vec<&str> = graph.ids().filter(|id| !ledger.is_completed(id)).collect();
    if remaining.is_empty() {
        return Ok(Selection::Finished);
    }

    let mut held_back: HashMap<&str, bool> = HashMap::new();
    let mut report = StallReport::default();
    let mut unexplained = Vec::new();

    for id in remaining {
        match ledger.status(id) {
            Some(TaskStatus::Failed) => report.failed.push(id.to_string()),
            Some(TaskStatus::Blocked) => {
                if ledger.get(id).is_ok_and(|r| r.awaiting_split) {
                    report.awaiting_split.push(id.to_string());
                } else {
                    report.blocked.push(id.to_string());
                }
            }
            _ if is_held_back(graph, ledger, id, &mut held_back) => {
                report.waiting.push(id.to_string())
            }
            _ => unexplained.push(id.to_string()),
        }
    }

    if !unexplained.is_empty() {
        unexplained.sort();
        return Err(ScheduleError::Deadlock {
            remaining: unexplained,
        });
    }

    for list in [
        &mut report.awaiting_split,
        &mut report.blocked,
        &mut report.failed,
        &mut report.waiting,
    ] {
        list.sort();
    }
    Ok(Selection::Stalled(report))
}

/// Whether some transitive dependency of `id` is blocked or failed.
fn is_held_back<'g>(
    graph: &'g TaskGraph,
    ledger: &Ledger,
    id: &'g str,
    memo: &mut HashMap<&'g str, bool>,
) -> bool {
    if let Some(&known) = memo.get(id) {
        return known;
    }
    // Acyclic graph: a provisional `false` is never read back during this call.
    memo.insert(id, false);

    let held = graph.dependencies(id).iter().any(|dep| {
        match ledger.status(dep) {
            Some(TaskStatus::Blocked | TaskStatus::Failed) => true,
            Some(TaskStatus::Completed) => false,
            _ => is_held_back(graph, ledger, dep.as_str(), memo),
        }
    });
    memo.insert(id, held);
    held
}
