//! Typed error hierarchy for proofloop.
//!
//! Bookkeeping failures are fatal and carry their own enums:
//! - `GraphError`: malformed task graphs
//! - `LedgerError`: unknown tasks, invalid transitions, ledger I/O
//! - `ScheduleError`: tasks that can never become eligible, or a task already active
//! - `BootstrapError`: anything that prevents `init` from loading state
//! - `RunError`: everything that aborts a run loop
//!
//! Failures of external collaborators (build, lint, tests, scaffolding, the
//! coding agent) are never errors here; they become failed verification
//! results and go through the retry controller.

use crate::ledger::TaskStatus;
use std::path::PathBuf;
use thiserror::Error;

/// A task graph that violates the structural invariants.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Malformed task graph: task id must not be empty")]
    EmptyId,

    #[error("Malformed task graph: duplicate task id '{id}'")]
    DuplicateTask { id: String },

    #[error(
        "Malformed task graph: unknown dependency '{dependency}' in task '{task}': no task with that id exists"
    )]
    UnknownDependency { task: String, dependency: String },

    #[error("Malformed task graph: cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Malformed task graph: cannot split unknown task '{id}'")]
    UnknownTask { id: String },

    #[error("Malformed task graph: split of '{task}' produced no sub-tasks")]
    EmptySplit { task: String },
}

/// Errors from the progress ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Unknown task '{id}'")]
    UnknownTask { id: String },

    #[error("Invalid transition for task '{task}': {from} -> {to} ({reason})")]
    InvalidTransition {
        task: String,
        from: TaskStatus,
        to: TaskStatus,
        reason: String,
    },

    #[error("Failed to read ledger at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse ledger at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write ledger at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize ledger: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Reasons the scheduler cannot hand out a task.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error(
        "Deadlock: no task is eligible but {} task(s) can never run: {}",
        remaining.len(),
        remaining.join(", ")
    )]
    Deadlock { remaining: Vec<String> },

    #[error("Task '{id}' is already in progress")]
    TaskInProgress { id: String },
}

/// Failures while loading the task graph and ledger at `init`.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Failed to read task graph at {path}: {source}")]
    GraphRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse task graph at {path}: {source}")]
    GraphParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Errors that abort a run loop.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error("Another run holds the lock at {path}")]
    Locked { path: PathBuf },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
