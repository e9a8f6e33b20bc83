//! Task graph: the static definition of components, their dependencies and
//! acceptance criteria.
//!
//! ```text
//! tasks.json ──> TaskGraphFile ──> GraphBuilder::build ──> TaskGraph
//!                                   │ unique ids
//!                                   │ known dependencies
//!                                   │ DFS cycle check
//!                                   └ topological depths
//! ```
//!
//! A `TaskGraph` is immutable. Splitting a task produces a new graph version
//! through [`TaskGraph::extend_with_split`].

pub mod builder;
pub mod task;

pub use builder::{GraphBuilder, TaskGraph, TaskIndex};
pub use task::{Task, TaskGraphFile, is_glob_pattern};

use crate::errors::BootstrapError;
use std::path::Path;

impl TaskGraph {
    /// Load and validate the graph document at `path`.
    pub fn load(path: &Path) -> Result<TaskGraph, BootstrapError> {
        let file = TaskGraphFile::load(path)?;
        let graph = TaskGraph::from_file(file)?;
        tracing::debug!(
            tasks = graph.len(),
            version = graph.version(),
            "Loaded task graph from {}",
            path.display()
        );
        Ok(graph)
    }
}
