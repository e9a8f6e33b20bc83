//! CLI command implementations.
//!
//! | Module    | Commands handled                                  |
//! |-----------|---------------------------------------------------|
//! | `project` | `Init`, `Validate`, `List`                        |
//! | `task`    | `Status`, `Next`, `Scaffold`, `Split`, `Log`, `Reset` |
//! | `run`     | `Run`                                             |

pub mod project;
pub mod run;
pub mod task;

pub use project::{cmd_init, cmd_list, cmd_validate};
pub use run::cmd_run;
pub use task::{cmd_log, cmd_next, cmd_reset, cmd_scaffold, cmd_split, cmd_status};

use anyhow::{Result, bail};
use proofloop::config::Config;
use proofloop::graph::TaskGraph;
use proofloop::init::is_initialized;
use proofloop::ledger::Ledger;
use std::path::Path;

/// Resolve the config of an initialized project.
pub fn load_config(project_dir: &Path, verbose: bool) -> Result<Config> {
    if !is_initialized(project_dir) {
        bail!("Project not initialized. Run 'proofloop init' first.");
    }
    Config::new(project_dir.to_path_buf(), verbose)
}

/// Load the graph and the ledger as they are on disk, without saving anything.
pub fn load_state(config: &Config) -> Result<(TaskGraph, Ledger)> {
    let graph = TaskGraph::load(&config.graph_file)?;
    let ledger = Ledger::load(&config.ledger_file, &graph)?;
    Ok((graph, ledger))
}
