//! `proofloop init`: creates the `.proofloop/` state directory.
//!
//! ```text
//! .proofloop/
//! ├── proofloop.toml   # Settings (retry budget, verify stages, agent command)
//! ├── tasks.json       # Task graph
//! ├── ledger.json      # Progress ledger (written by the first run)
//! ├── run-log.jsonl    # Append-only run log
//! ├── runs/            # Per-run reports
//! └── logs/            # Tracing output
//! ```

use crate::config::STATE_DIR;
use crate::graph::TaskGraphFile;
use crate::settings::{SETTINGS_FILE, Settings};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Result of initializing a project.
#[derive(Debug)]
pub struct InitResult {
    pub state_dir: PathBuf,
    /// Whether the directory was newly created
    pub created: bool,
}

/// Initialize a proofloop project in `project_dir`.
///
/// Existing files are left alone, so running it twice only fills in what is
/// missing.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let state_dir = get_state_dir(project_dir);
    let created = !state_dir.exists();

    for dir in [state_dir.clone(), state_dir.join("runs"), state_dir.join("logs")] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    let settings_file = state_dir.join(SETTINGS_FILE);
    if !settings_file.exists() {
        let mut settings = Settings::default();
        settings.project.name = project_dir
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));
        settings.verify.stages = crate::gate::StageSpec::default_pipeline();
        settings.save(&settings_file)?;
    }

    let graph_file = state_dir.join("tasks.json");
    if !graph_file.exists() {
        TaskGraphFile {
            version: 1,
            tasks: Vec::new(),
        }
        .save(&graph_file)?;
    }

    Ok(InitResult { state_dir, created })
}

/// Check if a project has been initialized.
pub fn is_initialized(project_dir: &Path) -> bool {
    get_state_dir(project_dir).join("tasks.json").exists()
}

pub fn get_state_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(STATE_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_init_creates_state_directory() {
        let dir = tempdir().unwrap();
        assert!(!is_initialized(dir.path()));

        let result = init_project(dir.path()).unwrap();
        assert!(result.created);
        assert!(result.state_dir.join("runs").is_dir());
        assert!(result.state_dir.join("logs").is_dir());
        assert!(is_initialized(dir.path()));

        let graph = TaskGraphFile::load(&result.state_dir.join("tasks.json")).unwrap();
        assert_eq!(graph.version, 1);
        assert!(graph.tasks.is_empty());
    }

    #[test]
    fn test_init_writes_loadable_settings() {
        let dir = tempdir().unwrap();
        let result = init_project(dir.path()).unwrap();
        let settings = Settings::load_or_default(&result.state_dir).unwrap();
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.verify.stages.len(), 4);
        assert!(settings.project.name.is_some());
    }

    #[test]
    fn test_init_twice_keeps_existing_files() {
        let dir = tempdir().unwrap();
        init_project(dir.path()).unwrap();
        let graph_file = dir.path().join(".proofloop/tasks.json");
        fs::write(&graph_file, r#"{"version": 3, "tasks": []}"#).unwrap();

        let result = init_project(dir.path()).unwrap();
        assert!(!result.created);
        assert_eq!(TaskGraphFile::load(&graph_file).unwrap().version, 3);
    }
}
