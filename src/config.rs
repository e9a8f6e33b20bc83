use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::settings::{SETTINGS_FILE, Settings};

/// Name of the per-project state directory.
pub const STATE_DIR: &str = ".proofloop";

/// Runtime configuration for a proofloop project.
///
/// Resolves every state path under `.proofloop/` and carries the parsed
/// `proofloop.toml` with CLI overrides applied on top.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub state_dir: PathBuf,
    pub settings_file: PathBuf,
    pub graph_file: PathBuf,
    pub ledger_file: PathBuf,
    pub run_log_file: PathBuf,
    pub runs_dir: PathBuf,
    pub log_dir: PathBuf,
    pub lock_file: PathBuf,
    pub verbose: bool,
    pub settings: Settings,
}

impl Config {
    /// Resolve paths for `project_dir` and load `proofloop.toml` if present.
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let state_dir = state_dir(&project_dir);
        let settings = Settings::load_or_default(&state_dir)?;
        Ok(Self::with_settings(project_dir, verbose, settings))
    }

    /// Build a config with explicit settings, without touching the disk.
    pub fn with_settings(project_dir: PathBuf, verbose: bool, settings: Settings) -> Self {
        let state_dir = state_dir(&project_dir);
        Self {
            settings_file: state_dir.join(SETTINGS_FILE),
            graph_file: state_dir.join("tasks.json"),
            ledger_file: state_dir.join("ledger.json"),
            run_log_file: state_dir.join("run-log.jsonl"),
            runs_dir: state_dir.join("runs"),
            log_dir: state_dir.join("logs"),
            lock_file: state_dir.join("run.lock"),
            state_dir,
            project_dir,
            verbose,
            settings,
        }
    }

    /// CLI override for the retry budget.
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        if let Some(max) = max_attempts {
            self.settings.retry.max_attempts = max;
        }
        self
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir).context("Failed to create state directory")?;
        std::fs::create_dir_all(&self.runs_dir).context("Failed to create runs directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }
}

/// The `.proofloop` directory of a project.
pub fn state_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(STATE_DIR)
}
