//! Task definitions and the persisted `tasks.json` document.

use crate::errors::BootstrapError;
use crate::util::atomic_write;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

fn default_kind() -> String {
    "component".to_string()
}

fn default_version() -> u32 {
    1
}

/// A unit of work in the task graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: String,
    /// Human-readable title
    pub title: String,
    /// Category tag (e.g. "definition", "lemma", "theorem")
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Ids of tasks that must complete first, in declaration order
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Acceptance criteria handed to the coding agent
    #[serde(default)]
    pub acceptance: Vec<String>,
    /// Paths (or glob patterns) of artifacts this task produces, relative to the workspace
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
    /// Test artifacts created alongside the main artifacts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<PathBuf>,
    /// Task this one was split from; advisory only, never a dependency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_from: Option<String>,
}

impl Task {
    pub fn new(id: &str, title: &str, depends_on: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            kind: default_kind(),
            depends_on,
            acceptance: Vec::new(),
            artifacts: Vec::new(),
            tests: Vec::new(),
            split_from: None,
        }
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = kind.to_string();
        self
    }

    pub fn with_acceptance(mut self, acceptance: Vec<String>) -> Self {
        self.acceptance = acceptance;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<PathBuf>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_tests(mut self, tests: Vec<PathBuf>) -> Self {
        self.tests = tests;
        self
    }

    /// Resolve the declared artifacts against `workspace`.
    ///
    /// Glob patterns expand to the files they match; plain paths are kept if
    /// they exist. Results are relative to the workspace, sorted and deduplicated.
    pub fn resolve_artifacts(&self, workspace: &Path) -> Vec<PathBuf> {
        let mut resolved = Vec::new();

        for artifact in self.artifacts.iter().chain(self.tests.iter()) {
            let raw = artifact.to_string_lossy();
            if is_glob_pattern(&raw) {
                let pattern = workspace.join(artifact);
                let Ok(paths) = glob::glob(&pattern.to_string_lossy()) else {
                    tracing::warn!(task = %self.id, pattern = %raw, "Invalid artifact pattern");
                    continue;
                };
                for path in paths.flatten() {
                    if let Ok(relative) = path.strip_prefix(workspace) {
                        resolved.push(relative.to_path_buf());
                    }
                }
            } else if workspace.join(artifact).exists() {
                resolved.push(artifact.clone());
            }
        }

        resolved.sort();
        resolved.dedup();
        resolved
    }
}

/// Whether an artifact path is a glob pattern rather than a concrete file.
pub fn is_glob_pattern(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

/// On-disk form of the task graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGraphFile {
    /// Monotonically increasing graph version
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Default for TaskGraphFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            tasks: Vec::new(),
        }
    }
}

impl TaskGraphFile {
    /// Read and parse a graph document. Structural validation happens in the builder.
    pub fn load(path: &Path) -> std::result::Result<Self, BootstrapError> {
        let content = std::fs::read_to_string(path).map_err(|source| BootstrapError::GraphRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| BootstrapError::GraphParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the document atomically as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize task graph")?;
        atomic_write(path, content.as_bytes())
            .with_context(|| format!("Failed to write task graph: {}", path.display()))
    }

    /// SHA-256 over the canonical JSON encoding, hex encoded.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }
}
