//! Project settings read from `.proofloop/proofloop.toml`.
//!
//! Every field has a default, so an empty or missing file is valid.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "thesis"
//!
//! [retry]
//! max_attempts = 3
//! max_splits = 1
//!
//! [verify]
//! timeout_secs = 900
//! prohibited_pattern = "\\bsorry\\b"
//!
//! [[verify.stages]]
//! kind = "build"
//! command = "lake build"
//!
//! [[verify.stages]]
//! kind = "prohibited_pattern"
//!
//! [agent]
//! command = "my-agent --task-json -"
//! timeout_secs = 3600
//! decompose_command = "my-agent --decompose"
//!
//! [scaffold]
//! enabled = true
//! test_template = "import {module}\n"
//!
//! [scaffold.templates]
//! lean = "import Mathlib\n"
//! ```

use crate::gate::{DEFAULT_PROHIBITED_PATTERN, StageKind, StageSpec};
use crate::reflect::RetryPolicy;
use crate::scaffold::{DEFAULT_LEAN_TEMPLATE, DEFAULT_TEST_TEMPLATE};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable that overrides `[agent] command`.
pub const AGENT_CMD_ENV: &str = "PROOFLOOP_AGENT_CMD";

pub const SETTINGS_FILE: &str = "proofloop.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_splits")]
    pub max_splits: u32,
}

fn default_max_attempts() -> u32 {
    RetryPolicy::default().max_attempts
}

fn default_max_splits() -> u32 {
    RetryPolicy::default().max_splits
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_splits: default_max_splits(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySection {
    /// Per-stage timeout in seconds
    #[serde(default = "default_verify_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_prohibited_pattern")]
    pub prohibited_pattern: String,
    /// Stages in order; empty means the default pipeline
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageSpec>,
}

fn default_verify_timeout() -> u64 {
    900
}

fn default_prohibited_pattern() -> String {
    DEFAULT_PROHIBITED_PATTERN.to_string()
}

impl Default for VerifySection {
    fn default() -> Self {
        Self {
            timeout_secs: default_verify_timeout(),
            prohibited_pattern: default_prohibited_pattern(),
            stages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decompose_command: Option<String>,
}

fn default_agent_timeout() -> u64 {
    3600
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: default_agent_timeout(),
            decompose_command: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaffoldSection {
    #[serde(default = "default_scaffold_enabled")]
    pub enabled: bool,
    /// Artifact templates keyed by file extension
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub templates: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_template: Option<String>,
}

fn default_scaffold_enabled() -> bool {
    true
}

impl Default for ScaffoldSection {
    fn default() -> Self {
        Self {
            enabled: default_scaffold_enabled(),
            templates: HashMap::new(),
            test_template: None,
        }
    }
}

impl ScaffoldSection {
    /// Configured templates layered over the built-in Lean template.
    pub fn resolved_templates(&self) -> HashMap<String, String> {
        let mut templates =
            HashMap::from([("lean".to_string(), DEFAULT_LEAN_TEMPLATE.to_string())]);
        templates.extend(self.templates.clone());
        templates
    }

    pub fn resolved_test_template(&self) -> String {
        self.test_template
            .clone()
            .unwrap_or_else(|| DEFAULT_TEST_TEMPLATE.to_string())
    }
}

/// The complete proofloop.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub verify: VerifySection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub scaffold: ScaffoldSection,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse proofloop.toml")
    }

    /// Load `proofloop.toml` from `state_dir`, or defaults if it does not exist.
    pub fn load_or_default(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(SETTINGS_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize proofloop.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Agent command (environment overrides the file).
    pub fn agent_command(&self) -> Option<String> {
        std::env::var(AGENT_CMD_ENV)
            .ok()
            .filter(|cmd| !cmd.trim().is_empty())
            .or_else(|| self.agent.command.clone())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            max_splits: self.retry.max_splits,
        }
    }

    pub fn stage_specs(&self) -> Vec<StageSpec> {
        if self.verify.stages.is_empty() {
            return StageSpec::default_pipeline();
        }
        self.verify.stages.clone()
    }

    pub fn prohibited_regex(&self) -> Result<Regex> {
        Regex::new(&self.verify.prohibited_pattern).with_context(|| {
            format!(
                "Invalid prohibited_pattern '{}'",
                self.verify.prohibited_pattern
            )
        })
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify.timeout_secs)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.timeout_secs)
    }

    /// Validate the settings and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.retry.max_attempts == 0 {
            warnings.push("retry.max_attempts is 0: every failure escalates immediately".to_string());
        }
        if let Err(e) = self.prohibited_regex() {
            warnings.push(format!("{:#}", e));
        }
        if self.verify.timeout_secs == 0 {
            warnings.push("verify.timeout_secs is 0: every command stage will time out".to_string());
        }
        for stage in &self.verify.stages {
            if stage.kind != StageKind::ProhibitedPattern && stage.command.is_none() {
                warnings.push(format!("verify stage '{}' has no command and will be skipped", stage.kind));
            }
        }
        if self.agent_command().is_none() {
            warnings.push(format!(
                "No agent command configured: set [agent] command or {}",
                AGENT_CMD_ENV
            ));
        }

        warnings
    }
}
