//! Verification gate: runs the configured stages in order and classifies the
//! outcome.
//!
//! ```text
//! build ──> prohibited_pattern ──> lint ──> test ──> passed
//!   │              │                 │        │
//!   └──────────────┴─────────────────┴────────┴──> failed { stage, diagnostics }
//! ```
//!
//! The first failing stage short-circuits the rest. Command stages run through
//! a [`StageRunner`] under a shared timeout; a timeout yields a failed result
//! with stage `timeout`. Stages without a command are skipped.

pub mod runner;
pub mod scan;

pub use runner::{CommandStageRunner, StageInvocation, StageOutcome, StageRunner};
pub use scan::{DEFAULT_PROHIBITED_PATTERN, PatternHit, scan_artifacts};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// A configurable verification stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Build,
    ProhibitedPattern,
    Lint,
    Test,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Build => "build",
            StageKind::ProhibitedPattern => "prohibited_pattern",
            StageKind::Lint => "lint",
            StageKind::Test => "test",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an attempt failed.
///
/// Besides the gate stages this covers failures of the collaborators that
/// run before verification, so every failure flows through the same reflect
/// path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStage {
    Build,
    ProhibitedPattern,
    Lint,
    Test,
    Timeout,
    Scaffold,
    Agent,
}

impl From<StageKind> for FailedStage {
    fn from(kind: StageKind) -> Self {
        match kind {
            StageKind::Build => FailedStage::Build,
            StageKind::ProhibitedPattern => FailedStage::ProhibitedPattern,
            StageKind::Lint => FailedStage::Lint,
            StageKind::Test => FailedStage::Test,
        }
    }
}

impl fmt::Display for FailedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailedStage::Build => "build",
            FailedStage::ProhibitedPattern => "prohibited_pattern",
            FailedStage::Lint => "lint",
            FailedStage::Test => "test",
            FailedStage::Timeout => "timeout",
            FailedStage::Scaffold => "scaffold",
            FailedStage::Agent => "agent",
        };
        f.write_str(s)
    }
}

/// Outcome of a verification attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<FailedStage>,
    #[serde(default)]
    pub diagnostics: String,
}

impl VerificationResult {
    pub fn passed() -> Self {
        Self {
            passed: true,
            failed_stage: None,
            diagnostics: String::new(),
        }
    }

    pub fn failed(stage: FailedStage, diagnostics: impl Into<String>) -> Self {
        Self {
            passed: false,
            failed_stage: Some(stage),
            diagnostics: diagnostics.into(),
        }
    }
}

/// One configured stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub kind: StageKind,
    /// Shell command; command stages without one are skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl StageSpec {
    pub fn new(kind: StageKind, command: Option<&str>) -> Self {
        Self {
            kind,
            command: command.map(String::from),
        }
    }

    /// Default pipeline: `lake build`, placeholder scan, no lint or test command.
    pub fn default_pipeline() -> Vec<StageSpec> {
        vec![
            StageSpec::new(StageKind::Build, Some("lake build")),
            StageSpec::new(StageKind::ProhibitedPattern, None),
            StageSpec::new(StageKind::Lint, None),
            StageSpec::new(StageKind::Test, None),
        ]
    }
}

/// Runs the verification stages for a task.
pub struct VerificationGate {
    stages: Vec<StageSpec>,
    prohibited: Regex,
    stage_timeout: Duration,
    runner: Arc<dyn StageRunner>,
}

impl VerificationGate {
    pub fn new(
        stages: Vec<StageSpec>,
        prohibited: Regex,
        stage_timeout: Duration,
        runner: Arc<dyn StageRunner>,
    ) -> Self {
        Self {
            stages,
            prohibited,
            stage_timeout,
            runner,
        }
    }

    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Verify the work on `task_id`. `changed` lists the artifacts the pattern
    /// scan inspects, relative to `workspace`.
    pub async fn verify(
        &self,
        task_id: &str,
        workspace: &Path,
        changed: &[PathBuf],
    ) -> VerificationResult {
        for stage in &self.stages {
            let result = match stage.kind {
                StageKind::ProhibitedPattern => self.scan(task_id, workspace, changed),
                kind => match &stage.command {
                    Some(command) => {
                        self.run_command(task_id, kind, command, workspace, changed)
                            .await
                    }
                    None => {
                        debug!(task = task_id, stage = %kind, "No command configured, skipping");
                        continue;
                    }
                },
            };

            if let Some(failure) = result {
                info!(
                    task = task_id,
                    stage = ?failure.failed_stage,
                    "Verification failed"
                );
                return failure;
            }
        }

        debug!(task = task_id, "All verification stages passed");
        VerificationResult::passed()
    }

    fn scan(&self, task_id: &str, workspace: &Path, changed: &[PathBuf]) -> Option<VerificationResult> {
        let hits = scan_artifacts(workspace, changed, &self.prohibited);
        debug!(task = task_id, files = changed.len(), hits = hits.len(), "Pattern scan");
        if hits.is_empty() {
            return None;
        }

        let mut diagnostics = format!(
            "Found {} occurrence(s) of prohibited pattern `{}`:",
            hits.len(),
            self.prohibited.as_str()
        );
        for hit in &hits {
            diagnostics.push_str("\n  ");
            diagnostics.push_str(&hit.to_string());
        }
        Some(VerificationResult::failed(
            FailedStage::ProhibitedPattern,
            diagnostics,
        ))
    }

    async fn run_command(
        &self,
        task_id: &str,
        kind: StageKind,
        command: &str,
        workspace: &Path,
        changed: &[PathBuf],
    ) -> Option<VerificationResult> {
        let invocation = StageInvocation {
            task_id,
            stage: kind,
            command,
            workspace,
            artifacts: changed,
        };

        match timeout(self.stage_timeout, self.runner.run(&invocation)).await {
            Err(_) => Some(VerificationResult::failed(
                FailedStage::Timeout,
                format!(
                    "{} stage timed out after {}s",
                    kind,
                    self.stage_timeout.as_secs()
                ),
            )),
            Ok(Err(e)) => Some(VerificationResult::failed(kind.into(), format!("{:#}", e))),
            Ok(Ok(outcome)) if !outcome.passed => {
                Some(VerificationResult::failed(kind.into(), outcome.diagnostics))
            }
            Ok(Ok(_)) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Runner that replays scripted outcomes per stage and records calls.
    #[derive(Default)]
    struct ScriptedRunner {
        failing: Vec<StageKind>,
        slow: Vec<StageKind>,
        calls: Mutex<Vec<StageKind>>,
    }

    #[async_trait]
    impl StageRunner for ScriptedRunner {
        async fn run(&self, invocation: &StageInvocation<'_>) -> anyhow::Result<StageOutcome> {
            self.calls.lock().unwrap().push(invocation.stage);
            if self.slow.contains(&invocation.stage) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if self.failing.contains(&invocation.stage) {
                Ok(StageOutcome::fail(format!("{} broke", invocation.stage)))
            } else {
                Ok(StageOutcome::pass())
            }
        }
    }

    fn full_pipeline() -> Vec<StageSpec> {
        vec![
            StageSpec::new(StageKind::Build, Some("build")),
            StageSpec::new(StageKind::ProhibitedPattern, None),
            StageSpec::new(StageKind::Lint, Some("lint")),
            StageSpec::new(StageKind::Test, Some("test")),
        ]
    }

    fn gate(stages: Vec<StageSpec>, runner: Arc<ScriptedRunner>) -> VerificationGate {
        VerificationGate::new(
            stages,
            Regex::new(DEFAULT_PROHIBITED_PATTERN).unwrap(),
            Duration::from_millis(200),
            runner,
        )
    }

    #[tokio::test]
    async fn test_all_stages_pass() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let result = gate(full_pipeline(), runner.clone())
            .verify("A", dir.path(), &[])
            .await;
        assert!(result.passed);
        assert_eq!(
            *runner.calls.lock().unwrap(),
            vec![StageKind::Build, StageKind::Lint, StageKind::Test]
        );
    }

    #[tokio::test]
    async fn test_short_circuits_on_first_failure() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner {
            failing: vec![StageKind::Build, StageKind::Test],
            ..Default::default()
        });
        let result = gate(full_pipeline(), runner.clone())
            .verify("A", dir.path(), &[])
            .await;
        assert!(!result.passed);
        assert_eq!(result.failed_stage, Some(FailedStage::Build));
        assert_eq!(result.diagnostics, "build broke");
        assert_eq!(*runner.calls.lock().unwrap(), vec![StageKind::Build]);
    }

    #[tokio::test]
    async fn test_prohibited_pattern_fails_before_lint() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("A.lean"), "theorem t : True := by sorry\n").unwrap();
        let runner = Arc::new(ScriptedRunner::default());

        let result = gate(full_pipeline(), runner.clone())
            .verify("A", dir.path(), &[PathBuf::from("A.lean")])
            .await;
        assert_eq!(result.failed_stage, Some(FailedStage::ProhibitedPattern));
        assert!(result.diagnostics.contains("A.lean:1"));
        assert_eq!(*runner.calls.lock().unwrap(), vec![StageKind::Build]);
    }

    #[tokio::test]
    async fn test_timeout_is_failed_stage() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner {
            slow: vec![StageKind::Lint],
            ..Default::default()
        });
        let result = gate(full_pipeline(), runner).verify("A", dir.path(), &[]).await;
        assert_eq!(result.failed_stage, Some(FailedStage::Timeout));
        assert!(result.diagnostics.contains("lint stage timed out"));
    }

    #[tokio::test]
    async fn test_stages_without_command_are_skipped() {
        let dir = tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner {
            failing: vec![StageKind::Lint],
            ..Default::default()
        });
        let stages = vec![
            StageSpec::new(StageKind::Build, Some("build")),
            StageSpec::new(StageKind::Lint, None),
        ];
        let result = gate(stages, runner.clone()).verify("A", dir.path(), &[]).await;
        assert!(result.passed);
        assert_eq!(*runner.calls.lock().unwrap(), vec![StageKind::Build]);
    }

    #[tokio::test]
    async fn test_command_runner_end_to_end() {
        let dir = tempdir().unwrap();
        let gate = VerificationGate::new(
            vec![
                StageSpec::new(StageKind::Build, Some("true")),
                StageSpec::new(StageKind::Test, Some("echo 'test failed' && false")),
            ],
            Regex::new(DEFAULT_PROHIBITED_PATTERN).unwrap(),
            Duration::from_secs(30),
            Arc::new(CommandStageRunner::new()),
        );
        let result = gate.verify("A", dir.path(), &[]).await;
        assert_eq!(result.failed_stage, Some(FailedStage::Test));
        assert!(result.diagnostics.contains("test failed"));
    }

    #[test]
    fn test_default_pipeline_order() {
        let kinds: Vec<_> = StageSpec::default_pipeline().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Build,
                StageKind::ProhibitedPattern,
                StageKind::Lint,
                StageKind::Test
            ]
        );
    }
}
