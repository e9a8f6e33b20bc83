//! Stage runners: execute one verification stage command.
//!
//! The default runner spawns the command through `sh -c` in the workspace:
//! - `PROOFLOOP_TASK`, `PROOFLOOP_STAGE` and `PROOFLOOP_ARTIFACTS`
//!   (newline-separated) are set in the environment
//! - `{artifacts}` and `{task}` in the command are replaced with the
//!   shell-quoted artifact list and the task id
//! - exit code 0 passes; anything else fails with stdout+stderr as diagnostics

use super::StageKind;
use crate::util::{shell_quote, tail_chars};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Diagnostics kept from a stage's output.
const MAX_DIAGNOSTIC_CHARS: usize = 16_000;

/// Everything a runner needs to execute one stage.
#[derive(Debug, Clone)]
pub struct StageInvocation<'a> {
    pub task_id: &'a str,
    pub stage: StageKind,
    pub command: &'a str,
    pub workspace: &'a Path,
    pub artifacts: &'a [PathBuf],
}

/// Outcome of a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub passed: bool,
    pub diagnostics: String,
}

impl StageOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            diagnostics: String::new(),
        }
    }

    pub fn fail(diagnostics: impl Into<String>) -> Self {
        Self {
            passed: false,
            diagnostics: diagnostics.into(),
        }
    }
}

/// Build/lint/test runner collaborator.
///
/// An `Err` means the stage could not be executed at all; the gate treats it
/// as a failure of that stage, never as a crash of the loop.
#[async_trait]
pub trait StageRunner: Send + Sync {
    async fn run(&self, invocation: &StageInvocation<'_>) -> Result<StageOutcome>;
}

/// Runs stage commands through `sh -c`.
#[derive(Debug, Default, Clone)]
pub struct CommandStageRunner;

impl CommandStageRunner {
    pub fn new() -> Self {
        Self
    }

    fn render(invocation: &StageInvocation<'_>) -> String {
        let artifacts = invocation
            .artifacts
            .iter()
            .map(|p| shell_quote(&p.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ");
        invocation
            .command
            .replace("{artifacts}", &artifacts)
            .replace("{task}", &shell_quote(invocation.task_id))
    }
}

#[async_trait]
impl StageRunner for CommandStageRunner {
    async fn run(&self, invocation: &StageInvocation<'_>) -> Result<StageOutcome> {
        let command = Self::render(invocation);
        let artifacts_env = invocation
            .artifacts
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\n");

        debug!(
            task = invocation.task_id,
            stage = %invocation.stage,
            %command,
            "Running verification stage"
        );

        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(invocation.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("PROOFLOOP_TASK", invocation.task_id)
            .env("PROOFLOOP_STAGE", invocation.stage.as_str())
            .env("PROOFLOOP_ARTIFACTS", artifacts_env)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to spawn {} command: {}", invocation.stage, command))?;

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(stage = %invocation.stage, exit_code, "Stage finished");

        if output.status.success() {
            return Ok(StageOutcome::pass());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut diagnostics = format!("`{}` exited with code {}", command, exit_code);
        for stream in [stdout.trim(), stderr.trim()] {
            if !stream.is_empty() {
                diagnostics.push('\n');
                diagnostics.push_str(stream);
            }
        }

        Ok(StageOutcome::fail(tail_chars(&diagnostics, MAX_DIAGNOSTIC_CHARS)))
    }
}
