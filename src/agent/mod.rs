//! Coding agent collaborator.
//!
//! The agent is opaque: it receives a task descriptor, the artifacts from
//! earlier work and the diagnostics of the last failure, and reports which
//! files it changed. Whether the work is any good is decided by the gate.
//!
//! `CommandAgent` runs a configured shell command with the request as JSON on
//! stdin. Changed files are taken from, in order:
//! 1. a JSON object `{"changed_files": [...]}` in stdout
//! 2. one existing path per stdout line
//! 3. the git working-tree status of the workspace

pub mod decompose;

pub use decompose::{CommandDecomposer, Decomposer, parse_decomposition};

use crate::graph::Task;
use crate::tracker::GitTracker;
use crate::util::{extract_json_object, tail_chars};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// What the agent is asked to do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub task: Task,
    /// 1-based attempt number
    pub attempt: u32,
    pub max_attempts: u32,
    /// Artifacts of completed dependencies and of this task's previous attempt
    #[serde(default)]
    pub prior_artifacts: Vec<PathBuf>,
    /// Diagnostics of the last failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub workspace: PathBuf,
}

/// What the agent reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReport {
    #[serde(default)]
    pub changed_files: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[async_trait]
pub trait CodingAgent: Send + Sync {
    /// Work on the task. An `Err` is a failed attempt, not a crash.
    async fn implement(&self, request: &AgentRequest) -> Result<AgentReport>;
}

/// Runs an external agent command.
pub struct CommandAgent {
    command: String,
    workspace: PathBuf,
    timeout: Duration,
}

impl CommandAgent {
    pub fn new(command: &str, workspace: &Path, timeout: Duration) -> Self {
        Self {
            command: command.to_string(),
            workspace: workspace.to_path_buf(),
            timeout,
        }
    }
}

#[async_trait]
impl CodingAgent for CommandAgent {
    async fn implement(&self, request: &AgentRequest) -> Result<AgentReport> {
        let payload =
            serde_json::to_string(request).context("Failed to serialize agent request")?;
        let attempt = request.attempt.to_string();
        let output = run_shell(
            &self.command,
            &self.workspace,
            &payload,
            self.timeout,
            &[
                ("PROOFLOOP_TASK", request.task.id.as_str()),
                ("PROOFLOOP_ATTEMPT", attempt.as_str()),
            ],
        )
        .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut report = parse_agent_output(&stdout, &self.workspace);

        if report.changed_files.is_empty() {
            match GitTracker::new(&self.workspace).and_then(|t| t.changed_paths()) {
                Ok(paths) => report.changed_files = paths,
                Err(e) => debug!("Git change detection unavailable: {:#}", e),
            }
        }

        debug!(
            task = %request.task.id,
            changed = report.changed_files.len(),
            "Agent finished"
        );
        Ok(report)
    }
}

/// Interpret agent stdout as an [`AgentReport`].
pub fn parse_agent_output(stdout: &str, workspace: &Path) -> AgentReport {
    if let Some(json) = extract_json_object(stdout)
        && let Ok(report) = serde_json::from_str::<AgentReport>(&json)
        && (!report.changed_files.is_empty() || report.summary.is_some())
    {
        return report;
    }

    let changed_files = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .filter(|path| path.is_relative() && workspace.join(path).is_file())
        .collect();

    AgentReport {
        changed_files,
        summary: None,
    }
}

/// Run `command` through `sh -c` in `workspace`, feeding `stdin` and failing on
/// a non-zero exit or when `limit` elapses.
pub(crate) async fn run_shell(
    command: &str,
    workspace: &Path,
    stdin: &str,
    limit: Duration,
    env: &[(&str, &str)],
) -> Result<Output> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(workspace)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .envs(env.iter().copied())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn command: {}", command))?;

    if let Some(mut pipe) = child.stdin.take() {
        // A command that ignores stdin may close it early
        if let Err(e) = pipe.write_all(stdin.as_bytes()).await {
            debug!("Command closed stdin early: {}", e);
        }
    }

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.context("Failed to wait for command")?,
        Err(_) => bail!("`{}` timed out after {}s", command, limit.as_secs()),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "`{}` exited with code {}: {}",
            command,
            output.status.code().unwrap_or(-1),
            tail_chars(stderr.trim(), 4_000)
        );
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn request(workspace: &Path) -> AgentRequest {
        AgentRequest {
            task: Task::new("A", "Basic definitions", vec![]),
            attempt: 1,
            max_attempts: 3,
            prior_artifacts: vec![],
            feedback: Some("error: unknown constant".to_string()),
            workspace: workspace.to_path_buf(),
        }
    }

    #[test]
    fn test_parse_json_report() {
        let dir = tempdir().unwrap();
        let report = parse_agent_output(
            r#"working... {"changed_files": ["Thesis/A.lean"], "summary": "added defs"} done"#,
            dir.path(),
        );
        assert_eq!(report.changed_files, vec![PathBuf::from("Thesis/A.lean")]);
        assert_eq!(report.summary.as_deref(), Some("added defs"));
    }

    #[test]
    fn test_parse_json_report_with_braces_in_summary() {
        let dir = tempdir().unwrap();
        let report = parse_agent_output(
            r#"{"changed_files": ["Thesis/A.lean"], "summary": "closed the `}` goal"}"#,
            dir.path(),
        );
        assert_eq!(report.changed_files, vec![PathBuf::from("Thesis/A.lean")]);
        assert_eq!(report.summary.as_deref(), Some("closed the `}` goal"));
    }

    #[test]
    fn test_parse_path_lines_keeps_existing_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("A.lean"), "").unwrap();
        let report = parse_agent_output("A.lean\nnot a file\n\n", dir.path());
        assert_eq!(report.changed_files, vec![PathBuf::from("A.lean")]);
    }

    #[tokio::test]
    async fn test_command_agent_receives_request_on_stdin() {
        let dir = tempdir().unwrap();
        let agent = CommandAgent::new(
            r#"cat > request.json && test "$PROOFLOOP_TASK" = A && echo '{"changed_files": ["request.json"]}'"#,
            dir.path(),
            Duration::from_secs(30),
        );

        let report = agent.implement(&request(dir.path())).await.unwrap();
        assert_eq!(report.changed_files, vec![PathBuf::from("request.json")]);

        let sent: AgentRequest =
            serde_json::from_str(&fs::read_to_string(dir.path().join("request.json")).unwrap())
                .unwrap();
        assert_eq!(sent.task.id, "A");
        assert_eq!(sent.feedback.as_deref(), Some("error: unknown constant"));
    }

    #[tokio::test]
    async fn test_command_agent_failure_is_error() {
        let dir = tempdir().unwrap();
        let agent = CommandAgent::new("echo 'quota exceeded' >&2; exit 7", dir.path(), Duration::from_secs(30));
        let err = agent.implement(&request(dir.path())).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("code 7"));
        assert!(message.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_command_agent_timeout_is_error() {
        let dir = tempdir().unwrap();
        let agent = CommandAgent::new("sleep 5", dir.path(), Duration::from_millis(100));
        let err = agent.implement(&request(dir.path())).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_command_agent_falls_back_to_git_status() {
        let dir = tempdir().unwrap();
        git2::Repository::init(dir.path()).unwrap();
        let agent = CommandAgent::new(
            "cat > /dev/null; mkdir -p Thesis && echo 'def x := 1' > Thesis/A.lean",
            dir.path(),
            Duration::from_secs(30),
        );
        let report = agent.implement(&request(dir.path())).await.unwrap();
        assert_eq!(report.changed_files, vec![PathBuf::from("Thesis/A.lean")]);
    }
}
