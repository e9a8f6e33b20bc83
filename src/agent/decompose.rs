//! Decomposer collaborator: proposes sub-tasks for a task that needs a split.
//!
//! ## Expected Format
//!
//! The decomposer prints a JSON object, optionally wrapped in tags:
//!
//! ```text
//! <decomposition>
//! {
//!   "tasks": [
//!     {"id": "B1", "title": "Helper lemma", "artifacts": ["Thesis/B1.lean"]},
//!     {"id": "B2", "title": "Main result", "depends_on": ["B1"]}
//!   ]
//! }
//! </decomposition>
//! ```
//!
//! A bare JSON array of tasks is accepted too. Sub-tasks use the same schema
//! as `tasks.json` entries.

use super::run_shell;
use crate::graph::Task;
use crate::util::extract_json_object;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[async_trait]
pub trait Decomposer: Send + Sync {
    /// Propose sub-tasks for `task`, given why its last attempt failed.
    async fn decompose(&self, task: &Task, diagnostics: &str) -> Result<Vec<Task>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct DecompositionDoc {
    tasks: Vec<Task>,
}

#[derive(Serialize)]
struct DecompositionRequest<'a> {
    task: &'a Task,
    diagnostics: &'a str,
}

/// Parse sub-task definitions from decomposer output.
pub fn parse_decomposition(output: &str) -> Result<Vec<Task>> {
    let start_tag = "<decomposition>";
    let end_tag = "</decomposition>";

    let content = match output.find(start_tag) {
        Some(start) => {
            let content_start = start + start_tag.len();
            let end = output[content_start..]
                .find(end_tag)
                .context("Unterminated <decomposition> block")?;
            &output[content_start..content_start + end]
        }
        None => output,
    };
    let content = content.trim();

    let tasks: Vec<Task> = if content.starts_with('[') {
        serde_json::from_str(content).context("Failed to parse decomposition JSON array")?
    } else {
        let json = extract_json_object(content).context("No decomposition JSON found in output")?;
        serde_json::from_str::<DecompositionDoc>(&json)
            .context("Failed to parse decomposition JSON")?
            .tasks
    };

    if tasks.is_empty() {
        bail!("Decomposition contains no tasks");
    }
    Ok(tasks)
}

/// Runs an external decomposer command.
pub struct CommandDecomposer {
    command: String,
    workspace: PathBuf,
    timeout: Duration,
}

impl CommandDecomposer {
    pub fn new(command: &str, workspace: &Path, timeout: Duration) -> Self {
        Self {
            command: command.to_string(),
            workspace: workspace.to_path_buf(),
            timeout,
        }
    }
}

#[async_trait]
impl Decomposer for CommandDecomposer {
    async fn decompose(&self, task: &Task, diagnostics: &str) -> Result<Vec<Task>> {
        let payload = serde_json::to_string(&DecompositionRequest { task, diagnostics })
            .context("Failed to serialize decomposition request")?;
        let output = run_shell(
            &self.command,
            &self.workspace,
            &payload,
            self.timeout,
            &[("PROOFLOOP_TASK", task.id.as_str())],
        )
        .await?;
        parse_decomposition(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_tagged_output() {
        let output = r#"
            Analysis: the lemma needs a helper.
            <decomposition>
            {"tasks": [
                {"id": "B1", "title": "Helper"},
                {"id": "B2", "title": "Main", "depends_on": ["B1"]}
            ]}
            </decomposition>
        "#;
        let tasks = parse_decomposition(output).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].depends_on, vec!["B1".to_string()]);
    }

    #[test]
    fn test_parse_bare_object_and_array() {
        let tasks = parse_decomposition(r#"{"tasks": [{"id": "X1", "title": "x"}]}"#).unwrap();
        assert_eq!(tasks[0].id, "X1");

        let tasks = parse_decomposition(r#"[{"id": "Y1", "title": "y"}]"#).unwrap();
        assert_eq!(tasks[0].id, "Y1");
    }

    #[test]
    fn test_parse_object_with_braces_in_titles() {
        let tasks = parse_decomposition(
            r#"Splitting on {n}: {"tasks": [{"id": "B1", "title": "Prove the case {n"}]}"#,
        )
        .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Prove the case {n");
    }

    #[test]
    fn test_parse_rejects_empty_and_garbage() {
        assert!(parse_decomposition(r#"{"tasks": []}"#).is_err());
        assert!(parse_decomposition("no json here").is_err());
        assert!(parse_decomposition("<decomposition>{\"tasks\": [").is_err());
    }

    #[tokio::test]
    async fn test_command_decomposer() {
        let dir = tempdir().unwrap();
        let decomposer = CommandDecomposer::new(
            r#"cat > /dev/null; echo '<decomposition>{"tasks": [{"id": "'"$PROOFLOOP_TASK"'1", "title": "part"}]}</decomposition>'"#,
            dir.path(),
            Duration::from_secs(30),
        );
        let tasks = decomposer
            .decompose(&Task::new("B", "B", vec![]), "build failed")
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "B1");
    }
}
