//! Scaffolding collaborator: creates file stubs for a task before the agent
//! starts on it.
//!
//! The template scaffolder writes a stub for every declared artifact that does
//! not exist yet, picking the template by file extension, and a stub for every
//! declared test file importing the task's first artifact. Existing files are
//! never touched.
//!
//! Template placeholders: `{id}`, `{title}`, `{kind}`, `{module}` (artifact
//! path without extension, `/` replaced by `.`) and `{namespace}` (first
//! component of the module).

use crate::graph::{Task, is_glob_pattern};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_LEAN_TEMPLATE: &str = "/-!
# {title}

Task `{id}` ({kind}).
-/
import Mathlib

namespace {namespace}

end {namespace}
";

pub const DEFAULT_TEST_TEMPLATE: &str = "import {module}
";

#[async_trait]
pub trait Scaffolder: Send + Sync {
    /// Create stubs for `task` inside `workspace`. Returns the created files.
    async fn scaffold(&self, task: &Task, workspace: &Path) -> Result<Vec<PathBuf>>;
}

/// Scaffolder used when scaffolding is disabled.
pub struct NoopScaffolder;

#[async_trait]
impl Scaffolder for NoopScaffolder {
    async fn scaffold(&self, _task: &Task, _workspace: &Path) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

/// Writes templated stubs for missing artifacts and tests.
pub struct TemplateScaffolder {
    /// Templates keyed by file extension (without the dot)
    templates: HashMap<String, String>,
    test_template: String,
}

impl Default for TemplateScaffolder {
    fn default() -> Self {
        Self::new(
            HashMap::from([("lean".to_string(), DEFAULT_LEAN_TEMPLATE.to_string())]),
            DEFAULT_TEST_TEMPLATE.to_string(),
        )
    }
}

impl TemplateScaffolder {
    pub fn new(templates: HashMap<String, String>, test_template: String) -> Self {
        Self {
            templates,
            test_template,
        }
    }

    /// Create the stubs synchronously.
    pub fn create_stubs(&self, task: &Task, workspace: &Path) -> Result<Vec<PathBuf>> {
        let mut created = Vec::new();
        let concrete = |p: &&PathBuf| !is_glob_pattern(&p.to_string_lossy());

        for artifact in task.artifacts.iter().filter(concrete) {
            let Some(template) = artifact
                .extension()
                .and_then(|ext| self.templates.get(&*ext.to_string_lossy()))
            else {
                debug!(task = %task.id, artifact = %artifact.display(), "No template for artifact");
                continue;
            };
            if write_stub(workspace, artifact, &render(template, task, artifact))? {
                created.push(artifact.clone());
            }
        }

        if let Some(main) = task.artifacts.iter().find(concrete) {
            for test in task.tests.iter().filter(concrete) {
                if write_stub(workspace, test, &render(&self.test_template, task, main))? {
                    created.push(test.clone());
                }
            }
        }

        if !created.is_empty() {
            info!(task = %task.id, files = created.len(), "Scaffolded stubs");
        }
        Ok(created)
    }
}

#[async_trait]
impl Scaffolder for TemplateScaffolder {
    async fn scaffold(&self, task: &Task, workspace: &Path) -> Result<Vec<PathBuf>> {
        self.create_stubs(task, workspace)
    }
}

/// Dotted module name for a workspace-relative path: `Thesis/Basic.lean` -> `Thesis.Basic`.
pub fn module_name(path: &Path) -> String {
    path.with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(".")
}

fn render(template: &str, task: &Task, artifact: &Path) -> String {
    let module = module_name(artifact);
    let namespace = module.split('.').next().unwrap_or_default().to_string();
    template
        .replace("{id}", &task.id)
        .replace("{title}", &task.title)
        .replace("{kind}", &task.kind)
        .replace("{module}", &module)
        .replace("{namespace}", &namespace)
}

/// Write `content` to `workspace/relative` unless the file exists.
fn write_stub(workspace: &Path, relative: &Path, content: &str) -> Result<bool> {
    let path = workspace.join(relative);
    if path.exists() {
        debug!("{} already exists", path.display());
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, content).with_context(|| format!("Failed to write stub: {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn task() -> Task {
        Task::new("A", "Basic definitions", vec![])
            .with_kind("definition")
            .with_artifacts(vec![PathBuf::from("Thesis/Basic.lean")])
            .with_tests(vec![PathBuf::from("tests/BasicTest.lean")])
    }

    #[test]
    fn test_module_name() {
        assert_eq!(module_name(Path::new("Thesis/Graph/Basic.lean")), "Thesis.Graph.Basic");
        assert_eq!(module_name(Path::new("Main.lean")), "Main");
    }

    #[test]
    fn test_creates_artifact_and_test_stubs() {
        let dir = tempdir().unwrap();
        let created = TemplateScaffolder::default()
            .create_stubs(&task(), dir.path())
            .unwrap();
        assert_eq!(
            created,
            vec![
                PathBuf::from("Thesis/Basic.lean"),
                PathBuf::from("tests/BasicTest.lean")
            ]
        );

        let lean = fs::read_to_string(dir.path().join("Thesis/Basic.lean")).unwrap();
        assert!(lean.contains("# Basic definitions"));
        assert!(lean.contains("import Mathlib"));
        assert!(lean.contains("namespace Thesis"));
        assert!(lean.contains("end Thesis"));
        assert!(!lean.contains("sorry"));

        let test = fs::read_to_string(dir.path().join("tests/BasicTest.lean")).unwrap();
        assert_eq!(test, "import Thesis.Basic\n");
    }

    #[test]
    fn test_existing_files_are_untouched() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Thesis")).unwrap();
        fs::write(dir.path().join("Thesis/Basic.lean"), "-- mine\n").unwrap();

        let created = TemplateScaffolder::default()
            .create_stubs(&task(), dir.path())
            .unwrap();
        assert_eq!(created, vec![PathBuf::from("tests/BasicTest.lean")]);
        assert_eq!(
            fs::read_to_string(dir.path().join("Thesis/Basic.lean")).unwrap(),
            "-- mine\n"
        );
    }

    #[test]
    fn test_skips_globs_and_unknown_extensions() {
        let dir = tempdir().unwrap();
        let task = Task::new("B", "B", vec![]).with_artifacts(vec![
            PathBuf::from("Thesis/*.lean"),
            PathBuf::from("notes.md"),
        ]);
        let created = TemplateScaffolder::default()
            .create_stubs(&task, dir.path())
            .unwrap();
        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn test_custom_template_via_trait() {
        let dir = tempdir().unwrap();
        let scaffolder = TemplateScaffolder::new(
            HashMap::from([("md".to_string(), "# {title} ({id})\n".to_string())]),
            DEFAULT_TEST_TEMPLATE.to_string(),
        );
        let task = Task::new("N", "Notes", vec![]).with_artifacts(vec![PathBuf::from("notes.md")]);
        scaffolder.scaffold(&task, dir.path()).await.unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("notes.md")).unwrap(),
            "# Notes (N)\n"
        );
    }
}
