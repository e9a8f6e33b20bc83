//! Prohibited-pattern scan over changed artifacts.

use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Default prohibited pattern: the Lean proof placeholder.
pub const DEFAULT_PROHIBITED_PATTERN: &str = r"\bsorry\b";

/// One line that matched the prohibited pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternHit {
    pub path: PathBuf,
    pub line: usize,
    pub text: String,
}

impl fmt::Display for PatternHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.path.display(), self.line, self.text)
    }
}

/// Scan `artifacts` (relative to `workspace`) for `pattern`.
///
/// Directories are walked recursively; missing paths are ignored.
pub fn scan_artifacts(workspace: &Path, artifacts: &[PathBuf], pattern: &Regex) -> Vec<PatternHit> {
    let mut hits = Vec::new();

    for artifact in artifacts {
        let full = workspace.join(artifact);
        if full.is_dir() {
            for entry in WalkDir::new(&full)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let relative = entry
                    .path()
                    .strip_prefix(workspace)
                    .unwrap_or(entry.path())
                    .to_path_buf();
                scan_file(entry.path(), &relative, pattern, &mut hits);
            }
        } else if full.is_file() {
            scan_file(&full, artifact, pattern, &mut hits);
        }
    }

    hits
}

fn scan_file(path: &Path, display: &Path, pattern: &Regex, hits: &mut Vec<PatternHit>) {
    let Ok(bytes) = std::fs::read(path) else {
        return;
    };
    let content = String::from_utf8_lossy(&bytes);
    for (i, line) in content.lines().enumerate() {
        if pattern.is_match(line) {
            hits.push(PatternHit {
                path: display.to_path_buf(),
                line: i + 1,
                text: line.trim().to_string(),
            });
        }
    }
}
