//! Working-tree change detection and HEAD lookup through `git2`.

use anyhow::{Context, Result};
use git2::{Repository, Status, StatusOptions};
use std::path::{Path, PathBuf};

/// Directory whose contents never count as task artifacts.
const STATE_DIR: &str = ".proofloop";

pub struct GitTracker {
    repo: Repository,
}

impl GitTracker {
    pub fn new(project_dir: &Path) -> Result<Self> {
        let repo = Repository::open(project_dir).context("Failed to open git repository")?;
        Ok(Self { repo })
    }

    /// Files that are new or modified in the working tree or index, relative to
    /// the repository root. Deleted files and proofloop state are excluded.
    pub fn changed_paths(&self) -> Result<Vec<PathBuf>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .context("Failed to read git status")?;

        let changed = Status::WT_NEW
            | Status::WT_MODIFIED
            | Status::WT_RENAMED
            | Status::WT_TYPECHANGE
            | Status::INDEX_NEW
            | Status::INDEX_MODIFIED
            | Status::INDEX_RENAMED
            | Status::INDEX_TYPECHANGE;

        let mut paths: Vec<PathBuf> = statuses
            .iter()
            .filter(|entry| entry.status().intersects(changed))
            .filter(|entry| !entry.status().intersects(Status::WT_DELETED | Status::INDEX_DELETED))
            .filter_map(|entry| entry.path().map(PathBuf::from))
            .filter(|path| !path.starts_with(STATE_DIR))
            .collect();

        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    /// Get the HEAD commit SHA, or None for an unborn branch
    pub fn head_sha(&self) -> Option<String> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .map(|commit| commit.id().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn setup_repo() -> (GitTracker, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        drop(config);
        let tracker = GitTracker::new(dir.path()).unwrap();
        (tracker, dir)
    }

    fn commit_file(dir: &Path, name: &str, content: &str, msg: &str) {
        let repo = Repository::open(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        if let Ok(head) = repo.head() {
            let parent = head.peel_to_commit().unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[&parent])
                .unwrap();
        } else {
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[])
                .unwrap();
        }
    }

    #[test]
    fn test_open_non_repo_fails() {
        let dir = tempdir().unwrap();
        assert!(GitTracker::new(dir.path()).is_err());
    }

    #[test]
    fn test_head_sha_unborn_then_populated() {
        let (tracker, dir) = setup_repo();
        assert!(tracker.head_sha().is_none());
        commit_file(dir.path(), "a.txt", "hello", "init");
        assert_eq!(tracker.head_sha().unwrap().len(), 40);
    }

    #[test]
    fn test_changed_paths_detects_untracked_in_subdirs() {
        let (tracker, dir) = setup_repo();
        fs::create_dir_all(dir.path().join("Thesis")).unwrap();
        fs::write(dir.path().join("Thesis/A.lean"), "import Mathlib\n").unwrap();

        let paths = tracker.changed_paths().unwrap();
        assert_eq!(paths, vec![PathBuf::from("Thesis/A.lean")]);
    }

    #[test]
    fn test_changed_paths_detects_modified_and_skips_clean() {
        let (tracker, dir) = setup_repo();
        commit_file(dir.path(), "stable.lean", "rfl\n", "init");
        commit_file(dir.path(), "edited.lean", "v1\n", "second");
        fs::write(dir.path().join("edited.lean"), "v2\n").unwrap();

        let paths = tracker.changed_paths().unwrap();
        assert_eq!(paths, vec![PathBuf::from("edited.lean")]);
    }

    #[test]
    fn test_changed_paths_ignores_state_dir_and_deletions() {
        let (tracker, dir) = setup_repo();
        commit_file(dir.path(), "gone.lean", "x\n", "init");
        fs::remove_file(dir.path().join("gone.lean")).unwrap();
        fs::create_dir_all(dir.path().join(".proofloop")).unwrap();
        fs::write(dir.path().join(".proofloop/ledger.json"), "{}").unwrap();

        assert!(tracker.changed_paths().unwrap().is_empty());
    }
}
