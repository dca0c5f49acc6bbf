//! Git worktree isolation for agent tasks.
//!
//! Each task gets its own checkout on a `pilot/<task-id>` branch so agents
//! edit concurrently without interfering. The merge path refuses dirty
//! worktrees; conflict resolution stays with the humans.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::util::{run_with_timeout, CommandOutcome};

/// Error type for worktree operations.
#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    #[error("not a git repository: {0}")]
    NotARepo(PathBuf),

    #[error("worktree already exists for {task_id}: {path}")]
    AlreadyExists { task_id: String, path: PathBuf },

    #[error("worktree for {0} has uncommitted changes")]
    Dirty(String),

    #[error("git {verb} failed: {stderr}")]
    GitFailed { verb: String, stderr: String },

    #[error("git {0} timed out")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for worktree operations.
pub type WorktreeResult<T> = Result<T, WorktreeError>;

/// Info about an active worktree.
#[derive(Debug, Clone)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: String,
}

/// Manages per-task git worktrees.
pub struct WorktreeManager {
    base_dir: PathBuf,
    repo_root: PathBuf,
    base_branch: String,
}

impl WorktreeManager {
    /// `base_dir` holds the checkouts; `base_branch` is what merges land on.
    pub fn new(
        base_dir: impl Into<PathBuf>,
        repo_root: impl AsRef<Path>,
        base_branch: &str,
    ) -> WorktreeResult<Self> {
        let repo_root = repo_root.as_ref().to_path_buf();
        let check = git(&repo_root, &["rev-parse", "--git-dir"])?;
        if check.is_none() {
            return Err(WorktreeError::NotARepo(repo_root));
        }

        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            repo_root,
            base_branch: base_branch.to_string(),
        })
    }

    pub fn worktree_path(&self, task_id: &str) -> PathBuf {
        self.base_dir.join(task_id)
    }

    fn branch_name(task_id: &str) -> String {
        format!("pilot/{task_id}")
    }

    /// Create a worktree for the task, branching from the base branch.
    pub fn create(&self, task_id: &str) -> WorktreeResult<PathBuf> {
        let path = self.worktree_path(task_id);
        if path.exists() {
            return Err(WorktreeError::AlreadyExists {
                task_id: task_id.to_string(),
                path,
            });
        }

        let branch = Self::branch_name(task_id);
        let path_str = path.display().to_string();
        git_expect(
            &self.repo_root,
            &[
                "worktree",
                "add",
                "-b",
                &branch,
                &path_str,
                &self.base_branch,
            ],
            "worktree add",
        )?;
        Ok(path)
    }

    /// Whether the task's worktree has no uncommitted changes.
    pub fn is_clean(&self, task_id: &str) -> WorktreeResult<bool> {
        let path = self.worktree_path(task_id);
        if !path.exists() {
            return Ok(true);
        }
        let status = git_expect(&path, &["status", "--porcelain"], "status")?;
        Ok(status.trim().is_empty())
    }

    /// Merge the task branch into the base branch and clean up the worktree
    /// and branch. Dirty worktrees are refused.
    pub fn merge_and_remove(&self, task_id: &str) -> WorktreeResult<()> {
        if !self.is_clean(task_id)? {
            return Err(WorktreeError::Dirty(task_id.to_string()));
        }

        let branch = Self::branch_name(task_id);
        git_expect(
            &self.repo_root,
            &[
                "merge",
                "--no-ff",
                &branch,
                "-m",
                &format!("pilot: merge {task_id}"),
            ],
            "merge",
        )?;

        let path_str = self.worktree_path(task_id).display().to_string();
        if let Err(e) = git_expect(&self.repo_root, &["worktree", "remove", &path_str], "worktree remove") {
            warn!(task_id, error = %e, "worktree remove failed after merge");
        }
        if let Err(e) = git_expect(&self.repo_root, &["branch", "-d", &branch], "branch delete") {
            warn!(task_id, error = %e, "branch delete failed after merge");
        }
        Ok(())
    }

    /// Remove a worktree and branch without merging (abandoned work).
    pub fn discard(&self, task_id: &str) -> WorktreeResult<()> {
        let path_str = self.worktree_path(task_id).display().to_string();
        git_expect(
            &self.repo_root,
            &["worktree", "remove", "--force", &path_str],
            "worktree remove",
        )?;
        let branch = Self::branch_name(task_id);
        if let Err(e) = git_expect(&self.repo_root, &["branch", "-D", &branch], "branch delete") {
            warn!(task_id, error = %e, "branch force-delete failed");
        }
        Ok(())
    }

    /// List active worktrees from `git worktree list --porcelain`.
    pub fn list(&self) -> WorktreeResult<Vec<WorktreeInfo>> {
        let output = git_expect(&self.repo_root, &["worktree", "list", "--porcelain"], "worktree list")?;

        let mut infos = Vec::new();
        let mut current_path: Option<PathBuf> = None;
        let mut current_branch: Option<String> = None;
        for line in output.lines() {
            if let Some(path) = line.strip_prefix("worktree ") {
                if let (Some(path), Some(branch)) = (current_path.take(), current_branch.take()) {
                    infos.push(WorktreeInfo { path, branch });
                }
                current_path = Some(PathBuf::from(path));
            } else if let Some(branch) = line.strip_prefix("branch refs/heads/") {
                current_branch = Some(branch.to_string());
            }
        }
        if let (Some(path), Some(branch)) = (current_path, current_branch) {
            infos.push(WorktreeInfo { path, branch });
        }
        Ok(infos)
    }
}

/// Run git with the standard timeout; `None` on non-zero exit.
fn git(cwd: &Path, args: &[&str]) -> WorktreeResult<Option<String>> {
    match run_with_timeout("git", args, cwd, Duration::from_secs(5))? {
        CommandOutcome::Completed {
            status_code: Some(0),
            stdout,
            ..
        } => Ok(Some(stdout)),
        CommandOutcome::Completed { .. } => Ok(None),
        CommandOutcome::TimedOut => Err(WorktreeError::Timeout(args.join(" "))),
    }
}

/// Run git, treating non-zero exit as an error carrying stderr.
fn git_expect(cwd: &Path, args: &[&str], verb: &str) -> WorktreeResult<String> {
    match run_with_timeout("git", args, cwd, Duration::from_secs(5))? {
        CommandOutcome::Completed {
            status_code: Some(0),
            stdout,
            ..
        } => Ok(stdout),
        CommandOutcome::Completed { stderr, .. } => Err(WorktreeError::GitFailed {
            verb: verb.to_string(),
            stderr: stderr.trim().to_string(),
        }),
        CommandOutcome::TimedOut => Err(WorktreeError::Timeout(verb.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::tempdir;

    fn init_repo(dir: &Path) {
        let run = |args: &[&str]| {
            Command::new("git").args(args).current_dir(dir).output().unwrap();
        };
        run(&["init", "-b", "main"]);
        run(&["config", "user.email", "test@test.invalid"]);
        run(&["config", "user.name", "Test"]);
        std::fs::write(dir.join("README.md"), "hello").unwrap();
        run(&["add", "."]);
        run(&["commit", "-m", "init"]);
    }

    #[test]
    fn test_rejects_non_repo() {
        let repo = tempdir().unwrap();
        let base = tempdir().unwrap();
        let result = WorktreeManager::new(base.path(), repo.path(), "main");
        assert!(matches!(result, Err(WorktreeError::NotARepo(_))));
    }

    #[test]
    fn test_create_list_and_duplicate() {
        let repo = tempdir().unwrap();
        let base = tempdir().unwrap();
        init_repo(repo.path());

        let manager = WorktreeManager::new(base.path(), repo.path(), "main").unwrap();
        let path = manager.create("task-7").unwrap();
        assert!(path.exists());

        let listed = manager.list().unwrap();
        assert!(listed.iter().any(|w| w.branch == "pilot/task-7"));

        assert!(matches!(
            manager.create("task-7"),
            Err(WorktreeError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_merge_refuses_dirty_worktree() {
        let repo = tempdir().unwrap();
        let base = tempdir().unwrap();
        init_repo(repo.path());

        let manager = WorktreeManager::new(base.path(), repo.path(), "main").unwrap();
        let path = manager.create("task-8").unwrap();
        std::fs::write(path.join("scratch.txt"), "uncommitted").unwrap();

        assert!(!manager.is_clean("task-8").unwrap());
        assert!(matches!(
            manager.merge_and_remove("task-8"),
            Err(WorktreeError::Dirty(_))
        ));
    }

    #[test]
    fn test_merge_and_remove_clean_worktree() {
        let repo = tempdir().unwrap();
        let base = tempdir().unwrap();
        init_repo(repo.path());

        let manager = WorktreeManager::new(base.path(), repo.path(), "main").unwrap();
        let path = manager.create("task-9").unwrap();

        // Commit a change inside the worktree.
        std::fs::write(path.join("feature.txt"), "done").unwrap();
        let run = |args: &[&str]| {
            Command::new("git").args(args).current_dir(&path).output().unwrap();
        };
        run(&["add", "."]);
        run(&["commit", "-m", "feature"]);

        manager.merge_and_remove("task-9").unwrap();
        assert!(!path.exists());
        assert!(repo.path().join("feature.txt").exists());
    }
}
