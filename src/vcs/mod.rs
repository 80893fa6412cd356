//! VCS adapter (component E): status/branch/commit/reset/clean over an
//! external `git` binary, plus the checkpoint/rollback protocol.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::VcsError;

/// A checkpoint: a captured commit SHA and the label used to create it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub sha: String,
    pub label: String,
}

/// Thin wrapper around the external `git` binary, scoped to one repo root.
pub struct VcsAdapter {
    repo_root: PathBuf,
    preserved_subtree: PathBuf,
}

impl VcsAdapter {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self { repo_root: repo_root.into(), preserved_subtree: PathBuf::from(".orchestrator") }
    }

    pub fn with_preserved_subtree(mut self, subtree: impl Into<PathBuf>) -> Self {
        self.preserved_subtree = subtree.into();
        self
    }

    /// `git status --porcelain` output, possibly empty.
    pub fn status(&self) -> Result<String, VcsError> {
        let output = self.run(&["status", "--porcelain"])?;
        Ok(output)
    }

    pub fn ensure_clean(&self) -> Result<(), VcsError> {
        let status = self.status()?;
        if !status.trim().is_empty() {
            return Err(VcsError::Dirty { status });
        }
        Ok(())
    }

    pub fn current_branch(&self) -> Result<String, VcsError> {
        Ok(self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?.trim().to_string())
    }

    pub fn head_sha(&self) -> Result<String, VcsError> {
        Ok(self.run(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    pub fn ref_exists(&self, branch: &str) -> bool {
        self.run(&["rev-parse", "--verify", branch]).is_ok()
    }

    pub fn create_and_checkout_branch(&self, branch: &str) -> Result<(), VcsError> {
        if self.ref_exists(branch) {
            self.run(&["checkout", branch])?;
        } else {
            self.run(&["checkout", "-b", branch])?;
        }
        Ok(())
    }

    pub fn stage_all(&self) -> Result<(), VcsError> {
        self.run(&["add", "."]).map(|_| ())
    }

    pub fn commit(&self, message: &str) -> Result<(), VcsError> {
        self.run(&["commit", "-m", message]).map(|_| ())
    }

    pub fn diff_to_head(&self) -> Result<String, VcsError> {
        self.run(&["diff", "HEAD"])
    }

    /// Create a checkpoint: commit any pending changes, or reuse the current
    /// `HEAD` if the working tree is already clean.
    pub fn create_checkpoint(&self, label: &str) -> Result<Checkpoint, VcsError> {
        let status = self.status()?;
        if status.trim().is_empty() {
            return Ok(Checkpoint { sha: self.head_sha()?, label: label.to_string() });
        }
        self.stage_all()?;
        self.commit(&format!("Checkpoint: {label}"))?;
        Ok(Checkpoint { sha: self.head_sha()?, label: label.to_string() })
    }

    /// Hard-reset to `reference`, then clean untracked files/dirs excluding
    /// the preserved artifact subtree.
    pub fn rollback_to(&self, reference: &str) -> Result<(), VcsError> {
        self.run(&["reset", "--hard", reference])?;
        let exclude = format!("{}/", self.preserved_subtree.display());
        self.run(&["clean", "-fd", "-e", &exclude])?;
        Ok(())
    }

    fn run(&self, args: &[&str]) -> Result<String, VcsError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .map_err(VcsError::Io)?;

        if !output.status.success() {
            return Err(VcsError::CommandFailed {
                message: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Verify `path` is a git worktree (has a resolvable `--git-dir`).
pub fn ensure_git_repo(path: &Path) -> Result<(), VcsError> {
    let output = Command::new("git")
        .args(["rev-parse", "--git-dir"])
        .current_dir(path)
        .output()
        .map_err(VcsError::Io)?;
    if !output.status.success() {
        return Err(VcsError::NotARepo { path: path.display().to_string() });
    }
    Ok(())
}
