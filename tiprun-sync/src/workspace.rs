//! Workspace synchronization: clone on first use, checkout + pull afterwards.
//!
//! ## Local modifications
//!
//! Uncommitted modifications to tracked files are always stashed before a
//! branch switch or pull, on every path that touches an existing copy. The
//! stash is never re-applied; it stays in `git stash list` for the operator.
//! Only a failing stash raises [`SyncError::WorkspaceDirty`].
//!
//! Untracked files are never touched: the managed process may keep data,
//! uploads or local settings in the workspace. An untracked file that collides
//! with an incoming one makes the pull fail, which surfaces as
//! [`SyncError::Git`].
//!
//! ## Failed clones
//!
//! A clone that fails removes whatever it created: the directory itself when
//! it did not exist before, or its contents when it was an empty directory.
//! A non-empty directory without a local copy is refused up front and never
//! touched.

use std::path::Path;
use std::time::Duration;

use tiprun_core::{RepositoryReference, Workspace};

use crate::error::{io_err, SyncError};
use crate::git::Git;

/// Identity used for autostash entries, so stashing works on hosts without a
/// configured git user.
const STASH_IDENTITY: [&str; 4] = [
    "-c",
    "user.name=tiprun",
    "-c",
    "user.email=tiprun@localhost",
];

/// What [`Synchronizer::ensure_workspace`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The workspace had no local copy; the branch was cloned into it.
    Cloned,
    /// An existing copy was switched to the branch (if needed) and pulled.
    Updated,
}

/// Brings a workspace to the tip of the tracked branch.
pub trait Synchronizer: Send {
    fn ensure_workspace(
        &self,
        repo: &RepositoryReference,
        workspace: &Workspace,
    ) -> Result<SyncOutcome, SyncError>;
}

/// [`Synchronizer`] backed by the `git` CLI.
#[derive(Debug, Clone)]
pub struct GitSynchronizer {
    git: Git,
}

impl GitSynchronizer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            git: Git::new(timeout),
        }
    }

    fn clone_fresh(&self, repo: &RepositoryReference, dir: &Path) -> Result<(), SyncError> {
        let existed = dir.exists();
        if existed && !is_empty_dir(dir)? {
            return Err(SyncError::Git {
                operation: "clone".to_string(),
                path: dir.to_path_buf(),
                detail: "destination exists, is not empty, and holds no local copy".to_string(),
            });
        }

        let mut cmd = self.git.command(None);
        cmd.args(["clone", "--branch", repo.branch.as_str(), "--single-branch", "--"])
            .arg(&repo.url)
            .arg(dir);

        if let Err(err) = self.git.run("clone", dir, cmd) {
            discard_partial_clone(dir, existed);
            return Err(err);
        }
        tracing::info!("cloned {} ({}) into {}", repo.url, repo.branch, dir.display());
        Ok(())
    }

    fn update_existing(&self, repo: &RepositoryReference, dir: &Path) -> Result<(), SyncError> {
        self.set_aside_local_changes(dir)?;

        let branch = repo.branch.as_str();
        if self.current_branch(dir)?.as_deref() != Some(branch) {
            self.switch_branch(dir, branch)?;
        }

        let mut cmd = self.git.command(Some(dir));
        cmd.args(["pull", "--ff-only", "origin", branch]);
        self.git.run("pull", dir, cmd)?;
        tracing::info!("pulled {branch} into {}", dir.display());
        Ok(())
    }

    fn set_aside_local_changes(&self, dir: &Path) -> Result<(), SyncError> {
        let mut cmd = self.git.command(Some(dir));
        cmd.args(["status", "--porcelain", "--untracked-files=no"]);
        let status = self.git.run("status", dir, cmd)?;
        if status.stdout.trim().is_empty() {
            return Ok(());
        }

        tracing::warn!(
            "workspace {} has local changes; stashing them before update",
            dir.display()
        );
        let mut cmd = self.git.command(Some(dir));
        cmd.args(STASH_IDENTITY).args([
            "stash",
            "push",
            "-m",
            "tiprun: local changes set aside before update",
        ]);
        self.git
            .run("stash", dir, cmd)
            .map_err(|err| SyncError::WorkspaceDirty {
                path: dir.to_path_buf(),
                detail: err.to_string(),
            })?;
        Ok(())
    }

    /// Checked-out branch name, or `None` on a detached HEAD.
    fn current_branch(&self, dir: &Path) -> Result<Option<String>, SyncError> {
        let mut cmd = self.git.command(Some(dir));
        cmd.args(["rev-parse", "--abbrev-ref", "HEAD"]);
        let output = self.git.run("rev-parse", dir, cmd)?;
        let name = output.stdout.trim();
        Ok((name != "HEAD" && !name.is_empty()).then(|| name.to_string()))
    }

    fn switch_branch(&self, dir: &Path, branch: &str) -> Result<(), SyncError> {
        // Single-branch clones only track their original branch, so fetch the
        // target explicitly before switching to it.
        let refspec = format!("+refs/heads/{branch}:refs/remotes/origin/{branch}");
        let mut cmd = self.git.command(Some(dir));
        cmd.args(["fetch", "origin", refspec.as_str()]);
        self.git.run("fetch", dir, cmd)?;

        let local_ref = format!("refs/heads/{branch}");
        let mut probe = self.git.command(Some(dir));
        probe.args(["rev-parse", "--verify", "--quiet", local_ref.as_str()]);
        let has_local_branch = self.git.output("rev-parse", probe)?.success;

        let mut cmd = self.git.command(Some(dir));
        if has_local_branch {
            cmd.args(["checkout", branch]);
        } else {
            let upstream = format!("origin/{branch}");
            cmd.args(["checkout", "--track", "-b", branch, upstream.as_str()]);
        }
        self.git.run("checkout", dir, cmd)?;
        tracing::info!("switched {} to branch {branch}", dir.display());
        Ok(())
    }
}

impl Synchronizer for GitSynchronizer {
    fn ensure_workspace(
        &self,
        repo: &RepositoryReference,
        workspace: &Workspace,
    ) -> Result<SyncOutcome, SyncError> {
        if workspace.has_local_copy() {
            self.update_existing(repo, workspace.path())?;
            Ok(SyncOutcome::Updated)
        } else {
            self.clone_fresh(repo, workspace.path())?;
            Ok(SyncOutcome::Cloned)
        }
    }
}

fn is_empty_dir(dir: &Path) -> Result<bool, SyncError> {
    let mut entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    Ok(entries.next().is_none())
}

fn discard_partial_clone(dir: &Path, existed: bool) {
    let result = if existed {
        std::fs::read_dir(dir).and_then(|entries| {
            for entry in entries {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type()?.is_dir() {
                    std::fs::remove_dir_all(&path)?;
                } else {
                    std::fs::remove_file(&path)?;
                }
            }
            Ok(())
        })
    } else if dir.exists() {
        std::fs::remove_dir_all(dir)
    } else {
        Ok(())
    };
    if let Err(err) = result {
        tracing::warn!("could not clean up failed clone at {}: {err}", dir.display());
    }
}
