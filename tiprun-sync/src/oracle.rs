//! Revision queries: the locally recorded revision and the remote branch tip.

use std::time::Duration;

use tiprun_core::{marker, RepositoryReference, RevisionId, Workspace};

use crate::error::SyncError;
use crate::git::{failure_detail, Git};

/// Source of truth for "where are we" and "where should we be".
pub trait VersionOracle: Send {
    /// Revision recorded by the last successful sync of `repo.branch`, or
    /// `None` if the workspace was never synchronized to that branch. Never
    /// fails.
    fn local_revision(&self, repo: &RepositoryReference, workspace: &Workspace)
        -> Option<RevisionId>;

    /// Persist `revision` of `repo.branch` as the workspace's synchronized
    /// revision.
    fn record_revision(
        &self,
        repo: &RepositoryReference,
        workspace: &Workspace,
        revision: &RevisionId,
    ) -> Result<(), SyncError>;

    /// Current tip of `refs/heads/<repo.branch>` on the remote.
    fn remote_revision(&self, repo: &RepositoryReference) -> Result<RevisionId, SyncError>;
}

/// [`VersionOracle`] backed by the revision marker file and `git ls-remote`.
#[derive(Debug, Clone)]
pub struct GitOracle {
    git: Git,
}

impl GitOracle {
    pub fn new(timeout: Duration) -> Self {
        Self {
            git: Git::new(timeout),
        }
    }
}

impl VersionOracle for GitOracle {
    fn local_revision(
        &self,
        repo: &RepositoryReference,
        workspace: &Workspace,
    ) -> Option<RevisionId> {
        let record = match marker::load(workspace) {
            Ok(record) => record?,
            Err(err) => {
                tracing::warn!("unreadable revision marker, treating workspace as unsynchronized: {err}");
                return None;
            }
        };
        let revision = record.revision_for(&repo.branch).cloned();
        if revision.is_none() {
            tracing::info!(
                "revision marker belongs to branch {}, now tracking {}",
                record.branch.as_deref().unwrap_or("<unknown>"),
                repo.branch
            );
        }
        revision
    }

    fn record_revision(
        &self,
        repo: &RepositoryReference,
        workspace: &Workspace,
        revision: &RevisionId,
    ) -> Result<(), SyncError> {
        marker::save(workspace, &repo.branch, revision)?;
        tracing::debug!(
            "recorded revision {revision} of {} for {}",
            repo.branch,
            workspace.path().display()
        );
        Ok(())
    }

    fn remote_revision(&self, repo: &RepositoryReference) -> Result<RevisionId, SyncError> {
        let branch_ref = repo.branch_ref();
        let mut cmd = self.git.command(None);
        cmd.args(["ls-remote", "--heads"])
            .arg(&repo.url)
            .arg(&branch_ref);

        let output = match self.git.output("ls-remote", cmd) {
            Ok(output) => output,
            Err(SyncError::Timeout { timeout, .. }) => {
                return Err(SyncError::RemoteUnreachable {
                    url: repo.url.clone(),
                    detail: format!("no answer within {}s", timeout.as_secs()),
                })
            }
            Err(err) => return Err(err),
        };
        if !output.success {
            return Err(SyncError::RemoteUnreachable {
                url: repo.url.clone(),
                detail: failure_detail(&output),
            });
        }

        find_branch_revision(&output.stdout, &branch_ref).ok_or_else(|| {
            SyncError::BranchNotFound {
                branch: repo.branch.clone(),
                url: repo.url.clone(),
            }
        })
    }
}

/// Pick the revision for exactly `branch_ref` out of `ls-remote` output
/// (`<hash>\t<ref>` per line). Suffix or prefix matches never count.
pub(crate) fn find_branch_revision(ls_remote: &str, branch_ref: &str) -> Option<RevisionId> {
    ls_remote.lines().find_map(|line| {
        let (hash, reference) = line.split_once('\t')?;
        (reference.trim_end() == branch_ref && !hash.is_empty())
            .then(|| RevisionId::from(hash.trim()))
    })
}
