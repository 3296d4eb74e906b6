//! Error types for tiprun-sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use tiprun_core::CoreError;

/// All errors that can arise from revision queries and workspace sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or transport failure talking to the remote (including timeouts).
    #[error("remote {url} is unreachable: {detail}")]
    RemoteUnreachable { url: String, detail: String },

    /// The remote has no `refs/heads/<branch>`.
    #[error("branch '{branch}' not found in {url}")]
    BranchNotFound { branch: String, url: String },

    /// Local modifications could not be set aside before updating.
    #[error("workspace {path} has local changes that could not be stashed: {detail}")]
    WorkspaceDirty { path: PathBuf, detail: String },

    /// A git command exited unsuccessfully (transport or merge failure).
    #[error("git {operation} failed in {path}: {detail}")]
    Git {
        operation: String,
        path: PathBuf,
        detail: String,
    },

    /// A git command exceeded the configured timeout and was killed.
    #[error("git {operation} timed out after {}s", timeout.as_secs())]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    /// The `git` executable could not be started.
    #[error("could not run git: {source}")]
    GitUnavailable {
        #[source]
        source: std::io::Error,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Revision marker persistence failed.
    #[error("revision marker error: {0}")]
    Marker(#[from] CoreError),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
