use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use tiprun_sync::SyncError;

/// Managed-process lifecycle failures.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to start `{program}` in {cwd}: {source}")]
    ProcessStartFailure {
        program: String,
        cwd: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("process {pid} still running {}s after termination request", timeout.as_secs())]
    ProcessStopTimeout { pid: u32, timeout: Duration },

    #[error("failed to signal process {pid}: {detail}")]
    Signal { pid: u32, detail: String },

    #[error("failed to wait for process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Error surface for update cycles and the daemon runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("process error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("daemon runtime error: {0}")]
    Runtime(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
