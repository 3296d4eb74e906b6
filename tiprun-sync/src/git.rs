//! Bounded `git` CLI runner.
//!
//! Every invocation gets a deadline. Output pipes are drained on helper
//! threads so a chatty command cannot stall on a full pipe while we poll for
//! exit. On unix git runs in its own process group; on timeout the whole group
//! (git plus transport helpers such as `ssh` or `git-remote-https`) is killed,
//! which closes the pipes and lets the drain threads finish.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{io_err, SyncError};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of one git invocation.
#[derive(Debug)]
pub(crate) struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Git {
    timeout: Duration,
}

impl Git {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// A `git` command that never prompts and ignores any inherited
    /// `GIT_DIR`/`GIT_WORK_TREE`.
    pub fn command(&self, cwd: Option<&Path>) -> Command {
        let mut cmd = Command::new("git");
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE");
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run `cmd` to completion or until the deadline, capturing output.
    pub fn output(&self, operation: &str, mut cmd: Command) -> Result<GitOutput, SyncError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        tracing::debug!("git {operation}: {cmd:?}");
        let mut child = cmd
            .spawn()
            .map_err(|source| SyncError::GitUnavailable { source })?;
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    kill_group(&mut child);
                    let _ = child.wait();
                    tracing::warn!("git {operation} killed after {}s", self.timeout.as_secs());
                    return Err(SyncError::Timeout {
                        operation: operation.to_string(),
                        timeout: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    kill_group(&mut child);
                    return Err(io_err(PathBuf::from("git"), err));
                }
            }
        };

        Ok(GitOutput {
            success: status.success(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }

    /// Like [`Git::output`], but an unsuccessful exit becomes [`SyncError::Git`].
    pub fn run(&self, operation: &str, dir: &Path, cmd: Command) -> Result<GitOutput, SyncError> {
        let output = self.output(operation, cmd)?;
        if !output.success {
            return Err(SyncError::Git {
                operation: operation.to_string(),
                path: dir.to_path_buf(),
                detail: failure_detail(&output),
            });
        }
        Ok(output)
    }
}

/// Trimmed stderr, falling back to stdout for commands that report there.
pub(crate) fn failure_detail(output: &GitOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        output.stdout.trim().to_string()
    } else {
        stderr.to_string()
    }
}

#[cfg(unix)]
fn kill_group(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match i32::try_from(child.id()) {
        Ok(pgid) => {
            if let Err(err) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                tracing::debug!("killpg {pgid} failed: {err}");
                let _ = child.kill();
            }
        }
        Err(_) => {
            let _ = child.kill();
        }
    }
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    let _ = child.kill();
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
