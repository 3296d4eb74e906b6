//! Managed process supervision.
//!
//! [`ChildSupervisor`] launches the managed command in its own process group
//! (unix) with inherited stdio. Stopping sends SIGTERM to the whole group and
//! waits up to a deadline; killing sends SIGKILL and reaps.
//!
//! A [`ChildHandle`] owns the OS child. Dropping a handle whose process has
//! not been stopped force-kills and reaps it, so every exit path (including a
//! panic mid-cycle) releases the process. [`ProcessSupervisor::abandon`] is
//! the one deliberate way to let a process outlive its handle.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use tiprun_core::ManagedCommand;

use crate::error::SupervisorError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lifecycle state of a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Termination requested, exit not yet observed.
    Stopping,
    Stopped,
}

/// Starts, stops and force-terminates the managed process.
pub trait ProcessSupervisor: Send {
    type Handle: Send + 'static;

    /// Launch `command` with `cwd` as working directory.
    fn start(&self, command: &ManagedCommand, cwd: &Path)
        -> Result<Self::Handle, SupervisorError>;

    /// Non-blocking liveness check. Observing an exit moves the handle to
    /// [`ProcessState::Stopped`].
    fn is_running(&self, handle: &mut Self::Handle) -> bool;

    /// Request graceful termination and wait up to `timeout`.
    ///
    /// A no-op on a handle that is already stopped. On
    /// [`SupervisorError::ProcessStopTimeout`] the process may still be alive;
    /// the caller follows up with [`kill`](Self::kill) or
    /// [`abandon`](Self::abandon).
    fn stop(&self, handle: &mut Self::Handle, timeout: Duration) -> Result<(), SupervisorError>;

    /// Force-terminate and reap. A no-op on a stopped handle.
    fn kill(&self, handle: &mut Self::Handle) -> Result<(), SupervisorError>;

    /// Release the handle without terminating the process.
    fn abandon(&self, handle: &mut Self::Handle);
}

// ---------------------------------------------------------------------------
// ChildHandle
// ---------------------------------------------------------------------------

/// Runtime handle of one managed process instance.
#[derive(Debug)]
pub struct ChildHandle {
    child: Child,
    pid: u32,
    state: ProcessState,
    command: ManagedCommand,
    cwd: PathBuf,
}

impl ChildHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn command(&self) -> &ManagedCommand {
        &self.command
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Collect the exit status if the process has exited. Returns `true` once
    /// the process is known to be gone.
    fn reap(&mut self) -> Result<bool, SupervisorError> {
        if self.state == ProcessState::Stopped {
            return Ok(true);
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.state = ProcessState::Stopped;
                info!(pid = self.pid, %status, "managed process exited");
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(source) => Err(SupervisorError::Wait {
                pid: self.pid,
                source,
            }),
        }
    }

    fn force_kill(&mut self) -> Result<(), SupervisorError> {
        if self.reap()? {
            return Ok(());
        }
        signal_kill(&mut self.child, self.pid)?;
        let status = self.child.wait().map_err(|source| SupervisorError::Wait {
            pid: self.pid,
            source,
        })?;
        self.state = ProcessState::Stopped;
        info!(pid = self.pid, %status, "managed process killed");
        Ok(())
    }
}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        if self.state == ProcessState::Stopped {
            return;
        }
        warn!(pid = self.pid, "managed process handle released while running; killing");
        if let Err(err) = self.force_kill() {
            warn!(pid = self.pid, error = %err, "failed to kill managed process on release");
        }
    }
}

// ---------------------------------------------------------------------------
// ChildSupervisor
// ---------------------------------------------------------------------------

/// [`ProcessSupervisor`] for real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildSupervisor;

impl ProcessSupervisor for ChildSupervisor {
    type Handle = ChildHandle;

    fn start(&self, command: &ManagedCommand, cwd: &Path) -> Result<ChildHandle, SupervisorError> {
        let mut cmd = Command::new(command.program());
        cmd.args(command.args())
            .current_dir(cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd
            .spawn()
            .map_err(|source| SupervisorError::ProcessStartFailure {
                program: command.program().to_string(),
                cwd: cwd.to_path_buf(),
                source,
            })?;
        let pid = child.id();
        info!(pid, command = %command, cwd = %cwd.display(), "managed process started");

        Ok(ChildHandle {
            child,
            pid,
            state: ProcessState::Running,
            command: command.clone(),
            cwd: cwd.to_path_buf(),
        })
    }

    fn is_running(&self, handle: &mut ChildHandle) -> bool {
        match handle.reap() {
            Ok(gone) => !gone,
            Err(err) => {
                warn!(pid = handle.pid, error = %err, "could not poll managed process");
                handle.state != ProcessState::Stopped
            }
        }
    }

    fn stop(&self, handle: &mut ChildHandle, timeout: Duration) -> Result<(), SupervisorError> {
        if handle.reap()? {
            debug!(pid = handle.pid, "stop requested for process that already exited");
            return Ok(());
        }

        if handle.state == ProcessState::Running {
            info!(pid = handle.pid, timeout_secs = timeout.as_secs(), "stopping managed process");
            signal_terminate(&mut handle.child, handle.pid)?;
            handle.state = ProcessState::Stopping;
        }

        let deadline = Instant::now() + timeout;
        loop {
            if handle.reap()? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SupervisorError::ProcessStopTimeout {
                    pid: handle.pid,
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn kill(&self, handle: &mut ChildHandle) -> Result<(), SupervisorError> {
        handle.force_kill()
    }

    /// The orphan stays our child until it exits, so a detached thread waits
    /// for it; otherwise it would linger as a zombie until tiprun exits.
    fn abandon(&self, handle: &mut ChildHandle) {
        if handle.state != ProcessState::Stopped {
            warn!(pid = handle.pid, "leaving managed process running as an orphan");
            handle.state = ProcessState::Stopped;
            reap_in_background(handle.pid);
        }
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> Result<(), SupervisorError> {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| SupervisorError::Signal {
        pid,
        detail: "pid out of range".to_string(),
    })?;
    match killpg(Pid::from_raw(raw), signal) {
        // The group is already gone; the leader only awaits reaping.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(SupervisorError::Signal {
            pid,
            detail: err.to_string(),
        }),
    }
}

#[cfg(unix)]
fn signal_terminate(_child: &mut Child, pid: u32) -> Result<(), SupervisorError> {
    signal_group(pid, nix::sys::signal::Signal::SIGTERM)
}

#[cfg(unix)]
fn signal_kill(_child: &mut Child, pid: u32) -> Result<(), SupervisorError> {
    signal_group(pid, nix::sys::signal::Signal::SIGKILL)
}

#[cfg(unix)]
fn reap_in_background(pid: u32) {
    use nix::sys::wait::waitpid;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    let spawned = thread::Builder::new()
        .name(format!("reap-{pid}"))
        .spawn(move || match waitpid(Pid::from_raw(raw), None) {
            Ok(status) => info!(pid, ?status, "orphaned managed process exited"),
            Err(err) => debug!(pid, error = %err, "could not reap orphaned process"),
        });
    if let Err(err) = spawned {
        warn!(pid, error = %err, "could not spawn reaper; orphan will remain a zombie after exit");
    }
}

#[cfg(not(unix))]
fn reap_in_background(_pid: u32) {}

// No graceful request exists without unix signals; both map to a hard kill.
#[cfg(not(unix))]
fn signal_terminate(child: &mut Child, pid: u32) -> Result<(), SupervisorError> {
    signal_kill(child, pid)
}

#[cfg(not(unix))]
fn signal_kill(child: &mut Child, pid: u32) -> Result<(), SupervisorError> {
    match child.kill() {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
        Err(err) => Err(SupervisorError::Signal {
            pid,
            detail: err.to_string(),
        }),
    }
}
