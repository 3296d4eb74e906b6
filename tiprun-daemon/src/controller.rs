//! Update cycle state machine.
//!
//! ```text
//! Idle → Checking → (Synchronizing)? → (Restarting)? → Idle
//! ```
//!
//! One cycle:
//! 1. read the recorded and remote revisions;
//! 2. if they differ, sync the workspace and, only after the sync succeeded,
//!    record the remote revision;
//! 3. if a process is running and the revision changed, restart it when
//!    restarts are authorized;
//! 4. if no process is running, start one regardless of authorization.
//!
//! Any failure before step 3 leaves the marker untouched and never stops a
//! running process; the next cycle compares revisions from scratch. When only
//! the remote query fails and the workspace was synced before, step 4 still
//! runs so a process that exited is replaced.

use std::time::Duration;

use tracing::{error, info, warn};

use tiprun_core::{
    ManagedCommand, OnStopTimeout, RepositoryReference, RevisionId, Settings, Workspace,
};
use tiprun_sync::{SyncOutcome, Synchronizer, VersionOracle};

use crate::error::{DaemonError, SupervisorError};
use crate::scheduler::Cycle;
use crate::supervisor::ProcessSupervisor;

/// Where the controller is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Checking,
    Synchronizing,
    Restarting,
}

/// What a cycle did to the managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessAction {
    Untouched,
    /// No process was running; one was started.
    Started,
    /// The running process was stopped and a new one started.
    Restarted,
}

/// Summary of one successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCycleResult {
    pub revision_changed: bool,
    pub new_revision: RevisionId,
    pub sync: Option<SyncOutcome>,
    pub process: ProcessAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub restart_on_update: bool,
    pub stop_timeout: Duration,
    pub on_stop_timeout: OnStopTimeout,
}

impl ControllerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            restart_on_update: settings.restart_on_update,
            stop_timeout: settings.stop_timeout,
            on_stop_timeout: settings.on_stop_timeout,
        }
    }
}

/// Sole owner of the cross-cycle state: the workspace and the managed process.
pub struct Controller<O, S, P: ProcessSupervisor> {
    repo: RepositoryReference,
    workspace: Workspace,
    command: ManagedCommand,
    options: ControllerOptions,
    oracle: O,
    synchronizer: S,
    supervisor: P,
    process: Option<P::Handle>,
    phase: CyclePhase,
}

impl<O, S, P> Controller<O, S, P>
where
    O: VersionOracle,
    S: Synchronizer,
    P: ProcessSupervisor,
{
    pub fn new(
        repo: RepositoryReference,
        workspace: Workspace,
        command: ManagedCommand,
        options: ControllerOptions,
        oracle: O,
        synchronizer: S,
        supervisor: P,
    ) -> Self {
        Self {
            repo,
            workspace,
            command,
            options,
            oracle,
            synchronizer,
            supervisor,
            process: None,
            phase: CyclePhase::Idle,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Handle of the current managed process, if one was started.
    pub fn process(&self) -> Option<&P::Handle> {
        self.process.as_ref()
    }

    /// Run one full cycle. Always returns to [`CyclePhase::Idle`].
    pub fn run_cycle(&mut self) -> Result<UpdateCycleResult, DaemonError> {
        let result = self.cycle();
        self.phase = CyclePhase::Idle;
        result
    }

    /// Stop the managed process (bounded) and drop it.
    pub fn shutdown(&mut self) {
        if self.process.is_none() {
            info!("no managed process to stop");
            return;
        }
        info!("stopping managed process for shutdown");
        self.stop_current();
    }

    fn cycle(&mut self) -> Result<UpdateCycleResult, DaemonError> {
        self.phase = CyclePhase::Checking;
        let local = self.oracle.local_revision(&self.repo, &self.workspace);
        let remote = match self.oracle.remote_revision(&self.repo) {
            Ok(remote) => remote,
            Err(err) => {
                // A recorded revision means the workspace holds a synced copy.
                if local.is_some() {
                    self.keep_alive();
                }
                return Err(err.into());
            }
        };
        let revision_changed = local.as_ref() != Some(&remote);

        let sync = if revision_changed {
            self.phase = CyclePhase::Synchronizing;
            info!(
                from = local.as_ref().map_or("<none>", |r| r.short()),
                to = remote.short(),
                branch = %self.repo.branch,
                "new revision detected"
            );
            let outcome = self
                .synchronizer
                .ensure_workspace(&self.repo, &self.workspace)?;
            self.oracle.record_revision(&self.repo, &self.workspace, &remote)?;
            info!(revision = remote.short(), ?outcome, "workspace synchronized");
            Some(outcome)
        } else {
            None
        };

        let process = if self.process_running() {
            if revision_changed && self.options.restart_on_update {
                self.phase = CyclePhase::Restarting;
                self.stop_current();
                self.start_process()?;
                ProcessAction::Restarted
            } else {
                if revision_changed {
                    info!("restart on update disallowed; running process left untouched");
                }
                ProcessAction::Untouched
            }
        } else {
            self.start_process()?;
            ProcessAction::Started
        };

        Ok(UpdateCycleResult {
            revision_changed,
            new_revision: remote,
            sync,
            process,
        })
    }

    /// Whether a managed process is alive. Forgets a handle whose process has
    /// exited on its own.
    fn process_running(&mut self) -> bool {
        let Some(handle) = self.process.as_mut() else {
            return false;
        };
        if self.supervisor.is_running(handle) {
            return true;
        }
        warn!("managed process is no longer running");
        self.process = None;
        false
    }

    /// Replace a managed process that exited, without touching the workspace.
    /// Used when the remote cannot be queried; start failures are only logged
    /// so the remote error stays the cycle's result.
    fn keep_alive(&mut self) {
        if self.process_running() {
            return;
        }
        info!("remote unavailable; starting managed process from the synced workspace");
        if let Err(err) = self.start_process() {
            error!(error = %err, "failed to start managed process");
        }
    }

    fn start_process(&mut self) -> Result<(), DaemonError> {
        let handle = self.supervisor.start(&self.command, self.workspace.path())?;
        self.process = Some(handle);
        Ok(())
    }

    /// Stop and release the current process. Never fails: a stop that times
    /// out is escalated per [`OnStopTimeout`], anything else is forced.
    fn stop_current(&mut self) {
        let Some(mut handle) = self.process.take() else {
            return;
        };
        match self.supervisor.stop(&mut handle, self.options.stop_timeout) {
            Ok(()) => {}
            Err(err @ SupervisorError::ProcessStopTimeout { .. }) => match self.options.on_stop_timeout {
                OnStopTimeout::Kill => {
                    warn!(error = %err, "escalating to forced kill");
                    self.force_kill(&mut handle);
                }
                OnStopTimeout::Orphan => {
                    warn!(error = %err, "stop timed out; orphaning process");
                    self.supervisor.abandon(&mut handle);
                }
            },
            Err(err) => {
                warn!(error = %err, "graceful stop failed; forcing kill");
                self.force_kill(&mut handle);
            }
        }
    }

    fn force_kill(&self, handle: &mut P::Handle) {
        if let Err(err) = self.supervisor.kill(handle) {
            error!(error = %err, "failed to kill managed process");
        }
    }
}

impl<O, S, P> Cycle for Controller<O, S, P>
where
    O: VersionOracle + 'static,
    S: Synchronizer + 'static,
    P: ProcessSupervisor + 'static,
{
    fn run_cycle(&mut self) -> Result<UpdateCycleResult, DaemonError> {
        Controller::run_cycle(self)
    }

    fn shutdown(&mut self) {
        Controller::shutdown(self);
    }
}
