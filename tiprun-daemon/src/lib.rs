//! tiprun daemon runtime: process supervision, update cycles, scheduling.
//!
//! - [`supervisor`]: start / stop / kill the managed process
//! - [`controller`]: one update cycle: check → sync → restart
//! - [`scheduler`]: fixed-delay cycle loop with graceful shutdown
//! - [`run`] / [`start_blocking`]: wire the git-backed components together

pub mod controller;
mod error;
mod runtime;
pub mod scheduler;
pub mod supervisor;

pub use controller::{Controller, ControllerOptions, CyclePhase, ProcessAction, UpdateCycleResult};
pub use error::{DaemonError, SupervisorError};
pub use runtime::{init_tracing, run, start_blocking};
pub use scheduler::{Cycle, Scheduler};
pub use supervisor::{ChildHandle, ChildSupervisor, ProcessState, ProcessSupervisor};
