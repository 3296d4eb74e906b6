//! Fixed-delay cycle loop.
//!
//! The first cycle runs immediately. Each later cycle starts one `interval`
//! after the previous one finished, so cycles never overlap however long they
//! take. A shutdown signal received while a cycle runs is honoured as soon as
//! that cycle returns; the cycle's `shutdown` hook then runs exactly once.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, info_span};

use crate::controller::{ProcessAction, UpdateCycleResult};
use crate::error::DaemonError;

/// One unit of periodic work. Runs on the blocking pool.
pub trait Cycle: Send + 'static {
    fn run_cycle(&mut self) -> Result<UpdateCycleResult, DaemonError>;

    /// Release whatever the cycles acquired. Called once, after the last cycle.
    fn shutdown(&mut self);
}

pub struct Scheduler<C> {
    cycle: C,
    interval: Duration,
}

impl<C: Cycle> Scheduler<C> {
    pub fn new(cycle: C, interval: Duration) -> Self {
        Self { cycle, interval }
    }

    /// Loop until `shutdown_rx` fires (or its sender is dropped), then shut the
    /// cycle down and hand it back.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<C, DaemonError> {
        let Self {
            mut cycle,
            interval,
        } = self;
        let mut number: u64 = 0;

        loop {
            number += 1;
            let (returned, result) = tokio::task::spawn_blocking(move || {
                let _span = info_span!("cycle", number).entered();
                let result = cycle.run_cycle();
                (cycle, result)
            })
            .await
            .map_err(|err| DaemonError::Runtime(format!("update cycle join failure: {err}")))?;
            cycle = returned;
            log_outcome(&result);

            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("shutting down after {number} cycle(s)");
        tokio::task::spawn_blocking(move || {
            cycle.shutdown();
            cycle
        })
        .await
        .map_err(|err| DaemonError::Runtime(format!("shutdown join failure: {err}")))
    }
}

fn log_outcome(result: &Result<UpdateCycleResult, DaemonError>) {
    match result {
        Ok(outcome) if outcome.revision_changed || outcome.process != ProcessAction::Untouched => {
            info!(
                revision = outcome.new_revision.short(),
                changed = outcome.revision_changed,
                process = ?outcome.process,
                "update cycle complete"
            );
        }
        Ok(outcome) => {
            info!(revision = outcome.new_revision.short(), "up to date");
        }
        Err(err) => {
            error!(error = %err, "update cycle failed; retrying next interval");
        }
    }
}
