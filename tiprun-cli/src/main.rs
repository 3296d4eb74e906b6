//! tiprun: run a command from the tip of a git branch, restarting it on updates.
//!
//! # Usage
//!
//! ```text
//! tiprun -p <dir> -c <command> -g <url> [-b <branch>] [-m <minutes>]
//!        [--disallow-restart-on-update] [--config <file>]
//!        [--stop-timeout-secs N] [--git-timeout-secs N]
//!        [--on-stop-timeout kill|orphan] [--log-format text|json]
//! ```

mod args;

use anyhow::{Context, Result};
use clap::Parser;

use args::Cli;

fn main() -> Result<()> {
    let settings = Cli::parse().into_settings()?;
    tiprun_daemon::start_blocking(settings).context("tiprun stopped with an error")
}
