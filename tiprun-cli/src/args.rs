//! Command-line surface. Every flag is optional at parse time so a `--config`
//! file can supply it; required settings are enforced after the merge.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tiprun_core::config::CommandSpec;
use tiprun_core::{LogFormat, OnStopTimeout, Settings, UpdaterConfig};

#[derive(Parser, Debug)]
#[command(
    name = "tiprun",
    version,
    about = "Keep a process running on the tip of a git branch",
    long_about = "Periodically checks a remote git branch, syncs a local workspace to its \
                  tip when it moves, and restarts the managed command on every update.",
)]
pub struct Cli {
    /// Workspace directory holding the local copy (required).
    #[arg(short = 'p', long, value_name = "DIR")]
    pub path: Option<PathBuf>,

    /// Command line to run inside the workspace (required).
    #[arg(short = 'c', long, value_name = "COMMAND", allow_hyphen_values = true)]
    pub cmd: Option<String>,

    /// Remote repository URL (required).
    #[arg(short = 'g', long, value_name = "URL")]
    pub git: Option<String>,

    /// Branch whose tip is tracked [default: master].
    #[arg(short = 'b', long)]
    pub branch: Option<String>,

    /// Minutes to wait between the end of one check and the start of the next [default: 60].
    #[arg(short = 'm', long, value_name = "MINUTES")]
    pub interval_minutes: Option<u64>,

    /// Sync updates but leave the running process alone until it exits.
    #[arg(long)]
    pub disallow_restart_on_update: bool,

    /// YAML file providing any of these settings; flags take precedence.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Grace period after the termination request before escalating [default: 30].
    #[arg(long, value_name = "SECS")]
    pub stop_timeout_secs: Option<u64>,

    /// Upper bound for any single git invocation [default: 600].
    #[arg(long, value_name = "SECS")]
    pub git_timeout_secs: Option<u64>,

    /// What to do when the process outlives the grace period: kill | orphan [default: kill].
    #[arg(long, value_name = "POLICY")]
    pub on_stop_timeout: Option<OnStopTimeout>,

    /// Log output format: text | json [default: text].
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Flag values as a config layer. Unset flags stay `None` so they never
    /// shadow the file.
    fn overrides(&self) -> UpdaterConfig {
        UpdaterConfig {
            path: self.path.clone(),
            cmd: self.cmd.clone().map(CommandSpec::Line),
            git: self.git.clone(),
            branch: self.branch.clone(),
            interval_minutes: self.interval_minutes,
            disallow_restart_on_update: self.disallow_restart_on_update.then_some(true),
            stop_timeout_secs: self.stop_timeout_secs,
            git_timeout_secs: self.git_timeout_secs,
            on_stop_timeout: self.on_stop_timeout,
            log_format: self.log_format,
        }
    }

    pub fn into_settings(self) -> Result<Settings> {
        let base = match &self.config {
            Some(path) => UpdaterConfig::load_at(path)
                .with_context(|| format!("could not load config file {}", path.display()))?,
            None => UpdaterConfig::default(),
        };
        base.merge(self.overrides())
            .into_settings()
            .context("invalid configuration")
    }
}
