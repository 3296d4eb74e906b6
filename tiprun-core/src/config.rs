//! Configuration: optional YAML file merged with command-line flags.
//!
//! Both sources deserialize into the same [`UpdaterConfig`], where every field
//! is optional. [`UpdaterConfig::merge`] layers the flag values over the file
//! values, and [`UpdaterConfig::into_settings`] fills defaults, validates, and
//! produces the immutable [`Settings`] the daemon runs with.
//!
//! ```yaml
//! path: /srv/app
//! cmd: ["python", "-m", "app"]     # or a single string: "python -m app"
//! git: https://example.com/app.git
//! branch: main
//! interval-minutes: 5
//! disallow-restart-on-update: false
//! stop-timeout-secs: 30
//! git-timeout-secs: 600
//! on-stop-timeout: kill            # kill | orphan
//! log-format: text                 # text | json
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::ManagedCommand;
use crate::error::{io_err, CoreError};
use crate::types::{RepositoryReference, Workspace};

pub const DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_INTERVAL_MINUTES: u64 = 60;
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 600;

// ---------------------------------------------------------------------------
// Enumerated settings
// ---------------------------------------------------------------------------

/// What to do with a managed process that outlives its stop grace period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnStopTimeout {
    /// Force-kill the process group and reap it.
    #[default]
    Kill,
    /// Leave the process running, detached from tiprun.
    Orphan,
}

impl FromStr for OnStopTimeout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kill" => Ok(Self::Kill),
            "orphan" => Ok(Self::Orphan),
            other => Err(format!(
                "unknown stop-timeout policy '{other}'; expected: kill, orphan"
            )),
        }
    }
}

impl fmt::Display for OnStopTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kill => f.write_str("kill"),
            Self::Orphan => f.write_str("orphan"),
        }
    }
}

/// Output format of the daemon's own log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'; expected: text, json")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// The managed command as written in YAML: a shell-style line or an argv list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Line(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    fn into_command(self) -> Result<ManagedCommand, CoreError> {
        match self {
            Self::Line(line) => ManagedCommand::parse(&line),
            Self::Argv(argv) => ManagedCommand::from_argv(argv)
                .ok_or_else(|| CoreError::Command("command line is empty".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw (unvalidated) configuration
// ---------------------------------------------------------------------------

/// Every setting, each optional. One instance comes from the config file, one
/// from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct UpdaterConfig {
    pub path: Option<PathBuf>,
    pub cmd: Option<CommandSpec>,
    pub git: Option<String>,
    pub branch: Option<String>,
    pub interval_minutes: Option<u64>,
    pub disallow_restart_on_update: Option<bool>,
    pub stop_timeout_secs: Option<u64>,
    pub git_timeout_secs: Option<u64>,
    pub on_stop_timeout: Option<OnStopTimeout>,
    pub log_format: Option<LogFormat>,
}

impl UpdaterConfig {
    /// Load a config file. Unknown keys are rejected so typos surface early.
    pub fn load_at(path: &Path) -> Result<Self, CoreError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_yaml::from_str(&contents).map_err(|source| CoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Layer `overrides` on top of `self`; any value set in `overrides` wins.
    pub fn merge(self, overrides: UpdaterConfig) -> UpdaterConfig {
        UpdaterConfig {
            path: overrides.path.or(self.path),
            cmd: overrides.cmd.or(self.cmd),
            git: overrides.git.or(self.git),
            branch: overrides.branch.or(self.branch),
            interval_minutes: overrides.interval_minutes.or(self.interval_minutes),
            disallow_restart_on_update: overrides
                .disallow_restart_on_update
                .or(self.disallow_restart_on_update),
            stop_timeout_secs: overrides.stop_timeout_secs.or(self.stop_timeout_secs),
            git_timeout_secs: overrides.git_timeout_secs.or(self.git_timeout_secs),
            on_stop_timeout: overrides.on_stop_timeout.or(self.on_stop_timeout),
            log_format: overrides.log_format.or(self.log_format),
        }
    }

    /// Apply defaults and validate.
    pub fn into_settings(self) -> Result<Settings, CoreError> {
        let path = self.path.ok_or(CoreError::MissingSetting("path"))?;
        if path.as_os_str().is_empty() {
            return Err(invalid("path", "must not be empty"));
        }

        let command = self
            .cmd
            .ok_or(CoreError::MissingSetting("cmd"))?
            .into_command()?;

        let url = self.git.ok_or(CoreError::MissingSetting("git"))?;
        if url.trim().is_empty() {
            return Err(invalid("git", "must not be empty"));
        }

        let branch = self.branch.unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        if branch.is_empty() || branch.contains(char::is_whitespace) {
            return Err(invalid("branch", "must be a non-empty name without whitespace"));
        }

        let interval_minutes = self.interval_minutes.unwrap_or(DEFAULT_INTERVAL_MINUTES);
        if interval_minutes == 0 {
            return Err(invalid("interval-minutes", "must be at least 1"));
        }

        let git_timeout_secs = self.git_timeout_secs.unwrap_or(DEFAULT_GIT_TIMEOUT_SECS);
        if git_timeout_secs == 0 {
            return Err(invalid("git-timeout-secs", "must be at least 1"));
        }

        Ok(Settings {
            repo: RepositoryReference::new(url, branch),
            workspace: Workspace::new(path),
            command,
            interval: Duration::from_secs(interval_minutes * 60),
            restart_on_update: !self.disallow_restart_on_update.unwrap_or(false),
            stop_timeout: Duration::from_secs(
                self.stop_timeout_secs.unwrap_or(DEFAULT_STOP_TIMEOUT_SECS),
            ),
            git_timeout: Duration::from_secs(git_timeout_secs),
            on_stop_timeout: self.on_stop_timeout.unwrap_or_default(),
            log_format: self.log_format.unwrap_or_default(),
        })
    }
}

fn invalid(name: &'static str, reason: &str) -> CoreError {
    CoreError::InvalidSetting {
        name,
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Validated settings
// ---------------------------------------------------------------------------

/// Validated, immutable runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub repo: RepositoryReference,
    pub workspace: Workspace,
    pub command: ManagedCommand,
    /// Wait between the end of one cycle and the start of the next.
    pub interval: Duration,
    pub restart_on_update: bool,
    pub stop_timeout: Duration,
    pub git_timeout: Duration,
    pub on_stop_timeout: OnStopTimeout,
    pub log_format: LogFormat,
}
