//! Error types for tiprun-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from configuration and marker operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on config load, including file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A required setting was given neither on the command line nor in the config file.
    #[error("missing required setting `{0}`")]
    MissingSetting(&'static str),

    /// A setting was present but its value is unusable.
    #[error("invalid value for `{name}`: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    /// The managed command line could not be split into an argument vector.
    #[error("invalid command line: {0}")]
    Command(String),
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
