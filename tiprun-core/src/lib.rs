//! tiprun core library: domain types, configuration, revision marker, errors.
//!
//! Public API surface:
//! - [`types`]: repository reference, workspace, revision newtype
//! - [`command`]: [`ManagedCommand`], the managed process argument vector
//! - [`config`]: YAML/flag configuration merged into validated [`Settings`]
//! - [`marker`]: persisted last-synchronized revision
//! - [`error`]: [`CoreError`]

pub mod command;
pub mod config;
pub mod error;
pub mod marker;
pub mod types;

pub use command::ManagedCommand;
pub use config::{LogFormat, OnStopTimeout, Settings, UpdaterConfig};
pub use error::CoreError;
pub use types::{RepositoryReference, RevisionId, Workspace};
