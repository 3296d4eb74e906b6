//! # tiprun-sync
//!
//! Git-facing side of tiprun: revision queries and workspace synchronization.
//!
//! [`GitOracle`] answers "which revision is recorded locally, and which is at
//! the tip of the remote branch"; [`GitSynchronizer`] brings the workspace to
//! that tip (clone on first use, checkout + pull afterwards). Both shell out to
//! the `git` CLI with a bounded wait.

pub mod error;
mod git;
pub mod oracle;
pub mod workspace;

pub use error::SyncError;
pub use oracle::{GitOracle, VersionOracle};
pub use workspace::{GitSynchronizer, SyncOutcome, Synchronizer};
