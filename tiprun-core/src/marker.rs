//! Revision marker: the last revision the workspace was synchronized to, and
//! the branch it was taken from.
//!
//! Persists `<revision> <branch>` as one line of plain text at
//! `<workspace>/.git/tiprun-revision`. Living under `.git/` keeps the marker
//! out of the working tree, so it never shows up as an untracked change.
//! Writes use an atomic `.tmp` + rename.
//!
//! A marker holding only a revision (no branch) still loads; its `branch` is
//! `None`, which never matches a tracked branch.

use std::path::PathBuf;

use crate::error::{io_err, CoreError};
use crate::types::{RevisionId, Workspace};

pub const MARKER_FILE: &str = "tiprun-revision";

/// Contents of the revision marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerRecord {
    pub revision: RevisionId,
    pub branch: Option<String>,
}

impl MarkerRecord {
    /// Revision recorded for `branch`, or `None` when the marker belongs to
    /// another branch.
    pub fn revision_for(&self, branch: &str) -> Option<&RevisionId> {
        (self.branch.as_deref() == Some(branch)).then_some(&self.revision)
    }
}

/// `<workspace>/.git/tiprun-revision` (pure, no I/O).
pub fn marker_path(workspace: &Workspace) -> PathBuf {
    workspace.git_dir().join(MARKER_FILE)
}

/// Load the recorded revision.
///
/// Returns `Ok(None)` when the marker does not exist yet or holds only
/// whitespace; both mean "never synchronized".
pub fn load(workspace: &Workspace) -> Result<Option<MarkerRecord>, CoreError> {
    let path = marker_path(workspace);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    let mut fields = contents.split_whitespace();
    let Some(revision) = fields.next() else {
        return Ok(None);
    };
    Ok(Some(MarkerRecord {
        revision: RevisionId::from(revision),
        branch: fields.next().map(str::to_string),
    }))
}

/// Record `revision` of `branch` atomically, replacing any previous value.
pub fn save(workspace: &Workspace, branch: &str, revision: &RevisionId) -> Result<(), CoreError> {
    let path = marker_path(workspace);
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid revision marker path"),
        ));
    };
    if !dir.is_dir() {
        return Err(io_err(
            dir,
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "workspace has no local copy to record a revision for",
            ),
        ));
    }

    let tmp = path.with_extension("tmp");
    let line = format!("{revision} {branch}\n");
    std::fs::write(&tmp, line).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}
