//! Oracle and synchronizer tests against a real local remote.
//!
//! Each test builds a bare repository plus a seed clone (used to push new
//! commits) inside its own `TempDir`, and points tiprun at it via `file://`.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tempfile::TempDir;
use tiprun_core::{marker, RepositoryReference, RevisionId, Workspace};
use tiprun_sync::{GitOracle, GitSynchronizer, SyncError, SyncOutcome, Synchronizer, VersionOracle};

const TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=tiprun-test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "init.defaultBranch=main",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

struct Remote {
    root: TempDir,
    bare: PathBuf,
    seed: PathBuf,
}

impl Remote {
    /// Bare remote whose `branch` holds one commit adding `app.txt`.
    fn new(branch: &str) -> Self {
        let root = TempDir::new().expect("tempdir");
        let bare = root.path().join("remote.git");
        let seed = root.path().join("seed");
        git(root.path(), &["init", "--bare", "remote.git"]);
        git(root.path(), &["init", "seed"]);
        git(&seed, &["symbolic-ref", "HEAD", &format!("refs/heads/{branch}")]);
        git(&seed, &["remote", "add", "origin", bare.to_str().expect("utf-8 path")]);
        let remote = Self { root, bare, seed };
        remote.commit("app.txt", "v1\n");
        remote
    }

    fn url(&self) -> String {
        format!("file://{}", self.bare.display())
    }

    fn reference(&self, branch: &str) -> RepositoryReference {
        RepositoryReference::new(self.url(), branch)
    }

    /// Commit `content` to `file` on the seed's current branch and push it.
    fn commit(&self, file: &str, content: &str) -> RevisionId {
        std::fs::write(self.seed.join(file), content).expect("write file");
        git(&self.seed, &["add", file]);
        git(&self.seed, &["commit", "-m", &format!("update {file}")]);
        git(&self.seed, &["push", "origin", "HEAD"]);
        RevisionId::from(git(&self.seed, &["rev-parse", "HEAD"]))
    }

    fn branch_off(&self, branch: &str) {
        git(&self.seed, &["checkout", "-b", branch]);
    }

    fn workspace(&self) -> Workspace {
        Workspace::new(self.root.path().join("workspace"))
    }
}

fn head_of(workspace: &Workspace) -> String {
    git(workspace.path(), &["rev-parse", "HEAD"])
}

// ---------------------------------------------------------------------------
// 1. Remote revision
// ---------------------------------------------------------------------------

#[test]
fn remote_revision_is_pushed_tip() {
    init_logging();
    let remote = Remote::new("main");
    let tip = remote.commit("app.txt", "v2\n");

    let oracle = GitOracle::new(TIMEOUT);
    let revision = oracle.remote_revision(&remote.reference("main")).expect("ls-remote");
    assert_eq!(revision, tip);
}

#[test]
fn missing_branch_is_branch_not_found() {
    init_logging();
    let remote = Remote::new("main");

    let oracle = GitOracle::new(TIMEOUT);
    let err = oracle
        .remote_revision(&remote.reference("production"))
        .unwrap_err();
    assert!(matches!(err, SyncError::BranchNotFound { .. }), "got: {err}");
}

#[test]
fn branch_with_shared_prefix_never_matches() {
    init_logging();
    let remote = Remote::new("release-2");

    let oracle = GitOracle::new(TIMEOUT);
    let err = oracle.remote_revision(&remote.reference("release")).unwrap_err();
    assert!(matches!(err, SyncError::BranchNotFound { .. }), "got: {err}");

    remote.branch_off("release");
    let release_tip = remote.commit("app.txt", "release\n");
    let revision = oracle
        .remote_revision(&remote.reference("release"))
        .expect("ls-remote");
    assert_eq!(revision, release_tip);
}

#[test]
fn missing_remote_is_unreachable() {
    init_logging();
    let root = TempDir::new().expect("tempdir");
    let url = format!("file://{}", root.path().join("no-such-repo.git").display());

    let oracle = GitOracle::new(TIMEOUT);
    let err = oracle
        .remote_revision(&RepositoryReference::new(url, "main"))
        .unwrap_err();
    assert!(matches!(err, SyncError::RemoteUnreachable { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Local revision
// ---------------------------------------------------------------------------

#[test]
fn local_revision_empty_until_recorded() {
    init_logging();
    let remote = Remote::new("main");
    let repo = remote.reference("main");
    let workspace = remote.workspace();
    let oracle = GitOracle::new(TIMEOUT);
    assert_eq!(oracle.local_revision(&repo, &workspace), None);

    GitSynchronizer::new(TIMEOUT)
        .ensure_workspace(&repo, &workspace)
        .expect("clone");
    assert_eq!(oracle.local_revision(&repo, &workspace), None, "clone alone records nothing");

    let revision = RevisionId::from(head_of(&workspace));
    oracle.record_revision(&repo, &workspace, &revision).expect("record");
    assert_eq!(oracle.local_revision(&repo, &workspace), Some(revision));
}

#[test]
fn revision_recorded_for_other_branch_counts_as_unsynchronized() {
    init_logging();
    let remote = Remote::new("main");
    let main = remote.reference("main");
    let workspace = remote.workspace();
    let sync = GitSynchronizer::new(TIMEOUT);
    let oracle = GitOracle::new(TIMEOUT);
    sync.ensure_workspace(&main, &workspace).expect("clone main");
    let tip = RevisionId::from(head_of(&workspace));
    oracle.record_revision(&main, &workspace, &tip).expect("record");

    // `develop` points at the very same commit as `main`.
    remote.branch_off("develop");
    git(&remote.seed, &["push", "origin", "HEAD"]);
    let develop = remote.reference("develop");
    assert_eq!(oracle.remote_revision(&develop).expect("ls-remote"), tip);

    assert_eq!(oracle.local_revision(&develop, &workspace), None);

    sync.ensure_workspace(&develop, &workspace).expect("switch to develop");
    oracle.record_revision(&develop, &workspace, &tip).expect("record");
    assert_eq!(
        git(workspace.path(), &["rev-parse", "--abbrev-ref", "HEAD"]),
        "develop"
    );
    assert_eq!(oracle.local_revision(&develop, &workspace), Some(tip));
    assert_eq!(oracle.local_revision(&main, &workspace), None);
}

// ---------------------------------------------------------------------------
// 3. Synchronizer
// ---------------------------------------------------------------------------

#[test]
fn first_sync_clones_branch() {
    init_logging();
    let remote = Remote::new("main");
    let tip = remote.commit("app.txt", "v2\n");
    let workspace = remote.workspace();

    let outcome = GitSynchronizer::new(TIMEOUT)
        .ensure_workspace(&remote.reference("main"), &workspace)
        .expect("clone");

    assert_eq!(outcome, SyncOutcome::Cloned);
    assert!(workspace.has_local_copy());
    assert_eq!(head_of(&workspace), tip.as_str());
    assert_eq!(
        std::fs::read_to_string(workspace.path().join("app.txt")).expect("read"),
        "v2\n"
    );
}

#[test]
fn later_sync_pulls_new_commits() {
    init_logging();
    let remote = Remote::new("main");
    let workspace = remote.workspace();
    let sync = GitSynchronizer::new(TIMEOUT);
    sync.ensure_workspace(&remote.reference("main"), &workspace)
        .expect("clone");

    let tip = remote.commit("app.txt", "v3\n");
    let outcome = sync
        .ensure_workspace(&remote.reference("main"), &workspace)
        .expect("pull");

    assert_eq!(outcome, SyncOutcome::Updated);
    assert_eq!(head_of(&workspace), tip.as_str());
}

#[test]
fn tracked_edits_are_stashed_before_pull() {
    init_logging();
    let remote = Remote::new("main");
    let workspace = remote.workspace();
    let sync = GitSynchronizer::new(TIMEOUT);
    sync.ensure_workspace(&remote.reference("main"), &workspace)
        .expect("clone");

    std::fs::write(workspace.path().join("app.txt"), "hotfix on server\n").expect("edit");
    let tip = remote.commit("app.txt", "v4\n");

    sync.ensure_workspace(&remote.reference("main"), &workspace)
        .expect("pull over dirty workspace");

    assert_eq!(head_of(&workspace), tip.as_str());
    assert_eq!(
        std::fs::read_to_string(workspace.path().join("app.txt")).expect("read"),
        "v4\n"
    );
    let stashes = git(workspace.path(), &["stash", "list"]);
    assert!(stashes.contains("tiprun"), "stash entry expected, got: {stashes}");
}

#[test]
fn untracked_files_survive_update() {
    init_logging();
    let remote = Remote::new("main");
    let workspace = remote.workspace();
    let sync = GitSynchronizer::new(TIMEOUT);
    sync.ensure_workspace(&remote.reference("main"), &workspace)
        .expect("clone");

    std::fs::write(workspace.path().join("data.db"), "rows\n").expect("untracked");
    std::fs::write(workspace.path().join("app.txt"), "hotfix on server\n").expect("edit");
    let tip = remote.commit("app.txt", "v2\n");

    sync.ensure_workspace(&remote.reference("main"), &workspace)
        .expect("pull");

    assert_eq!(head_of(&workspace), tip.as_str());
    assert_eq!(
        std::fs::read_to_string(workspace.path().join("data.db")).expect("data.db kept"),
        "rows\n"
    );
}

#[test]
fn untracked_only_workspace_is_not_stashed() {
    init_logging();
    let remote = Remote::new("main");
    let workspace = remote.workspace();
    let sync = GitSynchronizer::new(TIMEOUT);
    sync.ensure_workspace(&remote.reference("main"), &workspace)
        .expect("clone");

    std::fs::write(workspace.path().join(".env"), "SECRET=1\n").expect("untracked");
    remote.commit("app.txt", "v2\n");
    sync.ensure_workspace(&remote.reference("main"), &workspace)
        .expect("pull");

    assert!(workspace.path().join(".env").exists());
    assert_eq!(git(workspace.path(), &["stash", "list"]), "");
}

#[test]
fn marker_does_not_dirty_workspace() {
    init_logging();
    let remote = Remote::new("main");
    let workspace = remote.workspace();
    GitSynchronizer::new(TIMEOUT)
        .ensure_workspace(&remote.reference("main"), &workspace)
        .expect("clone");

    marker::save(&workspace, "main", &RevisionId::from(head_of(&workspace))).expect("save marker");
    assert_eq!(git(workspace.path(), &["status", "--porcelain"]), "");
}

#[test]
fn sync_switches_to_configured_branch() {
    init_logging();
    let remote = Remote::new("main");
    let workspace = remote.workspace();
    let sync = GitSynchronizer::new(TIMEOUT);
    sync.ensure_workspace(&remote.reference("main"), &workspace)
        .expect("clone main");

    remote.branch_off("develop");
    let develop_tip = remote.commit("app.txt", "develop\n");

    sync.ensure_workspace(&remote.reference("develop"), &workspace)
        .expect("switch to develop");

    assert_eq!(
        git(workspace.path(), &["rev-parse", "--abbrev-ref", "HEAD"]),
        "develop"
    );
    assert_eq!(head_of(&workspace), develop_tip.as_str());
}

#[test]
fn failed_clone_leaves_no_workspace() {
    init_logging();
    let remote = Remote::new("main");
    let workspace = remote.workspace();

    let err = GitSynchronizer::new(TIMEOUT)
        .ensure_workspace(&remote.reference("no-such-branch"), &workspace)
        .unwrap_err();

    assert!(matches!(err, SyncError::Git { .. }), "got: {err}");
    assert!(!workspace.path().exists());
    assert_eq!(
        GitOracle::new(TIMEOUT).local_revision(&remote.reference("no-such-branch"), &workspace),
        None
    );
}
