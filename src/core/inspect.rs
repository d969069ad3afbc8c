//! Working-tree classification
//!
//! Read-only queries against one repository: cleanliness, current branch,
//! upstream configuration. Nothing here mutates the repository, and the
//! result is computed fresh for every run, never cached.

use std::path::Path;

use crate::git::{GateError, GitGateway};

/// Sentinel branch name reported for a detached HEAD.
pub const DETACHED: &str = "detached";

const DETACHED_HEAD_REF: &str = "HEAD";

/// Classification of one repository immediately before an update attempt.
///
/// The three facts are independent: a detached HEAD is neither automatically
/// dirty nor automatically upstream-less.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoState {
    pub is_clean: bool,
    pub current_branch: String,
    pub has_upstream: bool,
}

/// Classifies a repository.
///
/// `include_untracked` controls whether untracked files count as dirty; the
/// default safety policy says they do, since an untracked file is uncommitted
/// work a merge could collide with.
pub async fn classify(
    gateway: &dyn GitGateway,
    repo: &Path,
    include_untracked: bool,
) -> Result<RepoState, GateError> {
    let status_args: &[&str] = if include_untracked {
        &["status", "--porcelain"]
    } else {
        &["status", "--porcelain", "--untracked-files=no"]
    };
    let status = gateway.run(repo, status_args).await?;
    // a failed status query is treated as dirty: when we cannot prove the
    // tree is clean, the safety policy must assume it is not
    let is_clean = status.success && status.stdout.is_empty();

    let head = gateway
        .run(repo, &["rev-parse", "--abbrev-ref", "HEAD"])
        .await?;
    let current_branch = if head.success && head.stdout != DETACHED_HEAD_REF {
        head.stdout
    } else {
        DETACHED.to_string()
    };

    let upstream = gateway
        .run(repo, &["rev-parse", "--abbrev-ref", "@{upstream}"])
        .await?;
    let has_upstream = upstream.success;

    Ok(RepoState {
        is_clean,
        current_branch,
        has_upstream,
    })
}
