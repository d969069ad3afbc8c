//! Update execution
//!
//! Applies the chosen strategy to one repository, wrapping a dirty tree in a
//! stash bracket when requested. The decision policy runs in fixed order and
//! the first matching rule wins; nothing below the winning rule touches the
//! repository.

use std::path::Path;
use std::time::Instant;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::config::{ERROR_MESSAGE_MAX_LENGTH, ERROR_MESSAGE_TRUNCATE_LENGTH};
use crate::core::inspect::{self, RepoState};
use crate::core::report::{OutcomeStatus, RepoDescriptor, UpdateOutcome};
use crate::git::{GateError, GitGateway};

/// Stash message marking brackets this tool created.
pub const STASH_MARKER: &str = "gitfleet: auto-stash before update";

const MSG_UNCOMMITTED: &str = "uncommitted changes";
const MSG_UP_TO_DATE: &str = "already up to date";
const MSG_REFS_UPDATED: &str = "remote refs updated";

// Signatures git prints when an update stops on a conflict. Matched against
// combined output since git splits these across stdout and stderr.
const CONFLICT_SIGNATURES: &[&str] = &[
    "CONFLICT",
    "needs merge",
    "cannot rebase",
    "would be overwritten",
    "Not possible to fast-forward",
    "divergent branches",
];

/// The update mechanism applied to each repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Fetch and merge in one step.
    Pull,
    /// Update remote refs only; never touches the working tree.
    Fetch,
    /// Fetch, then reapply local commits on top.
    Rebase,
}

impl Strategy {
    fn args(&self) -> &'static [&'static str] {
        match self {
            Strategy::Pull => &["pull"],
            Strategy::Fetch => &["fetch"],
            Strategy::Rebase => &["pull", "--rebase"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Pull => "pull",
            Strategy::Fetch => "fetch",
            Strategy::Rebase => "rebase",
        }
    }
}

/// The caller's safety policy plus the chosen strategy, copied per worker.
#[derive(Debug, Clone, Copy)]
pub struct UpdatePolicy {
    pub strategy: Strategy,
    pub allow_dirty: bool,
    pub use_stash: bool,
    pub include_untracked: bool,
}

/// How the strategy invocation itself finished.
enum StrategyResult {
    UpToDate,
    Updated(String),
    Conflict(String),
    GitFailure(String),
}

fn looks_like_conflict(output: &str) -> bool {
    CONFLICT_SIGNATURES.iter().any(|sig| output.contains(sig))
}

/// Collapses git output into a single displayable line
pub(crate) fn clean_git_message(error: &str) -> String {
    let cleaned = error.replace(['\n', '\t'], " ").replace('\r', "");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.len() > ERROR_MESSAGE_MAX_LENGTH {
        format!("{}...", &cleaned[..ERROR_MESSAGE_TRUNCATE_LENGTH])
    } else {
        cleaned
    }
}

/// Applies `policy` to one classified repository and reports the outcome.
///
/// The repository is left exactly as git left it on failure: no automatic
/// conflict resolution, no reset, and a stash bracket is never discarded.
pub async fn apply(
    gateway: &dyn GitGateway,
    repo: &RepoDescriptor,
    state: &RepoState,
    policy: UpdatePolicy,
) -> UpdateOutcome {
    let started = Instant::now();
    let finish = |status: OutcomeStatus, stash_applied: bool, message: String| UpdateOutcome {
        repo: repo.clone(),
        status,
        strategy_used: policy.strategy,
        branch: state.current_branch.clone(),
        stash_applied,
        message,
        duration: started.elapsed(),
    };

    // Rule 1: a dirty tree without an override is never touched
    if !state.is_clean && !policy.allow_dirty && !policy.use_stash {
        debug!(repo = %repo.name, "skipping dirty working tree");
        return finish(OutcomeStatus::SkippedDirty, false, MSG_UNCOMMITTED.to_string());
    }

    // Rule 2: nothing meaningful to update against
    if !state.has_upstream {
        debug!(repo = %repo.name, "skipping, no upstream configured");
        return finish(
            OutcomeStatus::SkippedNoUpstream,
            false,
            format!("{} (no upstream)", state.current_branch),
        );
    }

    // Rule 3: bracket a dirty tree in a stash when asked to
    let mut stash_applied = false;
    if !state.is_clean && policy.use_stash {
        let saved = gateway
            .run(
                &repo.root,
                &["stash", "push", "--include-untracked", "-m", STASH_MARKER],
            )
            .await;
        match saved {
            Ok(out) if out.success => {
                stash_applied = !out.stdout.contains("No local changes to save");
            }
            Ok(out) => {
                return finish(
                    OutcomeStatus::Failed,
                    false,
                    clean_git_message(&format!("stash save failed: {}", out.combined())),
                );
            }
            Err(err) => return finish(OutcomeStatus::Failed, false, err.to_string()),
        }

        if stash_applied {
            // the stash changed the tree, so the original classification no
            // longer holds; prove the tree is clean before updating
            match inspect::classify(gateway, &repo.root, policy.include_untracked).await {
                Ok(fresh) if fresh.is_clean => {}
                Ok(_) => {
                    // stash did not produce a clean tree; put things back
                    let restored = gateway.run(&repo.root, &["stash", "pop"]).await;
                    if !matches!(restored, Ok(ref out) if out.success) {
                        warn!(repo = %repo.name, "stash left in place after aborted bracket");
                    }
                    return finish(
                        OutcomeStatus::SkippedDirty,
                        false,
                        "working tree still dirty after stash save".to_string(),
                    );
                }
                Err(err) => {
                    return finish(
                        OutcomeStatus::Failed,
                        true,
                        format!("{err}; local changes remain stashed"),
                    );
                }
            }
        }
    }

    // Rule 4: run the strategy
    let result = match run_strategy(gateway, &repo.root, policy.strategy).await {
        Ok(result) => result,
        // Rule 5: gateway failures leave the repository exactly as git left it
        Err(err) => {
            let message = if stash_applied {
                format!("{err}; local changes remain stashed")
            } else {
                err.to_string()
            };
            return finish(OutcomeStatus::Failed, stash_applied, message);
        }
    };

    // the stash is only restored after a strategy that succeeded; a conflict
    // or timeout leaves both the repository and the stash as they are
    let strategy_ok = matches!(
        result,
        StrategyResult::UpToDate | StrategyResult::Updated(_)
    );
    if strategy_ok && stash_applied {
        match gateway.run(&repo.root, &["stash", "pop"]).await {
            Ok(out) if out.success => {}
            Ok(out) => {
                // never drop the stash: the user's changes live there
                return finish(
                    OutcomeStatus::Failed,
                    true,
                    clean_git_message(&format!(
                        "stash restore failed: {}; resolve manually, your changes are kept in the stash ('git stash pop')",
                        out.combined()
                    )),
                );
            }
            Err(err) => {
                return finish(
                    OutcomeStatus::Failed,
                    true,
                    format!("stash restore failed: {err}; your changes are kept in the stash"),
                );
            }
        }
    }

    match result {
        StrategyResult::UpToDate => {
            finish(OutcomeStatus::UpToDate, stash_applied, MSG_UP_TO_DATE.to_string())
        }
        StrategyResult::Updated(msg) => finish(OutcomeStatus::Updated, stash_applied, msg),
        StrategyResult::Conflict(msg) | StrategyResult::GitFailure(msg) => {
            let message = if stash_applied {
                format!("{msg}; local changes remain stashed")
            } else {
                msg
            };
            finish(OutcomeStatus::Failed, stash_applied, message)
        }
    }
}

async fn run_strategy(
    gateway: &dyn GitGateway,
    repo: &Path,
    strategy: Strategy,
) -> Result<StrategyResult, GateError> {
    // fetch never moves HEAD, so the before/after comparison only applies to
    // the work-tree strategies
    let old_head = match strategy {
        Strategy::Fetch => None,
        Strategy::Pull | Strategy::Rebase => {
            let head = gateway.run(repo, &["rev-parse", "HEAD"]).await?;
            head.success.then_some(head.stdout)
        }
    };

    let out = gateway.run(repo, strategy.args()).await?;
    if !out.success {
        let combined = out.combined();
        if looks_like_conflict(&combined) {
            return Ok(StrategyResult::Conflict(clean_git_message(&format!(
                "conflict, resolve manually: {combined}"
            ))));
        }
        return Ok(StrategyResult::GitFailure(clean_git_message(&combined)));
    }

    match strategy {
        Strategy::Fetch => {
            // fetch reports updated refs on stderr; silence means nothing new
            if out.stdout.is_empty() && out.stderr.is_empty() {
                Ok(StrategyResult::UpToDate)
            } else {
                Ok(StrategyResult::Updated(MSG_REFS_UPDATED.to_string()))
            }
        }
        Strategy::Pull | Strategy::Rebase => {
            let head = gateway.run(repo, &["rev-parse", "HEAD"]).await?;
            let new_head = head.success.then_some(head.stdout);
            if old_head == new_head {
                return Ok(StrategyResult::UpToDate);
            }
            let message = match (&old_head, &new_head) {
                (Some(old), Some(new)) => {
                    count_commits(gateway, repo, old, new)
                        .await
                        .map(|n| {
                            let noun = if n == 1 { "commit" } else { "commits" };
                            format!("{n} {noun} pulled")
                        })
                        .unwrap_or_else(|| "updated".to_string())
                }
                _ => "updated".to_string(),
            };
            Ok(StrategyResult::Updated(message))
        }
    }
}

async fn count_commits(
    gateway: &dyn GitGateway,
    repo: &Path,
    old: &str,
    new: &str,
) -> Option<u64> {
    let range = format!("{old}..{new}");
    let out = gateway
        .run(repo, &["rev-list", "--count", &range])
        .await
        .ok()?;
    if out.success {
        out.stdout.parse().ok()
    } else {
        None
    }
}
