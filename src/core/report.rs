//! Per-repository outcomes and the aggregate run report

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::core::update::Strategy;

/// One discovered repository root.
///
/// `name` is the directory basename, suffixed `-2`, `-3`, ... when several
/// repositories share a basename; it exists for display alignment only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDescriptor {
    pub name: String,
    pub root: PathBuf,
}

/// Terminal status of one repository for this run.
///
/// Exactly one status is produced per repository per run; the skip variants
/// and `Failed` are mutually exclusive with the success variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeStatus {
    #[serde(rename = "updated")]
    Updated,
    #[serde(rename = "already-up-to-date")]
    UpToDate,
    #[serde(rename = "skipped-dirty")]
    SkippedDirty,
    #[serde(rename = "skipped-no-upstream")]
    SkippedNoUpstream,
    #[serde(rename = "skipped-excluded")]
    SkippedExcluded,
    #[serde(rename = "failed")]
    Failed,
}

impl OutcomeStatus {
    /// Returns the emoji symbol for this status
    pub fn symbol(&self) -> &'static str {
        match self {
            OutcomeStatus::Updated | OutcomeStatus::UpToDate => "🟢",
            OutcomeStatus::SkippedDirty | OutcomeStatus::SkippedExcluded => "🟠",
            OutcomeStatus::SkippedNoUpstream => "🟡",
            OutcomeStatus::Failed => "🔴",
        }
    }

    /// Returns the text representation of this status
    pub fn text(&self) -> &'static str {
        match self {
            OutcomeStatus::Updated => "updated",
            OutcomeStatus::UpToDate => "already-up-to-date",
            OutcomeStatus::SkippedDirty => "skipped-dirty",
            OutcomeStatus::SkippedNoUpstream => "skipped-no-upstream",
            OutcomeStatus::SkippedExcluded => "skipped-excluded",
            OutcomeStatus::Failed => "failed",
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            OutcomeStatus::SkippedDirty
                | OutcomeStatus::SkippedNoUpstream
                | OutcomeStatus::SkippedExcluded
        )
    }
}

/// The result of attempting to update one repository.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub repo: RepoDescriptor,
    pub status: OutcomeStatus,
    pub strategy_used: Strategy,
    pub branch: String,
    /// True only if a stash bracket was used around the update.
    pub stash_applied: bool,
    pub message: String,
    pub duration: Duration,
}

/// Counts folded from the outcomes, plus total wall time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub repos_found: usize,
    pub updated: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration_seconds: f64,
}

/// The aggregate of one fleet run.
///
/// `outcomes` is in stable discovery order, never completion order, so
/// repeated runs over an unchanged tree report in the same order.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcomes: Vec<UpdateOutcome>,
    pub summary: RunSummary,
    pub warnings: Vec<String>,
    pub cancelled: bool,
}

impl RunReport {
    /// Folds completed outcomes into a report. `repos_found` is the number of
    /// discovered repositories, which exceeds `outcomes.len()` when a
    /// cancelled run left some repositories undispatched.
    pub fn assemble(
        repos_found: usize,
        outcomes: Vec<UpdateOutcome>,
        warnings: Vec<String>,
        cancelled: bool,
        duration: Duration,
    ) -> Self {
        let mut summary = RunSummary {
            repos_found,
            duration_seconds: duration.as_secs_f64(),
            ..RunSummary::default()
        };
        for outcome in &outcomes {
            match outcome.status {
                OutcomeStatus::Updated => summary.updated += 1,
                OutcomeStatus::UpToDate => summary.up_to_date += 1,
                OutcomeStatus::Failed => summary.failed += 1,
                OutcomeStatus::SkippedDirty
                | OutcomeStatus::SkippedNoUpstream
                | OutcomeStatus::SkippedExcluded => summary.skipped += 1,
            }
        }
        Self {
            outcomes,
            summary,
            warnings,
            cancelled,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }
}
