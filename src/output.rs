//! Terminal rendering of fleet progress and the final report
//!
//! The core produces a [`RunReport`]; everything here only consumes it (plus
//! the per-repository lifecycle events delivered through
//! [`ProgressObserver`]). Human output is an indicatif multi-bar layout with
//! a detail trailer; machine output is a JSON document.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::core::config::PATH_DISPLAY_WIDTH;
use crate::core::{OutcomeStatus, ProgressObserver, RepoDescriptor, RunReport, UpdateOutcome};

const PROGRESS_TEMPLATE: &str = "{prefix:.bold} {wide_msg}";
const UPDATING_MESSAGE: &str = "updating...";

/// Live per-repository progress display.
///
/// One bar per repository, created up front so the layout is stable, plus a
/// plain mode (quiet / no-color / non-tty) that prints one line per finished
/// repository instead of animating.
pub struct FleetProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<PathBuf, ProgressBar>>,
    name_width: usize,
    plain: bool,
}

impl FleetProgress {
    pub fn new(repos: &[RepoDescriptor], plain: bool) -> Self {
        let multi = MultiProgress::new();
        let name_width = repos.iter().map(|r| r.name.len()).max().unwrap_or(0);
        let mut bars = HashMap::new();

        if !plain {
            let style = ProgressStyle::default_bar()
                .template(PROGRESS_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            for repo in repos {
                let bar = multi.add(ProgressBar::new(0));
                bar.set_style(style.clone());
                bar.set_prefix(format!("🟡 {:width$}", repo.name, width = name_width));
                bar.set_message("queued");
                bars.insert(repo.root.clone(), bar);
            }
        }

        Self {
            multi,
            bars: Mutex::new(bars),
            name_width,
            plain,
        }
    }

    /// Clears the animated display once the report takes over.
    pub fn finish(&self) {
        if !self.plain {
            let _ = self.multi.clear();
        }
    }
}

impl ProgressObserver for FleetProgress {
    fn repo_started(&self, repo: &RepoDescriptor) {
        if self.plain {
            return;
        }
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(&repo.root) {
                bar.set_message(UPDATING_MESSAGE);
            }
        }
    }

    fn repo_finished(&self, repo: &RepoDescriptor, outcome: &UpdateOutcome) {
        if self.plain {
            println!(
                "{} {:width$}  {:<20} {}",
                outcome.status.symbol(),
                repo.name,
                outcome.status.text(),
                outcome.message,
                width = self.name_width
            );
            return;
        }
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(&repo.root) {
                bar.set_prefix(format!(
                    "{} {:width$}",
                    outcome.status.symbol(),
                    repo.name,
                    width = self.name_width
                ));
                bar.set_message(format!(
                    "{:<20} {}",
                    outcome.status.text(),
                    outcome.message
                ));
                bar.finish();
            }
        }
    }
}

/// One-line summary in the footer style.
pub fn render_summary(report: &RunReport) -> String {
    let s = &report.summary;
    let mut line = format!(
        "✅ Completed in {:.1}s • {} updated • {} up to date • {} skipped",
        s.duration_seconds, s.updated, s.up_to_date, s.skipped
    );
    if s.failed > 0 {
        line.push_str(&format!(" • {} failed", s.failed));
    }
    if report.cancelled {
        line.push_str(" • cancelled");
    }
    line
}

/// Detail trailer for repositories that need attention. Empty when the whole
/// fleet is healthy.
pub fn render_details(report: &RunReport) -> String {
    let mut lines = Vec::new();

    let failed: Vec<&UpdateOutcome> = report
        .outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::Failed)
        .collect();
    let dirty: Vec<&UpdateOutcome> = report
        .outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::SkippedDirty)
        .collect();
    let no_upstream: Vec<&UpdateOutcome> = report
        .outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::SkippedNoUpstream)
        .collect();

    if !failed.is_empty() {
        lines.push(format!("🔴 FAILED ({})", failed.len()));
        push_tree(&mut lines, &failed, |o| o.message.clone());
        lines.push(String::new());
    }

    if !dirty.is_empty() {
        lines.push(format!("🟠 UNCOMMITTED CHANGES ({})", dirty.len()));
        push_tree(&mut lines, &dirty, |_| {
            "# commit, stash, or re-run with --stash".to_string()
        });
        lines.push(String::new());
    }

    if !no_upstream.is_empty() {
        lines.push(format!("🟡 NEEDS UPSTREAM ({})", no_upstream.len()));
        push_tree(&mut lines, &no_upstream, |_| {
            "# git push -u origin <branch>".to_string()
        });
        lines.push(String::new());
    }

    if !report.warnings.is_empty() {
        lines.push(format!("⚠️  SCAN WARNINGS ({})", report.warnings.len()));
        for (i, warning) in report.warnings.iter().enumerate() {
            let tree_char = if i == report.warnings.len() - 1 {
                "└─"
            } else {
                "├─"
            };
            lines.push(format!("   {} {}", tree_char, warning));
        }
    }

    // Remove trailing blank line if it exists
    if lines.last() == Some(&String::new()) {
        lines.pop();
    }

    lines.join("\n")
}

fn push_tree<F>(lines: &mut Vec<String>, outcomes: &[&UpdateOutcome], annotate: F)
where
    F: Fn(&UpdateOutcome) -> String,
{
    for (i, outcome) in outcomes.iter().enumerate() {
        let tree_char = if i == outcomes.len() - 1 {
            "└─"
        } else {
            "├─"
        };
        let path = outcome.repo.root.to_string_lossy();
        let short_path = shorten_path(&path, PATH_DISPLAY_WIDTH);
        lines.push(format!(
            "   {} {:20} {:40} {}",
            tree_char,
            outcome.repo.name,
            short_path,
            annotate(outcome)
        ));
    }
}

/// Shortens long paths for display
pub fn shorten_path(path: &str, max_length: usize) -> String {
    if path.len() <= max_length {
        return path.to_string();
    }

    let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if components.len() <= 2 {
        return path.to_string();
    }

    format!(
        ".../{}/{}",
        components[components.len() - 2],
        components[components.len() - 1]
    )
}

/// Renders the report as the machine-readable JSON document.
pub fn render_json(report: &RunReport) -> Result<String, serde_json::Error> {
    let repositories: Vec<serde_json::Value> = report
        .outcomes
        .iter()
        .map(|o| {
            serde_json::json!({
                "path": o.repo.root,
                "status": o.status,
                "branch": o.branch,
                "message": o.message,
                "stash_applied": o.stash_applied,
            })
        })
        .collect();

    let doc = serde_json::json!({
        "summary": {
            "repos_found": report.summary.repos_found,
            // a repo that was already current still counts as successfully updated
            "updated": report.summary.updated + report.summary.up_to_date,
            "skipped": report.summary.skipped,
            "failed": report.summary.failed,
            "duration_seconds": report.summary.duration_seconds,
        },
        "repositories": repositories,
        "warnings": report.warnings,
        "cancelled": report.cancelled,
    });
    serde_json::to_string_pretty(&doc)
}
