//! Fleet orchestration
//!
//! Owns the bounded worker pool: fans repositories out to at most
//! `concurrency` concurrent workers, streams outcomes back as they complete,
//! and reassembles them into discovery order so the report is deterministic
//! regardless of scheduling.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use glob::Pattern;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info};

use crate::core::config::RunOptions;
use crate::core::inspect;
use crate::core::report::{OutcomeStatus, RepoDescriptor, RunReport, UpdateOutcome};
use crate::core::update::{self, UpdatePolicy};
use crate::git::GitGateway;

const UNKNOWN_BRANCH: &str = "unknown";

/// Rendering hook: the output layer observes repository lifecycle events
/// without the core depending on any terminal machinery.
pub trait ProgressObserver: Send + Sync {
    fn repo_started(&self, repo: &RepoDescriptor);
    fn repo_finished(&self, repo: &RepoDescriptor, outcome: &UpdateOutcome);
}

pub struct FleetOrchestrator {
    gateway: Arc<dyn GitGateway>,
    options: RunOptions,
}

impl FleetOrchestrator {
    pub fn new(gateway: Arc<dyn GitGateway>, options: RunOptions) -> Self {
        Self { gateway, options }
    }

    /// Processes every descriptor and assembles the run report.
    ///
    /// The semaphore is a hard cap: at most `options.concurrency` git
    /// processes run simultaneously no matter how large the fleet is. Once
    /// `cancel` flips, repositories that have not been dispatched yet are
    /// abandoned while in-flight ones finish, so no repository is left with a
    /// half-applied stash.
    pub async fn run(
        &self,
        descriptors: Vec<RepoDescriptor>,
        warnings: Vec<String>,
        cancel: watch::Receiver<bool>,
        observer: Option<Arc<dyn ProgressObserver>>,
    ) -> RunReport {
        let started = Instant::now();
        let total = descriptors.len();
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let policy = UpdatePolicy {
            strategy: self.options.strategy,
            allow_dirty: self.options.allow_dirty,
            use_stash: self.options.use_stash,
            include_untracked: self.options.include_untracked,
        };
        let exclude = Arc::new(self.options.compiled_excludes());

        info!(
            repos = total,
            concurrency = self.options.concurrency,
            strategy = policy.strategy.as_str(),
            "starting fleet update"
        );

        let mut workers = FuturesUnordered::new();
        for (index, repo) in descriptors.into_iter().enumerate() {
            let gateway = Arc::clone(&self.gateway);
            let semaphore = Arc::clone(&semaphore);
            let exclude = Arc::clone(&exclude);
            let observer = observer.clone();
            let cancel = cancel.clone();
            let include_untracked = self.options.include_untracked;

            workers.push(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("worker semaphore closed unexpectedly");
                // cooperative cancellation: a repository claimed after the
                // flag trips is never dispatched
                if *cancel.borrow() {
                    return None;
                }
                if let Some(obs) = observer.as_deref() {
                    obs.repo_started(&repo);
                }
                let outcome =
                    process_repo(gateway.as_ref(), &repo, policy, include_untracked, &exclude)
                        .await;
                debug!(
                    repo = %repo.name,
                    status = outcome.status.text(),
                    "repository processed"
                );
                if let Some(obs) = observer.as_deref() {
                    obs.repo_finished(&repo, &outcome);
                }
                Some((index, outcome))
            });
        }

        let mut collected: Vec<(usize, UpdateOutcome)> = Vec::with_capacity(total);
        while let Some(done) = workers.next().await {
            if let Some(tagged) = done {
                collected.push(tagged);
            }
        }

        // completion order is scheduling noise; the report is discovery order
        collected.sort_by_key(|(index, _)| *index);
        let outcomes = collected.into_iter().map(|(_, outcome)| outcome).collect();

        let cancelled = *cancel.borrow();
        RunReport::assemble(total, outcomes, warnings, cancelled, started.elapsed())
    }
}

/// Classifies one repository, then applies the update policy to it. Errors
/// never propagate past this point: classification failures become a `Failed`
/// outcome for this repository alone.
async fn process_repo(
    gateway: &dyn GitGateway,
    repo: &RepoDescriptor,
    policy: UpdatePolicy,
    include_untracked: bool,
    exclude: &[Pattern],
) -> UpdateOutcome {
    let started = Instant::now();

    // discovery prunes excluded directories before they are opened, so this
    // only fires for descriptor lists supplied directly by a caller
    if is_excluded_root(&repo.root, exclude) {
        return UpdateOutcome {
            repo: repo.clone(),
            status: OutcomeStatus::SkippedExcluded,
            strategy_used: policy.strategy,
            branch: UNKNOWN_BRANCH.to_string(),
            stash_applied: false,
            message: "excluded by pattern".to_string(),
            duration: started.elapsed(),
        };
    }

    match inspect::classify(gateway, &repo.root, include_untracked).await {
        Ok(state) => update::apply(gateway, repo, &state, policy).await,
        Err(err) => UpdateOutcome {
            repo: repo.clone(),
            status: OutcomeStatus::Failed,
            strategy_used: policy.strategy,
            branch: UNKNOWN_BRANCH.to_string(),
            stash_applied: false,
            message: format!("classification failed: {err}"),
            duration: started.elapsed(),
        },
    }
}

fn is_excluded_root(root: &Path, exclude: &[Pattern]) -> bool {
    root.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| exclude.iter().any(|pattern| pattern.matches(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{GateError, GitOutput};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Gateway that answers from canned responses and records how many
    /// invocations were in flight at once.
    struct MockGateway {
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        delay_ms: u64,
        /// repos whose `status --porcelain` reports a dirty tree
        dirty: Vec<PathBuf>,
        /// repos whose upstream probe fails
        no_upstream: Vec<PathBuf>,
        /// repos whose pull times out at the gateway
        timeout_pull: Vec<PathBuf>,
    }

    impl MockGateway {
        fn clean(delay_ms: u64) -> Self {
            Self {
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                delay_ms,
                dirty: Vec::new(),
                no_upstream: Vec::new(),
                timeout_pull: Vec::new(),
            }
        }

        fn ok(stdout: &str) -> GitOutput {
            GitOutput {
                success: true,
                exit_code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            }
        }

        fn err(stderr: &str) -> GitOutput {
            GitOutput {
                success: false,
                exit_code: 1,
                stdout: String::new(),
                stderr: stderr.to_string(),
            }
        }
    }

    #[async_trait]
    impl GitGateway for MockGateway {
        async fn run(&self, repo: &Path, args: &[&str]) -> Result<GitOutput, GateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            let repo = repo.to_path_buf();
            let out = match args.first().copied() {
                Some("status") => {
                    if self.dirty.contains(&repo) {
                        Self::ok(" M src/lib.rs")
                    } else {
                        Self::ok("")
                    }
                }
                Some("rev-parse") if args.contains(&"@{upstream}") => {
                    if self.no_upstream.contains(&repo) {
                        Self::err("fatal: no upstream configured")
                    } else {
                        Self::ok("origin/main")
                    }
                }
                Some("rev-parse") if args.contains(&"--abbrev-ref") => Self::ok("main"),
                Some("rev-parse") => Self::ok("abc123"),
                Some("pull") | Some("fetch") if self.timeout_pull.contains(&repo) => {
                    return Err(GateError::Timeout { secs: 30 });
                }
                Some("pull") | Some("fetch") => Self::ok("Already up to date."),
                Some("rev-list") => Self::ok("0"),
                _ => Self::ok(""),
            };
            Ok(out)
        }
    }

    fn descriptors(count: usize) -> Vec<RepoDescriptor> {
        (0..count)
            .map(|i| RepoDescriptor {
                name: format!("repo-{i:02}"),
                root: PathBuf::from(format!("/fleet/repo-{i:02}")),
            })
            .collect()
    }

    fn options(concurrency: usize) -> RunOptions {
        let mut options = RunOptions::new(PathBuf::from("/fleet"));
        options.concurrency = concurrency;
        options
    }

    #[tokio::test]
    async fn concurrency_bound_is_never_exceeded() {
        let gateway = Arc::new(MockGateway::clean(10));
        let orchestrator = FleetOrchestrator::new(gateway.clone(), options(3));
        let (_tx, rx) = watch::channel(false);

        let report = orchestrator.run(descriptors(20), Vec::new(), rx, None).await;

        assert_eq!(report.outcomes.len(), 20);
        assert!(
            gateway.peak.load(Ordering::SeqCst) <= 3,
            "peak concurrent invocations {} exceeded the configured limit",
            gateway.peak.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn outcomes_come_back_in_discovery_order() {
        // enough repos and a real delay so completion order scrambles
        let gateway = Arc::new(MockGateway::clean(5));
        let orchestrator = FleetOrchestrator::new(gateway, options(8));
        let (_tx, rx) = watch::channel(false);

        let input = descriptors(16);
        let expected: Vec<PathBuf> = input.iter().map(|d| d.root.clone()).collect();
        let report = orchestrator.run(input, Vec::new(), rx, None).await;

        let got: Vec<PathBuf> = report.outcomes.iter().map(|o| o.repo.root.clone()).collect();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn cancellation_dispatches_nothing_new() {
        let gateway = Arc::new(MockGateway::clean(0));
        let orchestrator = FleetOrchestrator::new(gateway.clone(), options(2));
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let report = orchestrator.run(descriptors(6), Vec::new(), rx, None).await;

        assert!(report.cancelled);
        assert!(report.outcomes.is_empty());
        assert_eq!(report.summary.repos_found, 6);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn excluded_descriptor_is_terminal_without_git_calls() {
        let gateway = Arc::new(MockGateway::clean(0));
        let mut opts = options(2);
        opts.exclude_patterns.push("repo-0*".to_string());
        let orchestrator = FleetOrchestrator::new(gateway.clone(), opts);
        let (_tx, rx) = watch::channel(false);

        let report = orchestrator.run(descriptors(1), Vec::new(), rx, None).await;

        assert_eq!(report.outcomes[0].status, OutcomeStatus::SkippedExcluded);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_timed_out_repo_never_corrupts_its_neighbors() {
        let mut gateway = MockGateway::clean(0);
        gateway.timeout_pull.push(PathBuf::from("/fleet/repo-01"));
        let orchestrator = FleetOrchestrator::new(Arc::new(gateway), options(4));
        let (_tx, rx) = watch::channel(false);

        let report = orchestrator.run(descriptors(3), Vec::new(), rx, None).await;

        assert_eq!(report.outcomes[0].status, OutcomeStatus::UpToDate);
        assert_eq!(report.outcomes[1].status, OutcomeStatus::Failed);
        assert!(report.outcomes[1].message.contains("timed out"));
        assert_eq!(report.outcomes[2].status, OutcomeStatus::UpToDate);
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn dirty_and_no_upstream_repos_are_skipped() {
        let mut gateway = MockGateway::clean(0);
        gateway.dirty.push(PathBuf::from("/fleet/repo-00"));
        gateway.no_upstream.push(PathBuf::from("/fleet/repo-01"));
        let orchestrator = FleetOrchestrator::new(Arc::new(gateway), options(4));
        let (_tx, rx) = watch::channel(false);

        let report = orchestrator.run(descriptors(3), Vec::new(), rx, None).await;

        assert_eq!(report.outcomes[0].status, OutcomeStatus::SkippedDirty);
        assert_eq!(report.outcomes[1].status, OutcomeStatus::SkippedNoUpstream);
        assert_eq!(report.outcomes[2].status, OutcomeStatus::UpToDate);
        assert_eq!(report.summary.skipped, 2);
        assert_eq!(report.summary.up_to_date, 1);
        assert_eq!(report.summary.failed, 0);
    }
}
