//! # gitfleet
//!
//! `gitfleet` keeps fleets of Git working copies current. It discovers every
//! repository beneath a root directory, classifies each one's safety state
//! (dirty tree, detached HEAD, missing upstream), and applies a pull, fetch,
//! or rebase across the fleet under a bounded concurrency limit.
//!
//! ## Core Guarantees
//!
//! - **Safety first**: uncommitted work is never touched unless explicitly
//!   allowed or bracketed by a stash.
//! - **Isolation**: one repository's failure never corrupts another's outcome.
//! - **Bounded fan-out**: at most `concurrency` git processes run at once.
//! - **Deterministic reports**: outcomes are returned in discovery order,
//!   independent of completion order.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use gitfleet::core::{discover, FleetOrchestrator, RunOptions};
//! use gitfleet::git::GitProcessGateway;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = RunOptions::new("/home/me/projects".into());
//!     let found = discover(
//!         &options.root_path,
//!         options.max_depth,
//!         &options.compiled_excludes(),
//!     )
//!     .unwrap();
//!
//!     let gateway = Arc::new(GitProcessGateway::new(Duration::from_secs(30)));
//!     let (_cancel_tx, cancel_rx) = watch::channel(false);
//!     let report = FleetOrchestrator::new(gateway, options)
//!         .run(found.repos, found.warnings, cancel_rx, None)
//!         .await;
//!
//!     for outcome in &report.outcomes {
//!         println!("{}: {}", outcome.repo.root.display(), outcome.message);
//!     }
//! }
//! ```

pub mod core;
pub mod git;
pub mod output;
