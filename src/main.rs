//! gitfleet: update every git working copy beneath a directory
//!
//! Scans a root for git repositories, classifies each one's safety state, and
//! pulls/fetches/rebases them concurrently. This binary is a thin wrapper: it
//! builds a `RunOptions` from flags and config files, hands it to the core
//! orchestrator, and renders the resulting `RunReport`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use gitfleet::core::{
    discover, load_options, FleetOrchestrator, ProgressObserver, Strategy,
};
use gitfleet::git::{ensure_git_available, GitProcessGateway};
use gitfleet::output::{self, FleetProgress};

#[derive(Parser, Debug)]
#[command(
    name = "gitfleet",
    version,
    about = "Update every git repository beneath a directory",
    after_help = "Examples:\n  \
        gitfleet                      # update repos under the current directory\n  \
        gitfleet ~/projects -j 8      # wider fan-out\n  \
        gitfleet --strategy fetch     # refresh remote refs, touch nothing\n  \
        gitfleet --stash              # update dirty repos behind a stash bracket\n  \
        gitfleet --exclude scratch    # prune directories by glob\n  \
        gitfleet --json               # machine-readable report"
)]
struct Cli {
    /// Root directory to scan
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Maximum directory depth to traverse (root = 0)
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Directory basename globs to exclude (repeatable)
    #[arg(long = "exclude", value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Update strategy to apply across the fleet
    #[arg(long, value_enum, value_name = "STRATEGY")]
    strategy: Option<Strategy>,

    /// Update repositories even when the working tree is dirty
    #[arg(long)]
    allow_dirty: bool,

    /// Stash local changes around the update and restore them afterwards
    #[arg(long)]
    stash: bool,

    /// Do not count untracked files as dirty
    #[arg(long)]
    untracked_ok: bool,

    /// Number of repositories to update concurrently
    #[arg(short = 'j', long, value_name = "N", conflicts_with = "sequential")]
    jobs: Option<usize>,

    /// Process repositories one at a time
    #[arg(long)]
    sequential: bool,

    /// Per-repository git timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Path to a YAML configuration file (skips the default locations)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit the report as JSON instead of human-readable output
    #[arg(long)]
    json: bool,

    /// Disable colored/animated output
    #[arg(long)]
    no_color: bool,

    /// Show debug-level detail
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors and summary only
    #[arg(short, long)]
    quiet: bool,
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_filter = if verbose {
        "gitfleet=debug"
    } else if quiet {
        "gitfleet=error"
    } else {
        "gitfleet=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(true)` when every repository ended in a success or skip
/// outcome; fatal preconditions surface as `Err` before any repository is
/// processed.
async fn run() -> Result<bool> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let mut options = load_options(cli.path.clone(), cli.config.as_deref())?;
    if let Some(depth) = cli.max_depth {
        options.max_depth = depth;
    }
    options.extend_excludes(cli.exclude.iter().cloned());
    if let Some(strategy) = cli.strategy {
        options.strategy = strategy;
    }
    if cli.allow_dirty {
        options.allow_dirty = true;
    }
    if cli.stash {
        options.use_stash = true;
    }
    if cli.untracked_ok {
        options.include_untracked = false;
    }
    if cli.jobs.is_some() || cli.sequential {
        options.concurrency = gitfleet::core::config::resolve_concurrency(cli.jobs, cli.sequential);
    }
    if let Some(timeout) = cli.timeout {
        options.timeout_seconds = timeout;
    }
    options.validate()?;

    // fatal precondition, checked once before any repository is touched
    ensure_git_available().await?;

    let plain = cli.no_color || cli.quiet || cli.json;
    if !cli.quiet && !cli.json {
        println!(
            "🔍 Scanning {} for git repositories...",
            options.root_path.display()
        );
    }

    let found = discover(
        &options.root_path,
        options.max_depth,
        &options.compiled_excludes(),
    )?;

    if found.repos.is_empty() {
        if cli.json {
            // an empty fleet still renders a valid report
            let report = gitfleet::core::RunReport::assemble(
                0,
                Vec::new(),
                found.warnings,
                false,
                Duration::ZERO,
            );
            println!("{}", output::render_json(&report)?);
        } else if !cli.quiet {
            println!("No git repositories found.");
        }
        return Ok(true);
    }

    if !cli.quiet && !cli.json {
        let noun = if found.repos.len() == 1 {
            "repository"
        } else {
            "repositories"
        };
        println!("🚀 Updating {} {}\n", found.repos.len(), noun);
    }

    // first Ctrl-C flips the flag; in-flight repositories finish so no stash
    // bracket is left half-applied
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupt received, letting in-flight repositories finish...");
            let _ = cancel_tx.send(true);
        }
    });

    let progress = Arc::new(FleetProgress::new(&found.repos, plain));
    let observer: Option<Arc<dyn ProgressObserver>> = if cli.json || cli.quiet {
        None
    } else {
        Some(progress.clone() as Arc<dyn ProgressObserver>)
    };

    let gateway = Arc::new(GitProcessGateway::new(Duration::from_secs(
        options.timeout_seconds,
    )));
    let orchestrator = FleetOrchestrator::new(gateway, options);
    let report = orchestrator
        .run(found.repos, found.warnings, cancel_rx, observer)
        .await;

    if cli.json {
        println!("{}", output::render_json(&report)?);
    } else {
        progress.finish();
        println!("\n{}", output::render_summary(&report));
        let details = output::render_details(&report);
        if !details.is_empty() {
            println!("\n{}", "━".repeat(70));
            println!("{}", details);
            println!("{}", "━".repeat(70));
        }
    }

    Ok(!report.has_failures())
}
