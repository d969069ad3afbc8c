//! Git process execution gateway
//!
//! Every interaction with the external `git` binary funnels through this
//! module. Arguments are passed as a literal vector (no shell interpretation,
//! so branch or path names with special characters cannot inject commands),
//! every invocation is bounded by a timeout, and a child that overruns the
//! bound is killed.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

const TOOL_PROBE_TIMEOUT_SECS: u64 = 5;

/// Captured result of one git invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    /// Combined stdout and stderr, for matching error signatures that git
    /// prints to either stream depending on the subcommand.
    pub fn combined(&self) -> String {
        if self.stdout.is_empty() {
            self.stderr.clone()
        } else if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{} {}", self.stdout, self.stderr)
        }
    }
}

/// Failures of the gateway itself, as opposed to git exiting non-zero.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("git is not installed or not found in PATH")]
    ToolNotFound,
    #[error("git operation timed out after {secs} seconds")]
    Timeout { secs: u64 },
    #[error("failed to run git: {0}")]
    Spawn(std::io::Error),
}

/// Abstraction over git execution so the inspector, executor, and
/// orchestrator can be driven by an instrumented gateway in tests.
#[async_trait]
pub trait GitGateway: Send + Sync {
    /// Runs `git <args>` with `repo` as the working directory.
    async fn run(&self, repo: &Path, args: &[&str]) -> Result<GitOutput, GateError>;
}

/// Gateway backed by the real `git` binary.
pub struct GitProcessGateway {
    timeout: Duration,
}

impl GitProcessGateway {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl GitGateway for GitProcessGateway {
    async fn run(&self, repo: &Path, args: &[&str]) -> Result<GitOutput, GateError> {
        let child = Command::new("git")
            .args(args)
            .current_dir(repo)
            .stdin(Stdio::null())
            // dropping the future on timeout must not leave the child running
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => Ok(GitOutput {
                success: output.status.success(),
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Err(GateError::ToolNotFound),
            Ok(Err(e)) => Err(GateError::Spawn(e)),
            Err(_) => Err(GateError::Timeout {
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

/// Probes for the git binary with `git --version`.
///
/// Checked once at startup: a missing tool is a fatal precondition for the
/// whole run, not a per-repository error.
pub async fn ensure_git_available() -> Result<(), GateError> {
    let probe = Command::new("git")
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match tokio::time::timeout(Duration::from_secs(TOOL_PROBE_TIMEOUT_SECS), probe).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(_)) => Err(GateError::ToolNotFound),
        Ok(Err(_)) => Err(GateError::ToolNotFound),
        Err(_) => Err(GateError::Timeout {
            secs: TOOL_PROBE_TIMEOUT_SECS,
        }),
    }
}
