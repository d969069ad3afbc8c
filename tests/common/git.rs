//! Git testing utilities

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Runs a git command in `dir`, failing on non-zero exit.
pub fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git").args(args).current_dir(dir).output()?;
    if !output.status.success() {
        anyhow::bail!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Checks if git is available in the system
pub fn is_git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Configures the test identity on an existing repository
pub fn configure_git_user(path: &Path) -> Result<()> {
    git(path, &["config", "user.name", "Test User"])?;
    git(path, &["config", "user.email", "test@example.com"])?;
    // Disable commit signing for tests
    git(path, &["config", "commit.gpgsign", "false"])?;
    // merge pulls so conflict scenarios produce real merge conflicts
    git(path, &["config", "pull.rebase", "false"])?;
    Ok(())
}

/// Sets up a git repository with user config
pub fn setup_git_repo(path: &Path) -> Result<()> {
    let init = Command::new("git")
        .args(["init"])
        .current_dir(path)
        .output()?;
    if !init.status.success() {
        anyhow::bail!("Git not available - skipping test");
    }
    configure_git_user(path)
}

/// Creates a test commit in the repository
pub fn create_test_commit(
    path: &Path,
    file_name: &str,
    content: &str,
    message: &str,
) -> Result<()> {
    std::fs::write(path.join(file_name), content)?;
    git(path, &["add", file_name])?;
    git(path, &["commit", "-m", message])?;
    Ok(())
}

/// Creates a bare upstream under `bare_dir` plus a working clone under
/// `work_dir`, with tracking configured and one initial commit pushed.
/// Keep `bare_dir` outside any tree the test scans.
pub fn setup_cloned_repo(bare_dir: &Path, work_dir: &Path, name: &str) -> Result<PathBuf> {
    let bare = bare_dir.join(format!("{name}.git"));
    std::fs::create_dir_all(&bare)?;
    git(&bare, &["init", "--bare"])?;
    // pin the default branch so clones agree regardless of host git config
    git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"])?;

    let bare_url = bare.to_str().expect("bare path is valid utf-8").to_string();
    let clone = work_dir.join(name);
    git(work_dir, &["clone", &bare_url, name])?;
    git(&clone, &["symbolic-ref", "HEAD", "refs/heads/main"])?;
    configure_git_user(&clone)?;
    create_test_commit(&clone, "README.md", "# fleet test\n", "initial commit")?;
    git(&clone, &["push", "-u", "origin", "main"])?;
    Ok(clone)
}

/// Adds a commit to `bare` through a throwaway side clone, leaving existing
/// clones of it one commit behind their upstream.
pub fn advance_upstream(bare: &Path, file_name: &str, content: &str) -> Result<()> {
    let scratch = tempfile::tempdir()?;
    let bare_url = bare.to_str().expect("bare path is valid utf-8").to_string();
    git(scratch.path(), &["clone", &bare_url, "writer"])?;
    let writer = scratch.path().join("writer");
    configure_git_user(&writer)?;
    create_test_commit(&writer, file_name, content, "upstream change")?;
    git(&writer, &["push", "origin", "HEAD"])?;
    Ok(())
}
