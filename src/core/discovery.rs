//! Repository discovery
//!
//! Walks a directory tree looking for `.git` markers. Excluded and hidden
//! directories are pruned before they are opened, symlinks are never
//! followed, and unreadable subtrees are recorded as warnings rather than
//! aborting the scan.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use glob::Pattern;
use ignore::WalkBuilder;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::report::RepoDescriptor;

const UNKNOWN_REPO_NAME: &str = "repo";

#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("path does not exist: {0}")]
    RootMissing(PathBuf),
    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Discovery result: repository roots in lexicographic path order, plus
/// non-fatal warnings for paths that could not be read.
#[derive(Debug, Default)]
pub struct Discovery {
    pub repos: Vec<RepoDescriptor>,
    pub warnings: Vec<String>,
}

/// Check if a .git file (for submodules/worktrees) contains a gitdir reference
/// Only reads the first few lines for efficiency
fn is_git_file(path: &Path) -> bool {
    match fs::File::open(path) {
        Ok(file) => BufReader::new(file)
            .lines()
            .take(5)
            .filter_map(Result::ok)
            .any(|line| line.trim_start().starts_with("gitdir:")),
        Err(_) => false,
    }
}

fn is_excluded(name: &str, patterns: &[Pattern]) -> bool {
    patterns.iter().any(|pattern| pattern.matches(name))
}

/// Scans `root` for git repositories up to `max_depth` directory levels deep
/// (root = depth 0).
///
/// A directory containing a `.git` marker is emitted as a repository; the
/// walk never descends into the marker itself, but it does continue into the
/// rest of the work tree, so nested repositories are each reported
/// independently. Exclusion patterns are shell globs matched against
/// directory basenames and act as pruning rules: an excluded directory is
/// never opened, so its contents are invisible to the rest of the run.
pub fn discover(
    root: &Path,
    max_depth: usize,
    exclude_patterns: &[Pattern],
) -> Result<Discovery, DiscoverError> {
    if !root.exists() {
        return Err(DiscoverError::RootMissing(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(DiscoverError::NotADirectory(root.to_path_buf()));
    }
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    debug!(root = %root.display(), max_depth, "starting repository scan");

    // filter_entry needs 'static + Sync, so found roots travel out through a
    // shared side channel, same as the map the parallel walker variant uses
    let found: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
    let found_in_filter = Arc::clone(&found);
    let patterns: Vec<Pattern> = exclude_patterns.to_vec();

    let mut builder = WalkBuilder::new(&root);
    builder
        .standard_filters(false)
        .follow_links(false)
        // `.git` markers sit one level below the deepest directory we open
        .max_depth(Some(max_depth.saturating_add(1)))
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_str().unwrap_or("");

            if name == ".git" {
                let is_marker = entry.file_type().is_some_and(|ft| ft.is_dir())
                    || is_git_file(entry.path());
                if is_marker {
                    if let Some(repo_root) = entry.path().parent() {
                        if let Ok(mut roots) = found_in_filter.lock() {
                            roots.push(repo_root.to_path_buf());
                        }
                    }
                }
                // never descend into the metadata directory
                return false;
            }
            if is_excluded(name, &patterns) {
                return false;
            }
            // hidden directories other than the marker are skipped
            if name.starts_with('.') {
                return false;
            }
            true
        });

    let mut warnings = Vec::new();
    for result in builder.build() {
        if let Err(err) = result {
            warn!(%err, "skipping unreadable path during scan");
            warnings.push(err.to_string());
        }
    }

    let mut roots = found.lock().map(|guard| guard.clone()).unwrap_or_default();
    roots.sort();
    roots.dedup();

    let mut name_counts: HashMap<String, usize> = HashMap::new();
    let repos: Vec<RepoDescriptor> = roots
        .into_iter()
        .map(|path| {
            let base = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(UNKNOWN_REPO_NAME)
                .to_string();
            let count = name_counts.entry(base.clone()).or_insert(0);
            *count += 1;
            let name = if *count > 1 {
                format!("{base}-{count}")
            } else {
                base
            };
            RepoDescriptor { name, root: path }
        })
        .collect();

    info!(
        repos = repos.len(),
        warnings = warnings.len(),
        "repository scan complete"
    );
    Ok(Discovery { repos, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_file_detection_requires_gitdir_line() {
        let temp = tempfile::tempdir().unwrap();
        let linked = temp.path().join("linked");
        fs::write(&linked, "gitdir: ../.git/worktrees/linked\n").unwrap();
        assert!(is_git_file(&linked));

        let plain = temp.path().join("plain");
        fs::write(&plain, "just some text\n").unwrap();
        assert!(!is_git_file(&plain));

        assert!(!is_git_file(&temp.path().join("absent")));
    }

    #[test]
    fn exclusion_matches_shell_globs() {
        let patterns = vec![
            Pattern::new("node_modules").unwrap(),
            Pattern::new("*.bak").unwrap(),
        ];
        assert!(is_excluded("node_modules", &patterns));
        assert!(is_excluded("old.bak", &patterns));
        assert!(!is_excluded("src", &patterns));
    }

    #[test]
    fn missing_root_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let gone = temp.path().join("gone");
        assert!(matches!(
            discover(&gone, 10, &[]),
            Err(DiscoverError::RootMissing(_))
        ));

        let file = temp.path().join("file");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            discover(&file, 10, &[]),
            Err(DiscoverError::NotADirectory(_))
        ));
    }
}
