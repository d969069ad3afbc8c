//! Run options, defaults, and layered file configuration
//!
//! Configuration is merged from four layers, lowest priority first: built-in
//! defaults, the user config file (`~/.config/gitfleet/config.yaml`), a local
//! `.gitfleet.yaml` under the scan root, and command-line flags. Scalar values
//! replace; exclude-pattern lists extend without duplicates.

use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use serde::Deserialize;
use thiserror::Error;

use crate::core::update::Strategy;

// Defaults applied before any config layer
pub const DEFAULT_MAX_DEPTH: usize = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// Concurrency cap for the smart default; git operations are I/O-bound, so the
// limit tracks desired process parallelism rather than core count alone.
pub const CONCURRENT_CAP: usize = 12;

pub const LOCAL_CONFIG_FILE: &str = ".gitfleet.yaml";

// Directory names excluded from discovery unless overridden
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "node_modules",
    "venv",
    ".venv",
    "__pycache__",
    ".tox",
    "build",
    "dist",
    "target",
];

// Display formatting constants
pub const ERROR_MESSAGE_MAX_LENGTH: usize = 160;
pub const ERROR_MESSAGE_TRUNCATE_LENGTH: usize = 157;
pub const PATH_DISPLAY_WIDTH: usize = 40;

/// Determines the concurrency limit for git operations
///
/// Priority order:
/// 1. --sequential flag → 1
/// 2. --jobs N flag → N
/// 3. Smart default → min(CPU_CORES + 2, 12)
pub fn resolve_concurrency(jobs: Option<usize>, sequential: bool) -> usize {
    if sequential {
        return 1;
    }
    if let Some(n) = jobs {
        return n.max(1);
    }
    (num_cpus::get() + 2).min(CONCURRENT_CAP)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error reading configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("error parsing YAML file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("configuration file not found: {0}")]
    Missing(PathBuf),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything the core needs for one fleet run. Built by the CLI layer,
/// consumed by [`FleetOrchestrator`](crate::core::FleetOrchestrator); the
/// core carries no ambient state beyond this.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub root_path: PathBuf,
    pub max_depth: usize,
    pub exclude_patterns: Vec<String>,
    pub strategy: Strategy,
    pub allow_dirty: bool,
    pub use_stash: bool,
    /// Whether untracked files count as dirty. On by default: an untracked
    /// file is uncommitted work the safety policy must protect.
    pub include_untracked: bool,
    pub concurrency: usize,
    pub timeout_seconds: u64,
}

impl RunOptions {
    /// Options for `root` with built-in defaults, before any config layer.
    pub fn new(root: PathBuf) -> Self {
        Self {
            root_path: root,
            max_depth: DEFAULT_MAX_DEPTH,
            exclude_patterns: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            strategy: Strategy::Pull,
            allow_dirty: false,
            use_stash: false,
            include_untracked: true,
            concurrency: resolve_concurrency(None, false),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Adds patterns that are not already present, preserving order.
    pub fn extend_excludes<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for pattern in patterns {
            let pattern = pattern.into();
            if !self.exclude_patterns.contains(&pattern) {
                self.exclude_patterns.push(pattern);
            }
        }
    }

    /// Compiles the exclude patterns, dropping any that failed validation.
    pub fn compiled_excludes(&self) -> Vec<Pattern> {
        self.exclude_patterns
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth < 1 {
            return Err(ConfigError::Invalid(
                "max_depth must be a positive integer".to_string(),
            ));
        }
        if self.timeout_seconds < 1 {
            return Err(ConfigError::Invalid(
                "timeout_seconds must be a positive integer".to_string(),
            ));
        }
        if self.concurrency < 1 {
            return Err(ConfigError::Invalid(
                "concurrency must be a positive integer".to_string(),
            ));
        }
        for pattern in &self.exclude_patterns {
            if Pattern::new(pattern).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "invalid exclude pattern: {pattern}"
                )));
            }
        }
        Ok(())
    }
}

/// Subset of [`RunOptions`] that may come from a YAML config file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub max_depth: Option<usize>,
    pub exclude_patterns: Vec<String>,
    pub strategy: Option<Strategy>,
    pub allow_dirty: Option<bool>,
    pub use_stash: Option<bool>,
    pub include_untracked: Option<bool>,
    pub concurrency: Option<usize>,
    pub timeout_seconds: Option<u64>,
}

impl FileConfig {
    /// Loads a config file. A missing or empty file yields `None`.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_yaml::from_str(&text)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Folds this layer into `options`: scalars replace, exclude lists extend.
    pub fn apply(&self, options: &mut RunOptions) {
        if let Some(depth) = self.max_depth {
            options.max_depth = depth;
        }
        if let Some(strategy) = self.strategy {
            options.strategy = strategy;
        }
        if let Some(allow_dirty) = self.allow_dirty {
            options.allow_dirty = allow_dirty;
        }
        if let Some(use_stash) = self.use_stash {
            options.use_stash = use_stash;
        }
        if let Some(include_untracked) = self.include_untracked {
            options.include_untracked = include_untracked;
        }
        if let Some(concurrency) = self.concurrency {
            options.concurrency = concurrency;
        }
        if let Some(timeout) = self.timeout_seconds {
            options.timeout_seconds = timeout;
        }
        options.extend_excludes(self.exclude_patterns.iter().cloned());
    }
}

/// Path of the user-level config file, XDG aware.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gitfleet").join("config.yaml"))
}

/// Builds options for `root` from defaults plus the file layers.
///
/// With `explicit_config` the default locations are ignored and the named
/// file must exist. CLI flags are merged by the caller on top of the result.
pub fn load_options(root: PathBuf, explicit_config: Option<&Path>) -> Result<RunOptions, ConfigError> {
    let mut options = RunOptions::new(root);

    if let Some(path) = explicit_config {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        if let Some(config) = FileConfig::load(path)? {
            config.apply(&mut options);
        }
        return Ok(options);
    }

    if let Some(user_path) = user_config_path() {
        if let Some(config) = FileConfig::load(&user_path)? {
            config.apply(&mut options);
        }
    }
    let local_path = options.root_path.join(LOCAL_CONFIG_FILE);
    if let Some(config) = FileConfig::load(&local_path)? {
        config.apply(&mut options);
    }
    Ok(options)
}
