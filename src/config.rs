//! Configuration management for docwatch.
//!
//! Read from `<repo>/.docwatch/config.toml`; a missing file means defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::ScoringPolicy;
use crate::error::Error;

/// Directory holding config and state, relative to the repository root.
pub const STATE_DIR: &str = ".docwatch";

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub docs: DocsConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub scoring: ScoringPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Source file extensions to track, without the dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Path prefixes (relative to the repo root) that are never tracked.
    #[serde(default = "default_exclude_paths")]
    pub exclude_paths: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            extensions: default_extensions(),
            exclude_paths: default_exclude_paths(),
        }
    }
}

impl WatcherConfig {
    /// Whether a repo-relative path should be tracked.
    pub fn matches(&self, rel_path: &str) -> bool {
        let rel_path = rel_path.trim_start_matches("./");
        if self
            .exclude_paths
            .iter()
            .any(|prefix| rel_path.starts_with(prefix.as_str()))
        {
            return false;
        }
        Path::new(rel_path)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocsConfig {
    /// Where generated Markdown lands, relative to the repo root.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl DocsConfig {
    /// `src/Foo.php` maps to `<output_dir>/src/Foo.md`.
    pub fn doc_path_for(&self, rel_path: &str) -> PathBuf {
        Path::new(&self.output_dir)
            .join(rel_path.trim_start_matches("./"))
            .with_extension("md")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file, relative to the repo root unless absolute.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

fn default_extensions() -> Vec<String> {
    vec!["php".to_string()]
}

fn default_exclude_paths() -> Vec<String> {
    ["vendor/", "node_modules/", ".git/", ".docwatch/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_output_dir() -> String {
    "docs/api".to_string()
}

fn default_store_path() -> String {
    format!("{}/state.db", STATE_DIR)
}

impl Config {
    /// Config file path for a repository.
    pub fn path(repo_root: &Path) -> PathBuf {
        repo_root.join(STATE_DIR).join(CONFIG_FILE)
    }

    /// Load config, falling back to defaults when no file exists.
    pub fn load(repo_root: &Path) -> Result<Self, Error> {
        let path = Self::path(repo_root);
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Write config to `<repo>/.docwatch/config.toml`.
    pub fn save(&self, repo_root: &Path) -> Result<(), Error> {
        let path = Self::path(repo_root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn store_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.store.path)
    }
}
