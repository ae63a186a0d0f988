//! CLI commands for docwatch.

pub mod analyze;
pub mod cleanup;
pub mod costs;
pub mod gitignore;
pub mod init;
pub mod run;
pub mod status;
pub mod watch;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::db::Database;
use crate::error::Error;

/// docwatch - decide which changed files need their API docs regenerated
#[derive(Parser)]
#[command(name = "docwatch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Repository root
    #[arg(long, global = true, default_value = ".")]
    pub repo: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create config and state store for a repository
    Init,

    /// Run one evaluation pass over files changed since the last pass
    Run {
        /// Regenerate every tracked file, bypassing hashes and scoring
        #[arg(long)]
        force: bool,
    },

    /// Poll for new commits and run a pass for each
    Watch {
        /// Seconds between polls (overrides config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Score the change between two versions of a file
    Analyze {
        /// Old version
        old: PathBuf,

        /// New version
        new: PathBuf,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show store statistics and the commit marker
    Status,

    /// Show token usage and cost totals
    Costs,

    /// Drop ledger entries for files deleted from disk
    Cleanup,
}

/// An opened repository: resolved root, loaded config and store.
pub struct Workspace {
    pub root: PathBuf,
    pub config: Config,
    pub db: Database,
}

impl Workspace {
    pub fn open(repo: &Path) -> Result<Self, Error> {
        let root = repo.canonicalize().map_err(|e| Error::read(repo, e))?;
        let config = Config::load(&root)?;
        let db = Database::open(&config.store_path(&root))?;
        Ok(Self { root, config, db })
    }

    /// Commit-marker key for this repository.
    pub fn repository_key(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }
}
