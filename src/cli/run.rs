//! One-shot evaluation pass.

use std::path::Path;

use crate::cli::Workspace;
use crate::error::Error;
use crate::watcher::{run_pass, GitCli, OutlineGenerator, PassContext};

/// Run the run command.
pub fn run(repo: &Path, force: bool) -> Result<(), Error> {
    let ws = Workspace::open(repo)?;
    let git = GitCli::new(&ws.root);
    let repository = ws.repository_key();
    let ctx = PassContext {
        repo_root: &ws.root,
        repository: &repository,
        git: &git,
        generator: &OutlineGenerator,
        db: &ws.db,
        config: &ws.config,
        force,
    };

    let report = run_pass(&ctx)?;
    match &report.head {
        None => println!("No commits yet."),
        Some(head) if report.outcomes.is_empty() && !report.marker_advanced => {
            println!("Already up to date at {}.", short(head));
        }
        Some(_) => println!("{}", report),
    }
    Ok(())
}

pub(crate) fn short(hash: &str) -> &str {
    hash.get(..10).unwrap_or(hash)
}
