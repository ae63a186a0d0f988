//! Remove ledger entries for deleted files.

use std::path::Path;

use crate::cli::Workspace;
use crate::error::Error;

/// Run the cleanup command.
pub fn run(repo: &Path) -> Result<(), Error> {
    let ws = Workspace::open(repo)?;
    let removed = ws.db.cleanup()?;
    println!("Removed {} stale entries.", removed);
    Ok(())
}
