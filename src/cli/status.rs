//! Store statistics and commit marker.

use std::path::Path;

use crate::cli::run::short;
use crate::cli::Workspace;
use crate::error::Error;

/// Run the status command.
pub fn run(repo: &Path) -> Result<(), Error> {
    let ws = Workspace::open(repo)?;
    let stats = ws.db.stats()?;

    println!("Repository:  {}", ws.root.display());
    match ws.db.commit_marker(&ws.repository_key())? {
        Some(marker) => println!(
            "Last commit: {} ({})",
            short(&marker.commit_hash),
            marker.updated_at
        ),
        None => println!("Last commit: none (next run evaluates every file)"),
    }
    println!("Tracked files:      {}", stats.tracked_files);
    println!("Documented symbols: {}", stats.documented_symbols);
    println!("Cached analyses:    {}", stats.analyses_cached);
    println!("Usage entries:      {}", stats.usage_entries);
    if let Some(updated) = stats.last_updated {
        println!("Last documented:    {}", updated);
    }
    Ok(())
}
