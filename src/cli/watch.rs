//! Poll the repository and run a pass whenever HEAD moves.

use std::path::Path;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::cli::Workspace;
use crate::error::Error;
use crate::watcher::{run_pass, run_watch, GitCli, OutlineGenerator, PassContext};

/// Run the watch command until Ctrl-C.
pub async fn run(repo: &Path, interval: Option<u64>) -> Result<(), Error> {
    let ws = Workspace::open(repo)?;
    let git = GitCli::new(&ws.root);
    let repository = ws.repository_key();
    let interval = Duration::from_secs(interval.unwrap_or(ws.config.watcher.poll_interval_secs));

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, finishing current pass");
            let _ = tx.send(true);
        }
    });

    let ctx = PassContext {
        repo_root: &ws.root,
        repository: &repository,
        git: &git,
        generator: &OutlineGenerator,
        db: &ws.db,
        config: &ws.config,
        force: false,
    };
    println!(
        "Watching {} every {}s (Ctrl-C to stop)",
        ws.root.display(),
        interval.as_secs()
    );
    let passes = run_watch(interval, rx, || run_pass(&ctx)).await?;
    println!("Stopped after {} passes.", passes);
    Ok(())
}
