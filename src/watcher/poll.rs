//! Sleep-poll loop around [`run_pass`](super::pass::run_pass).

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info};

use crate::error::Error;
use crate::watcher::pass::PassReport;

/// Run `pass` every `interval` until `shutdown` turns true.
///
/// Shutdown is only observed between passes, never mid-pass. A failed pass
/// is logged and retried on the next tick. Returns the number of passes run.
pub async fn run_watch<F>(
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut pass: F,
) -> Result<usize, Error>
where
    F: FnMut() -> Result<PassReport, Error>,
{
    info!(interval_secs = interval.as_secs(), "Starting watch loop");
    let mut passes = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        match pass() {
            Ok(report) if report.outcomes.is_empty() => {}
            Ok(report) => info!(
                processed = report.processed(),
                skipped = report.skipped(),
                errors = report.errors(),
                "Watch pass finished"
            ),
            Err(e) => error!(error = %e, "Watch pass failed, commit marker not advanced"),
        }
        passes += 1;

        tokio::select! {
            _ = sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!(passes, "Watch loop stopped");
    Ok(passes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_before_first_pass() {
        let (tx, rx) = watch::channel(true);
        let passes = run_watch(Duration::from_millis(10), rx, || {
            panic!("pass must not run after shutdown")
        })
        .await
        .unwrap();
        assert_eq!(passes, 0);
        drop(tx);
    }

    #[tokio::test]
    async fn test_shutdown_between_passes() {
        let (tx, rx) = watch::channel(false);
        let passes = run_watch(Duration::from_secs(3600), rx, || {
            // Signal arrives while this pass runs; the loop stops after it.
            tx.send(true).unwrap();
            Ok(PassReport::default())
        })
        .await
        .unwrap();
        assert_eq!(passes, 1);
    }

    #[tokio::test]
    async fn test_failed_pass_keeps_looping() {
        let (tx, rx) = watch::channel(false);
        let mut calls = 0;
        let passes = run_watch(Duration::from_millis(1), rx, || {
            calls += 1;
            if calls == 3 {
                tx.send(true).unwrap();
            }
            Err(Error::other("boom"))
        })
        .await
        .unwrap();
        assert_eq!(passes, 3);
    }
}
