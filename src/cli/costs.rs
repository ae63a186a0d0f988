//! Token usage and cost totals from the usage ledger.

use std::path::Path;

use crate::cli::Workspace;
use crate::error::Error;

/// Run the costs command.
pub fn run(repo: &Path) -> Result<(), Error> {
    let ws = Workspace::open(repo)?;
    let stats = ws.db.cost_stats()?;

    if stats.calls == 0 {
        println!("No generation calls recorded.");
        return Ok(());
    }

    println!(
        "{:<32} {:>6} {:>12} {:>12} {:>10}",
        "model", "calls", "input", "output", "cost"
    );
    for model in &stats.by_model {
        println!(
            "{:<32} {:>6} {:>12} {:>12} {:>10.4}",
            model.model, model.calls, model.input_tokens, model.output_tokens, model.cost
        );
    }
    println!(
        "{:<32} {:>6} {:>12} {:>12} {:>10.4}",
        "total", stats.calls, stats.input_tokens, stats.output_tokens, stats.total_cost
    );
    Ok(())
}
