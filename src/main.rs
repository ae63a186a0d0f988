//! docwatch - regenerate API docs only for significant changes.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use docwatch::cli::{self, Cli, Commands};
use docwatch::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Logs go to stderr so `analyze --json` output stays clean.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("docwatch=info")),
        )
        .init();

    let cli = Cli::parse();
    let repo = cli.repo.as_path();

    match cli.command {
        Commands::Init => cli::init::run(repo)?,
        Commands::Run { force } => cli::run::run(repo, force)?,
        Commands::Watch { interval } => cli::watch::run(repo, interval).await?,
        Commands::Analyze { old, new, json } => cli::analyze::run(repo, &old, &new, json)?,
        Commands::Status => cli::status::run(repo)?,
        Commands::Costs => cli::costs::run(repo)?,
        Commands::Cleanup => cli::cleanup::run(repo)?,
    }

    Ok(())
}
