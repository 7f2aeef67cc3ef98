mod cli;
mod config;
mod error;
mod game_launcher;
mod host;
mod ini;
mod launcher;
mod migrate;
mod planner;
mod preferences;
#[cfg(not(windows))]
mod prefix;
mod probe;
mod registry;
mod resolver;
#[cfg(test)]
mod test_support;
mod update;
mod version;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    cli.execute().await
}
