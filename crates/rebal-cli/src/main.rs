mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, port, store_path } => commands::serve(bind, port, store_path).await,
        Command::Rebalance { table, config, realtime, tiers } => {
            commands::rebalance(table, config, realtime, tiers, cli.remote, cli.token).await
        }
        Command::Demo { segments, servers, replicas } => {
            commands::demo(segments, servers, replicas).await
        }
    }
}
