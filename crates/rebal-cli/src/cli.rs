use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "rebal",
    about = "Trigger and observe table segment rebalances",
    version
)]
pub struct Cli {
    /// Talk to a running rebal-api server instead of running in-process.
    #[arg(long, env = "REBAL_URL", global = true)]
    pub remote: Option<String>,

    /// Bearer token for --remote requests.
    #[arg(long, env = "REBAL_TOKEN", global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP trigger server.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// Path to a redb file; an in-memory store is used if omitted.
        #[arg(long)]
        store_path: Option<PathBuf>,
    },

    /// Trigger a rebalance for one table.
    Rebalance {
        table: String,
        /// Path to a YAML or JSON rebalance config.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        realtime: bool,
        #[arg(long, value_delimiter = ',')]
        tiers: Vec<String>,
    },

    /// Seed an in-memory cluster and run a full rebalance against it,
    /// printing each step's placement. No network service involved.
    Demo {
        #[arg(long, default_value_t = 4)]
        segments: u32,
        #[arg(long, default_value_t = 3)]
        servers: u32,
        #[arg(long, default_value_t = 2)]
        replicas: u32,
    },
}
