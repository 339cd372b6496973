//! ota - over-the-air package metadata

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ota_cli::cmd;
use ota_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = cmd::config::Overrides {
        file: cli.config.as_deref(),
        base_url: cli.base_url.as_deref(),
        root: cli.root.as_deref(),
    };

    match &cli.command {
        Commands::Inspect { path, group, json } => {
            let config = settings.resolve()?;
            cmd::inspect::inspect(config, path, group, *json).await
        }
        Commands::Decode { file, json } => cmd::decode::decode(file, *json),
        Commands::Config => cmd::config::show(&settings.resolve()?),
    }
}
