use clap::Parser;
use fragment_store::{Config, StorageManager};

mod cli;

use cli::{execute_command, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::load(Config::resolve_path(cli.config.clone()))?;
    let storage = StorageManager::open(&config).await?;

    execute_command(&storage, cli.command).await
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
