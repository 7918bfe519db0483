use fragment_store::{Config, StorageManager};
use tracing::info;

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::load(Config::resolve_path(None))?;
    let storage = StorageManager::open(&config).await?;
    info!(min_fragments = config.coordinator.min_fragments, "starting api server");

    server::build(storage)
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("server failed: {}", e))?;
    Ok(())
}
