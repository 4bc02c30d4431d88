use anyhow::Result;
use pool_indexer::config::Config;
use pool_indexer::driver::{Driver, bootstrap_registry};
use pool_indexer::repository::Database;
use pool_indexer::rpc::RpcClient;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting intel pool indexer");

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("Factory address: {:?}", config.factory_address);
    info!("RPC URLs: {} endpoint(s) configured", config.rpc_urls.len());

    let db = Database::new(&config.database_url)?;
    info!("Database initialized");

    let client = RpcClient::new(&config.rpc_urls)?;
    info!("RPC client connected");

    let registry = bootstrap_registry(&client, &db, config.factory_address).await?;

    let driver = Driver::new(
        &client,
        &db,
        &registry,
        config.factory_address,
        config.poll_interval,
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    };

    if let Err(e) = driver.run(shutdown).await {
        error!("Indexer error: {}", e);
        return Err(e);
    }

    Ok(())
}
