use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 12; // roughly one Ethereum block

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_urls: Vec<String>,
    pub factory_address: Address,
    pub database_url: String,
    pub poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let rpc_urls_str = std::env::var("RPC_URLS")
            .context("RPC_URLS must be set in .env (comma separated list of endpoints)")?;

        let rpc_urls: Vec<String> = rpc_urls_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if rpc_urls.is_empty() {
            anyhow::bail!("RPC_URLS is set but contains no endpoints");
        }

        let factory_address_str = std::env::var("FACTORY_ADDRESS")
            .context("FACTORY_ADDRESS must be set in .env")?;

        let factory_address = Address::from_str(&factory_address_str)
            .context("Invalid FACTORY_ADDRESS format")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:./pool-indexer.db".to_string());

        let poll_interval = match std::env::var("POLL_INTERVAL_SECS") {
            Ok(s) => Duration::from_secs(
                s.parse().context("POLL_INTERVAL_SECS must be an integer")?,
            ),
            Err(_) => Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        };

        Ok(Config {
            rpc_urls,
            factory_address,
            database_url,
            poll_interval,
        })
    }
}
