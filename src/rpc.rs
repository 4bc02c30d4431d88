use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log};
use alloy_primitives::{Address, B256, Bytes};
use anyhow::Result;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_RETRIES: usize = 5;

/// Chain access as the scanner sees it. Production is [`RpcClient`]; tests
/// plug in an in-memory fake.
pub trait ChainClient {
    fn latest_block(&self) -> impl Future<Output = Result<u64>>;

    /// All logs for `address` matching `topic0` in `[from_block, to_block]`,
    /// inclusive on both ends.
    fn logs(
        &self,
        address: Address,
        topic0: B256,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<Log>>>;

    /// Deployed bytecode of `address` as of `block_number`; empty if the
    /// contract did not exist yet.
    fn code_at(&self, address: Address, block_number: u64) -> impl Future<Output = Result<Bytes>>;
}

/// HTTP JSON-RPC client over one or more endpoints. Rotates to the next
/// endpoint on error or timeout and retries with exponential backoff.
#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<AlloyFullProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String]) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            providers.push(ProviderBuilder::new().connect_http(parsed_url));
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn provider(&self) -> AlloyFullProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        self.providers[index].clone()
    }

    fn current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    fn rotate_provider(&self) {
        let next = (self.current_provider.load(Ordering::Relaxed) + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn retry_strategy() -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(MAX_RETRIES)
    }

    fn note_error(&self, error_str: &str) {
        warn!(
            "RPC error on {}: {}, rotating provider",
            self.current_url(),
            error_str
        );
        self.rotate_provider();
    }

    fn note_timeout(&self) -> anyhow::Error {
        warn!(
            "Request timeout after {} seconds on {}, rotating provider",
            REQUEST_TIMEOUT.as_secs(),
            self.current_url()
        );
        self.rotate_provider();
        anyhow::anyhow!(
            "Request timeout after {} seconds",
            REQUEST_TIMEOUT.as_secs()
        )
    }

    /// Runs one RPC call with timeout, endpoint rotation on failure, and
    /// bounded exponential backoff. The retried future has to own its state,
    /// hence the clones.
    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(AlloyFullProvider) -> Fut + Clone,
        Fut: Future<Output = alloy::transports::TransportResult<T>>,
    {
        let client = self.clone();
        Retry::spawn(Self::retry_strategy(), move || {
            let client = client.clone();
            let op = op.clone();
            async move {
                match timeout(REQUEST_TIMEOUT, op(client.provider())).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => {
                        client.note_error(&e.to_string());
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(client.note_timeout()),
                }
            }
        })
        .await
    }

    async fn logs_for_range(
        &self,
        address: Address,
        topic0: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>> {
        let client = self.clone();
        Retry::spawn(Self::retry_strategy(), move || {
            let client = client.clone();
            async move {
                let filter = Filter::new()
                    .address(address)
                    .event_signature(topic0)
                    .from_block(from_block)
                    .to_block(to_block);

                match timeout(REQUEST_TIMEOUT, client.provider().get_logs(&filter)).await {
                    Ok(Ok(logs)) => Ok(Ok(logs)),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();

                        if error_str.contains("exceeds max results") {
                            debug!(
                                "Max results exceeded for blocks {}-{}, will split range",
                                from_block, to_block
                            );
                            // provider hint, splitting helps but retrying as-is would not
                            Ok(Err(anyhow::anyhow!("{}", e)))
                        } else {
                            client.note_error(&error_str);
                            Err(anyhow::anyhow!("{}", e))
                        }
                    }
                    Err(_) => Err(client.note_timeout()),
                }
            }
        })
        .await
        .and_then(|r| r)
    }

    fn parse_max_results_error(error_str: &str) -> Option<(u64, u64)> {
        let re = Regex::new(r"retry with the range (\d+)-(\d+)").ok()?;
        let captures = re.captures(error_str)?;

        let from = captures.get(1)?.as_str().parse().ok()?;
        let to = captures.get(2)?.as_str().parse().ok()?;

        Some((from, to))
    }
}

impl ChainClient for RpcClient {
    async fn latest_block(&self) -> Result<u64> {
        self.with_retry(|provider| async move { provider.get_block_number().await })
            .await
    }

    async fn logs(
        &self,
        address: Address,
        topic0: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>> {
        let mut all_logs = Vec::new();
        let mut current_from = from_block;

        while current_from <= to_block {
            match self
                .logs_for_range(address, topic0, current_from, to_block)
                .await
            {
                Ok(logs) => {
                    all_logs.extend(logs);
                    break;
                }
                Err(e) => {
                    let error_str = e.to_string();
                    if !error_str.contains("exceeds max results") {
                        return Err(e);
                    }

                    let Some((suggested_from, suggested_to)) =
                        Self::parse_max_results_error(&error_str)
                    else {
                        return Err(e);
                    };

                    info!(
                        "Hit max results limit for blocks {}-{}, splitting at block {}",
                        current_from, to_block, suggested_to
                    );

                    let logs = self
                        .logs_for_range(address, topic0, suggested_from, suggested_to)
                        .await?;
                    all_logs.extend(logs);
                    current_from = suggested_to + 1;
                }
            }
        }

        Ok(all_logs)
    }

    async fn code_at(&self, address: Address, block_number: u64) -> Result<Bytes> {
        self.with_retry(|provider| async move {
            provider
                .get_code_at(address)
                .block_id(BlockNumberOrTag::Number(block_number).into())
                .await
        })
        .await
    }
}
