//! Counter-asset chain provider with multi-RPC support and automatic failover

use crate::error::{CoordinatorError, CoordinatorResult};

use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// How often a pending receipt is polled
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Chain id reported by the RPC, 0 until known
    chain_id: AtomicU64,
}

impl ChainProvider {
    /// Create a provider over every parseable RPC URL
    pub fn new(rpc_urls: &[String]) -> CoordinatorResult<Self> {
        let mut http_providers = Vec::new();

        for url in rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider.interval(Duration::from_millis(500)));
                    debug!("Added counter-asset RPC provider: {}", url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(CoordinatorError::ChainConnection {
                chain_id: 0,
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            http_providers,
            current_provider: AtomicUsize::new(0),
            chain_id: AtomicU64::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Counter-asset chain failover to provider {}", next);
    }

    /// Last chain id learned from the RPC
    pub fn chain_id(&self) -> u64 {
        self.chain_id.load(Ordering::Relaxed)
    }

    /// Ask the RPC which network it serves, with failover
    pub async fn fetch_chain_id(&self) -> CoordinatorResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_chainid().await {
                Ok(id) => {
                    let id = id.as_u64();
                    self.chain_id.store(id, Ordering::Relaxed);
                    return Ok(id);
                }
                Err(e) => {
                    warn!("Failed to get chain id: {}", e);
                    self.failover();
                }
            }
        }

        Err(CoordinatorError::ChainConnection {
            chain_id: self.chain_id(),
            message: "All providers failed".to_string(),
        })
    }

    /// Get current block number with failover
    pub async fn get_block_number(&self) -> CoordinatorResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!("Failed to get block number: {}", e);
                    self.failover();
                }
            }
        }

        Err(CoordinatorError::ChainConnection {
            chain_id: self.chain_id(),
            message: "All providers failed".to_string(),
        })
    }

    /// Get transaction receipt
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> CoordinatorResult<Option<TransactionReceipt>> {
        self.http()
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| CoordinatorError::ChainConnection {
                chain_id: self.chain_id(),
                message: e.to_string(),
            })
    }

    /// Poll until the transaction is mined with enough confirmations
    pub async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        confirmation_blocks: u64,
        timeout: Duration,
    ) -> CoordinatorResult<TransactionReceipt> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    if receipt.status == Some(U64::zero()) {
                        error!("Transaction {:?} reverted", tx_hash);
                        return Err(CoordinatorError::Reverted {
                            chain_id: self.chain_id(),
                            tx_hash: format!("{:?}", tx_hash),
                        });
                    }

                    let mined_at = receipt.block_number.map(|b| b.as_u64()).unwrap_or(0);
                    let current = self.get_block_number().await?;
                    let confirmations = current.saturating_sub(mined_at) + 1;
                    if confirmations >= confirmation_blocks {
                        debug!("Transaction {:?} confirmed ({} blocks)", tx_hash, confirmations);
                        return Ok(receipt);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Receipt lookup for {:?} failed: {}", tx_hash, e);
                    self.failover();
                }
            }

            if Instant::now() + RECEIPT_POLL_INTERVAL > deadline {
                return Err(CoordinatorError::Timeout {
                    operation: format!("confirmation of {:?}", tx_hash),
                });
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_at_least_one_valid_url() {
        assert!(ChainProvider::new(&[]).is_err());
        assert!(ChainProvider::new(&["not a url".to_string()]).is_err());
    }

    #[test]
    fn test_failover_rotates_providers() {
        let provider = ChainProvider::new(&[
            "http://localhost:8545".to_string(),
            "http://localhost:8546".to_string(),
        ])
        .unwrap();
        assert_eq!(provider.current_provider.load(Ordering::Relaxed), 0);
        provider.failover();
        assert_eq!(provider.current_provider.load(Ordering::Relaxed), 1);
        provider.failover();
        assert_eq!(provider.current_provider.load(Ordering::Relaxed), 0);
    }
}
