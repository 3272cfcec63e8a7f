//! Counter-asset wallet: signs and submits lock and close transactions

use super::payload::{ClosePayload, LockPayload};
use crate::chain::ChainProvider;
use crate::config::CounterWalletConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::wallet::{CounterAssetWallet, CounterConnection, TxHash};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{error, info, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// EVM wallet holding a local key for the counter-asset network
pub struct EvmCounterWallet {
    provider: Option<Arc<ChainProvider>>,
    wallet: Option<LocalWallet>,
    confirmation_blocks: u64,
    confirmation_timeout: Duration,
    state: watch::Sender<CounterConnection>,
}

impl EvmCounterWallet {
    /// Load the key and ask the RPC for its chain id; either missing leaves the wallet disconnected
    pub async fn connect(
        config: &CounterWalletConfig,
        confirmation_timeout: Duration,
    ) -> CoordinatorResult<Self> {
        let wallet = Self::load_wallet(config)?;

        let provider = match ChainProvider::new(&config.rpc_urls) {
            Ok(p) => Some(Arc::new(p)),
            Err(e) => {
                warn!("Counter-asset provider unavailable: {}", e);
                None
            }
        };

        let mut connection = CounterConnection::Disconnected;
        if let (Some(wallet), Some(provider)) = (&wallet, &provider) {
            match provider.fetch_chain_id().await {
                Ok(chain_id) => {
                    connection = CounterConnection::Connected {
                        address: format!("{:?}", wallet.address()),
                        chain_id,
                    };
                    info!(
                        "Counter-asset wallet {:?} connected to chain {}",
                        wallet.address(),
                        chain_id
                    );
                }
                Err(e) => warn!("Counter-asset wallet not connected: {}", e),
            }
        }
        let (state, _) = watch::channel(connection);

        Ok(Self {
            provider,
            wallet,
            confirmation_blocks: config.confirmation_blocks.max(1),
            confirmation_timeout,
            state,
        })
    }

    /// Load wallet from the configured environment variable
    fn load_wallet(config: &CounterWalletConfig) -> CoordinatorResult<Option<LocalWallet>> {
        let Some(var) = config.private_key_env.as_deref() else {
            return Ok(None);
        };
        match std::env::var(var) {
            Ok(key) if !key.is_empty() => key
                .parse::<LocalWallet>()
                .map(Some)
                .map_err(|e| CoordinatorError::Wallet(format!("Invalid private key: {}", e))),
            _ => {
                warn!("{} is not set - counter-asset wallet disconnected", var);
                Ok(None)
            }
        }
    }

    fn signer(&self) -> CoordinatorResult<(LocalWallet, Arc<ChainProvider>, u64)> {
        let chain_id = self.state.borrow().chain_id();
        match (&self.wallet, &self.provider, chain_id) {
            (Some(wallet), Some(provider), Some(chain_id)) => {
                Ok((wallet.clone().with_chain_id(chain_id), provider.clone(), chain_id))
            }
            _ => Err(CoordinatorError::Wallet(
                "Counter-asset wallet is not connected".to_string(),
            )),
        }
    }

    /// Sign once and broadcast; no retry
    async fn send(&self, tx: TransactionRequest) -> CoordinatorResult<TxHash> {
        let (wallet, provider, chain_id) = self.signer()?;
        let client = SignerMiddleware::new(provider.http().clone(), wallet);

        let sent = timeout(SEND_TIMEOUT, client.send_transaction(tx, None)).await;
        let result = match sent {
            Ok(Ok(pending)) => {
                let tx_hash = pending.tx_hash();
                info!("Transaction sent on chain {}: {:?}", chain_id, tx_hash);
                Ok(TxHash(format!("{:?}", tx_hash)))
            }
            Ok(Err(e)) => {
                let message = e.to_string();
                error!("Transaction rejected on chain {}: {}", chain_id, message);
                Err(classify_send_error(chain_id, message))
            }
            Err(_) => Err(CoordinatorError::Timeout {
                operation: "send transaction".to_string(),
            }),
        };
        result
    }
}

/// Keep the wallet/RPC message verbatim, only picking the variant
fn classify_send_error(chain_id: u64, message: String) -> CoordinatorError {
    if message.contains("insufficient funds") {
        CoordinatorError::InsufficientBalance { chain_id, message }
    } else {
        CoordinatorError::Transaction(message)
    }
}

#[async_trait]
impl CounterAssetWallet for EvmCounterWallet {
    fn connection(&self) -> CounterConnection {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<CounterConnection> {
        self.state.subscribe()
    }

    async fn send_lock(&self, payload: &LockPayload) -> CoordinatorResult<TxHash> {
        let tx = TransactionRequest::new()
            .to(payload.recipient()?)
            .value(U256::zero())
            .data(payload.calldata()?);
        self.send(tx).await
    }

    async fn send_close(&self, payload: &ClosePayload) -> CoordinatorResult<TxHash> {
        let tx = TransactionRequest::new()
            .to(payload.token()?)
            .value(U256::zero())
            .data(payload.calldata()?);
        self.send(tx).await
    }

    async fn confirm(&self, tx_hash: &TxHash) -> CoordinatorResult<()> {
        let (_, provider, _) = self.signer()?;
        let hash: H256 = tx_hash
            .0
            .parse()
            .map_err(|e| CoordinatorError::Internal(format!("Invalid tx hash {}: {}", tx_hash, e)))?;
        provider
            .wait_for_receipt(hash, self.confirmation_blocks, self.confirmation_timeout)
            .await?;
        Ok(())
    }
}
