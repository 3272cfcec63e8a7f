//! Wallet connections
//!
//! The native-chain wallet and the counter-asset wallet are connected,
//! unlocked and switched independently. Each publishes its own connection
//! state; the two are only combined when a coordinator evaluates its
//! preconditions or when roles are resolved.

pub mod native;

pub use native::{DeleteOrderRequest, NodeKeystoreWallet};

use crate::error::CoordinatorResult;
use crate::orders::RoleResolver;
use crate::tx::{ClosePayload, LockPayload};

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Transaction hash as reported by the network that accepted it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Native-chain wallet state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NativeConnection {
    Disconnected,
    Locked { address: String },
    Unlocked { address: String },
}

impl NativeConnection {
    pub fn address(&self) -> Option<&str> {
        match self {
            NativeConnection::Disconnected => None,
            NativeConnection::Locked { address } | NativeConnection::Unlocked { address } => {
                Some(address)
            }
        }
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self, NativeConnection::Unlocked { .. })
    }
}

/// Counter-asset wallet state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CounterConnection {
    Disconnected,
    Connected { address: String, chain_id: u64 },
}

impl CounterConnection {
    pub fn address(&self) -> Option<&str> {
        match self {
            CounterConnection::Disconnected => None,
            CounterConnection::Connected { address, .. } => Some(address),
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        match self {
            CounterConnection::Disconnected => None,
            CounterConnection::Connected { chain_id, .. } => Some(*chain_id),
        }
    }
}

/// Wallet on the chain where orders live
#[async_trait]
pub trait NativeWallet: Send + Sync {
    fn connection(&self) -> NativeConnection;

    fn subscribe(&self) -> watch::Receiver<NativeConnection>;

    /// Hold the keystore password for subsequent signatures
    fn unlock(&self, password: String) -> CoordinatorResult<()>;

    /// Forget the keystore password
    fn lock(&self);

    /// Sign and submit an order deletion
    async fn delete_order(&self, request: &DeleteOrderRequest) -> CoordinatorResult<TxHash>;
}

/// Wallet on the settlement network of the counter-asset
#[async_trait]
pub trait CounterAssetWallet: Send + Sync {
    fn connection(&self) -> CounterConnection;

    fn subscribe(&self) -> watch::Receiver<CounterConnection>;

    /// Sign and submit the zero-value lock signal
    async fn send_lock(&self, payload: &LockPayload) -> CoordinatorResult<TxHash>;

    /// Sign and submit the payment closing an order
    async fn send_close(&self, payload: &ClosePayload) -> CoordinatorResult<TxHash>;

    /// Wait until a submitted transaction is confirmed
    async fn confirm(&self, tx_hash: &TxHash) -> CoordinatorResult<()>;
}

/// Both connections as reported to the UI
#[derive(Debug, Clone, Serialize)]
pub struct WalletStatus {
    pub native: NativeConnection,
    pub counter: CounterConnection,
}

/// Holds both wallets without merging their state
#[derive(Clone)]
pub struct WalletHub {
    native: Arc<dyn NativeWallet>,
    counter: Arc<dyn CounterAssetWallet>,
}

impl WalletHub {
    pub fn new(native: Arc<dyn NativeWallet>, counter: Arc<dyn CounterAssetWallet>) -> Self {
        Self { native, counter }
    }

    pub fn native(&self) -> &Arc<dyn NativeWallet> {
        &self.native
    }

    pub fn counter(&self) -> &Arc<dyn CounterAssetWallet> {
        &self.counter
    }

    pub fn status(&self) -> WalletStatus {
        WalletStatus {
            native: self.native.connection(),
            counter: self.counter.connection(),
        }
    }

    /// Role predicates for whoever is connected right now
    pub fn resolver(&self) -> RoleResolver {
        RoleResolver::new(
            self.native.connection().address().map(String::from),
            self.counter.connection().address().map(String::from),
        )
    }
}
