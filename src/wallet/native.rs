//! Native-chain wallet backed by the node keystore
//!
//! The node holds the key; this client only supplies the keystore password
//! with each admin transaction request. Without a password the wallet is
//! connected but locked.

use super::{NativeConnection, NativeWallet, TxHash};
use crate::config::NativeWalletConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::orders::OrderId;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const DELETE_ORDER_PATH: &str = "/v1/admin/tx-delete-order";

/// Arguments of an order deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOrderRequest {
    pub order_id: OrderId,
    pub committee: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteOrderBody<'a> {
    address: &'a str,
    order_id: &'a str,
    chain_id: u64,
    fee: u64,
    submit: bool,
    password: &'a str,
}

/// Keystore wallet of the local native-chain node
pub struct NodeKeystoreWallet {
    admin_url: String,
    address: Option<String>,
    fee: u64,
    password: RwLock<Option<String>>,
    client: reqwest::Client,
    state: watch::Sender<NativeConnection>,
}

impl NodeKeystoreWallet {
    pub fn new(config: &NativeWalletConfig) -> CoordinatorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CoordinatorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let address = config.address.clone().filter(|a| !a.trim().is_empty());
        let password = config
            .password_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|p| !p.is_empty());

        let initial = connection_for(address.as_deref(), password.is_some());
        match &initial {
            NativeConnection::Disconnected => warn!("No native wallet address configured"),
            NativeConnection::Locked { address } => info!("Native wallet {} connected (locked)", address),
            NativeConnection::Unlocked { address } => info!("Native wallet {} connected", address),
        }
        let (state, _) = watch::channel(initial);

        Ok(Self {
            admin_url: config.admin_url.trim_end_matches('/').to_string(),
            address,
            fee: config.fee,
            password: RwLock::new(password),
            client,
            state,
        })
    }

    fn publish(&self) {
        let unlocked = self.password.read().unwrap_or_else(|p| p.into_inner()).is_some();
        self.state
            .send_replace(connection_for(self.address.as_deref(), unlocked));
    }
}

fn connection_for(address: Option<&str>, unlocked: bool) -> NativeConnection {
    match (address, unlocked) {
        (None, _) => NativeConnection::Disconnected,
        (Some(a), false) => NativeConnection::Locked { address: a.to_string() },
        (Some(a), true) => NativeConnection::Unlocked { address: a.to_string() },
    }
}

/// The node answers with a bare hash string or an object carrying one
fn parse_tx_hash(body: &serde_json::Value) -> Option<String> {
    match body {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => ["hash", "txHash", "tx_hash"]
            .iter()
            .find_map(|k| map.get(*k).and_then(|v| v.as_str()).map(String::from)),
        _ => None,
    }
}

#[async_trait]
impl NativeWallet for NodeKeystoreWallet {
    fn connection(&self) -> NativeConnection {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<NativeConnection> {
        self.state.subscribe()
    }

    fn unlock(&self, password: String) -> CoordinatorResult<()> {
        if self.address.is_none() {
            return Err(CoordinatorError::Wallet("No native wallet address configured".to_string()));
        }
        *self.password.write().unwrap_or_else(|p| p.into_inner()) = Some(password);
        self.publish();
        info!("Native wallet unlocked");
        Ok(())
    }

    fn lock(&self) {
        *self.password.write().unwrap_or_else(|p| p.into_inner()) = None;
        self.publish();
        info!("Native wallet locked");
    }

    async fn delete_order(&self, request: &DeleteOrderRequest) -> CoordinatorResult<TxHash> {
        let address = self
            .address
            .clone()
            .ok_or_else(|| CoordinatorError::Wallet("Native wallet is not connected".to_string()))?;
        let password = self
            .password
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| CoordinatorError::Wallet("Native wallet is locked".to_string()))?;

        let body = DeleteOrderBody {
            address: &address,
            order_id: request.order_id.as_str(),
            chain_id: request.committee,
            fee: self.fee,
            submit: true,
            password: &password,
        };

        debug!("Submitting delete-order for {} on committee {}", request.order_id, request.committee);
        let response = self
            .client
            .post(format!("{}{}", self.admin_url, DELETE_ORDER_PATH))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(CoordinatorError::Transaction(text.trim().to_string()));
        }

        let value: serde_json::Value = serde_json::from_str(&text)
            .unwrap_or_else(|_| serde_json::Value::String(text.trim().trim_matches('"').to_string()));
        let hash = parse_tx_hash(&value).ok_or_else(|| {
            CoordinatorError::Transaction(format!("Unexpected delete-order response: {}", text))
        })?;

        Ok(TxHash(hash))
    }
}
