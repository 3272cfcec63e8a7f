//! Configuration management for the order book coordinator
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub coordinator: CoordinatorConfig,
    pub backend: BackendConfig,
    pub cache: CacheConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub native_wallet: NativeWalletConfig,
    pub counter_wallet: CounterWalletConfig,
    pub networks: HashMap<String, NetworkConfig>,
    #[serde(default)]
    pub committees: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    pub default_committee: u64,
    pub poll_interval_ms: u64,
    /// Delay before re-fetching after a lock or close settles
    pub settle_delay_ms: u64,
    /// Delay before reconciling after a cancellation
    pub cancel_reconcile_delay_ms: u64,
    pub confirmation_timeout_secs: u64,
    #[serde(default)]
    pub display_fee_percent: f64,
    #[serde(default = "default_true")]
    pub placeholder_fallback: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    pub orders_path: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NativeWalletConfig {
    pub admin_url: String,
    pub address: Option<String>,
    pub password_env: Option<String>,
    pub fee: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CounterWalletConfig {
    pub rpc_urls: Vec<String>,
    pub private_key_env: Option<String>,
    pub confirmation_blocks: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub name: String,
    pub token_address: String,
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl CoordinatorConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn cancel_reconcile_delay(&self) -> Duration {
        Duration::from_millis(self.cancel_reconcile_delay_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("ORDERBOOK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.backend.base_url.is_empty() {
            anyhow::bail!("Backend base_url must be set");
        }

        if self.coordinator.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be positive");
        }

        if self.coordinator.settle_delay_ms == 0 {
            anyhow::bail!("settle_delay_ms must be positive");
        }

        if self.coordinator.confirmation_timeout_secs == 0 {
            anyhow::bail!("confirmation_timeout_secs must be positive");
        }

        if self.backend.timeout_secs == 0 {
            anyhow::bail!("Backend timeout_secs must be positive");
        }

        if self.enabled_networks().is_empty() {
            anyhow::bail!("At least one counter-asset network must be enabled");
        }

        for (name, network) in &self.networks {
            if network.enabled && network.token_address.is_empty() {
                anyhow::bail!("Network {} has no token contract address", name);
            }
        }

        for key in self.committees.keys() {
            if key.parse::<u64>().is_err() {
                anyhow::bail!("Committee key {} is not a numeric committee id", key);
            }
        }

        if self.counter_wallet.rpc_urls.is_empty() {
            tracing::warn!("No counter-asset RPC URLs configured - lock and close are disabled");
        }

        Ok(())
    }

    /// Get list of enabled networks
    pub fn enabled_networks(&self) -> Vec<(&String, &NetworkConfig)> {
        self.networks.iter().filter(|(_, n)| n.enabled).collect()
    }

    /// Committee label overrides keyed by numeric committee id
    pub fn committee_labels(&self) -> HashMap<u64, String> {
        self.committees
            .iter()
            .filter_map(|(k, v)| k.parse::<u64>().ok().map(|id| (id, v.clone())))
            .collect()
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex");

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
