//! Chain module - counter-asset network access
//!
//! This module provides:
//! - The registry of networks whose token contract is known
//! - Multi-RPC provider management with automatic failover
//! - Receipt polling for submitted transactions

pub mod provider;

pub use provider::ChainProvider;

use crate::config::Settings;

use std::collections::HashMap;
use tracing::info;

/// A counter-asset network the coordinator can settle on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub chain_id: u64,
    pub name: String,
    pub token_address: String,
}

/// Known networks indexed by chain id
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: HashMap<u64, Network>,
}

impl NetworkRegistry {
    pub fn new(networks: impl IntoIterator<Item = Network>) -> Self {
        Self {
            networks: networks.into_iter().map(|n| (n.chain_id, n)).collect(),
        }
    }

    /// Build from the enabled networks of the configuration
    pub fn from_settings(settings: &Settings) -> Self {
        let registry = Self::new(settings.enabled_networks().into_iter().map(|(_, n)| Network {
            chain_id: n.chain_id,
            name: n.name.clone(),
            token_address: n.token_address.clone(),
        }));
        info!("Loaded {} counter-asset networks", registry.networks.len());
        registry
    }

    pub fn get(&self, chain_id: u64) -> Option<&Network> {
        self.networks.get(&chain_id)
    }

    /// Token contract of a network, if the network is recognized
    pub fn token_for(&self, chain_id: u64) -> Option<&str> {
        self.networks.get(&chain_id).map(|n| n.token_address.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_lookup() {
        let registry = NetworkRegistry::new(vec![Network {
            chain_id: 1,
            name: "Ethereum".to_string(),
            token_address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string(),
        }]);
        assert!(registry.token_for(1).is_some());
        assert!(registry.token_for(5).is_none());
    }
}
