//! Error types for the order book coordinator

use thiserror::Error;

/// Main error type for the coordinator
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Order book transport error: {0}")]
    Transport(String),

    #[error("Rate limited by {service}")]
    RateLimited { service: String },

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("{0}")]
    Wallet(String),

    #[error("{0}")]
    Transaction(String),

    #[error("Transaction {tx_hash} reverted on chain {chain_id}")]
    Reverted { chain_id: u64, tx_hash: String },

    #[error("{message}")]
    InsufficientBalance { chain_id: u64, message: String },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("Order cache error: {0}")]
    Cache(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reasons a coordinator refuses to prompt for a signature
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Native wallet is not connected")]
    NativeWalletDisconnected,

    #[error("Native wallet is locked")]
    NativeWalletLocked,

    #[error("Counter-asset wallet is not connected")]
    CounterWalletDisconnected,

    #[error("Network {chain_id} has no known token contract")]
    UnsupportedNetwork { chain_id: u64 },

    #[error("Order {order_id} not found on the order book")]
    OrderNotFound { order_id: String },

    #[error("Order {order_id} is demonstration data shown while the order book is unavailable")]
    DemonstrationOrder { order_id: String },

    #[error("Order {order_id} has no amount for sale")]
    MalformedOrder { order_id: String },

    #[error("Order {order_id} is already locked")]
    AlreadyLocked { order_id: String },

    #[error("Cannot lock your own order {order_id}")]
    SelfTrade { order_id: String },

    #[error("Order {order_id} is not locked")]
    NotLocked { order_id: String },

    #[error("Order {order_id} is locked by another buyer")]
    NotBuyer { order_id: String },

    #[error("Only the seller can cancel order {order_id}")]
    NotOwner { order_id: String },

    #[error("Order {order_id} is already cancelled")]
    AlreadyCancelled { order_id: String },
}

impl PreconditionError {
    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            PreconditionError::NativeWalletDisconnected => "native_wallet_disconnected",
            PreconditionError::NativeWalletLocked => "native_wallet_locked",
            PreconditionError::CounterWalletDisconnected => "counter_wallet_disconnected",
            PreconditionError::UnsupportedNetwork { .. } => "unsupported_network",
            PreconditionError::OrderNotFound { .. } => "order_not_found",
            PreconditionError::DemonstrationOrder { .. } => "demonstration_order",
            PreconditionError::MalformedOrder { .. } => "malformed_order",
            PreconditionError::AlreadyLocked { .. } => "already_locked",
            PreconditionError::SelfTrade { .. } => "self_trade",
            PreconditionError::NotLocked { .. } => "not_locked",
            PreconditionError::NotBuyer { .. } => "not_buyer",
            PreconditionError::NotOwner { .. } => "not_owner",
            PreconditionError::AlreadyCancelled { .. } => "already_cancelled",
        }
    }

    /// Wallet and network problems the user fixes by reconnecting
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            PreconditionError::NativeWalletDisconnected
                | PreconditionError::NativeWalletLocked
                | PreconditionError::CounterWalletDisconnected
                | PreconditionError::UnsupportedNetwork { .. }
        )
    }
}

impl CoordinatorError {
    /// Check if the user can simply try again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Transport(_)
                | CoordinatorError::RateLimited { .. }
                | CoordinatorError::ChainConnection { .. }
                | CoordinatorError::Timeout { .. }
                | CoordinatorError::Transaction(_)
        )
    }

    /// Check if the error was raised before any signing prompt
    pub fn is_precondition(&self) -> bool {
        matches!(self, CoordinatorError::Precondition(_))
    }
}

impl From<reqwest::Error> for CoordinatorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CoordinatorError::Timeout {
                operation: "backend request".to_string(),
            }
        } else {
            CoordinatorError::Transport(e.to_string())
        }
    }
}

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_message_is_surfaced_verbatim() {
        let err: CoordinatorError = PreconditionError::SelfTrade {
            order_id: "abc".to_string(),
        }
        .into();
        assert!(err.is_precondition());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Cannot lock your own order abc");
    }

    #[test]
    fn test_transaction_error_keeps_wallet_message() {
        let err = CoordinatorError::Transaction("User rejected the request".to_string());
        assert_eq!(err.to_string(), "User rejected the request");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_wallet_errors_are_not_prefixed() {
        let err = CoordinatorError::InsufficientBalance {
            chain_id: 11155111,
            message: "insufficient funds for transfer".to_string(),
        };
        assert_eq!(err.to_string(), "insufficient funds for transfer");

        let err = CoordinatorError::Wallet("Counter-asset wallet is not connected".to_string());
        assert_eq!(err.to_string(), "Counter-asset wallet is not connected");
    }
}
