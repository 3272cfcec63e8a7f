//! Checks run before any wallet is asked to sign
//!
//! Each check works on the committed snapshot and the two wallet states as
//! they were when the request arrived, and either builds the transaction
//! arguments or names the first precondition that does not hold.

use crate::chain::NetworkRegistry;
use crate::error::PreconditionError;
use crate::orders::{DisplayOrder, OrderId, OrderStatus, RoleResolver};
use crate::source::SnapshotOrigin;
use crate::tx::{ClosePayload, LockPayload};
use crate::wallet::{CounterConnection, DeleteOrderRequest, NativeConnection, WalletStatus};

fn found<'a>(order_id: &OrderId, order: Option<&'a DisplayOrder>) -> Result<&'a DisplayOrder, PreconditionError> {
    order.ok_or_else(|| PreconditionError::OrderNotFound {
        order_id: order_id.to_string(),
    })
}

/// Placeholder rows exist only on screen; nothing may be signed for them
fn live_book(order_id: &OrderId, origin: SnapshotOrigin) -> Result<(), PreconditionError> {
    if origin == SnapshotOrigin::Placeholder {
        return Err(PreconditionError::DemonstrationOrder {
            order_id: order_id.to_string(),
        });
    }
    Ok(())
}

fn unlocked_native(native: &NativeConnection) -> Result<&str, PreconditionError> {
    match native {
        NativeConnection::Disconnected => Err(PreconditionError::NativeWalletDisconnected),
        NativeConnection::Locked { .. } => Err(PreconditionError::NativeWalletLocked),
        NativeConnection::Unlocked { address } => Ok(address.as_str()),
    }
}

/// Counter wallet address and the token contract of its network
fn counter_network<'a>(
    counter: &'a CounterConnection,
    networks: &'a NetworkRegistry,
) -> Result<(&'a str, &'a str), PreconditionError> {
    let CounterConnection::Connected { address, chain_id } = counter else {
        return Err(PreconditionError::CounterWalletDisconnected);
    };
    let token = networks
        .token_for(*chain_id)
        .ok_or(PreconditionError::UnsupportedNetwork { chain_id: *chain_id })?;
    Ok((address.as_str(), token))
}

fn not_cancelled(order: &DisplayOrder) -> Result<(), PreconditionError> {
    if order.status == OrderStatus::Cancelled {
        return Err(PreconditionError::AlreadyCancelled {
            order_id: order.id.to_string(),
        });
    }
    Ok(())
}

/// Phase one: the user reserves someone else's unlocked order
pub fn check_lock(
    order_id: &OrderId,
    order: Option<&DisplayOrder>,
    origin: SnapshotOrigin,
    wallets: &WalletStatus,
    networks: &NetworkRegistry,
) -> Result<LockPayload, PreconditionError> {
    live_book(order_id, origin)?;
    let native = unlocked_native(&wallets.native)?;
    let (counter, token) = counter_network(&wallets.counter, networks)?;
    let order = found(order_id, order)?;
    not_cancelled(order)?;

    if order.amount_for_sale == 0 {
        return Err(PreconditionError::MalformedOrder {
            order_id: order.id.to_string(),
        });
    }
    if order.locked {
        return Err(PreconditionError::AlreadyLocked {
            order_id: order.id.to_string(),
        });
    }

    let resolver = RoleResolver::new(Some(native.to_string()), Some(counter.to_string()));
    if resolver.is_owner(&order.to_order()) {
        return Err(PreconditionError::SelfTrade {
            order_id: order.id.to_string(),
        });
    }

    Ok(LockPayload {
        order_id: order.id.clone(),
        committee: order.committee,
        buyer_receive_address: native.to_string(),
        buyer_send_address: counter.to_string(),
        token_address: token.to_string(),
    })
}

/// Phase two: the buyer who locked the order pays the seller
pub fn check_close(
    order_id: &OrderId,
    order: Option<&DisplayOrder>,
    origin: SnapshotOrigin,
    wallets: &WalletStatus,
    networks: &NetworkRegistry,
) -> Result<ClosePayload, PreconditionError> {
    live_book(order_id, origin)?;
    let (counter, token) = counter_network(&wallets.counter, networks)?;
    let order = found(order_id, order)?;
    not_cancelled(order)?;

    let validated = order.to_order();
    if !validated.is_locked() {
        return Err(PreconditionError::NotLocked {
            order_id: order.id.to_string(),
        });
    }
    let resolver = RoleResolver::new(
        wallets.native.address().map(String::from),
        Some(counter.to_string()),
    );
    if !resolver.is_buyer(&validated) {
        return Err(PreconditionError::NotBuyer {
            order_id: order.id.to_string(),
        });
    }

    Ok(ClosePayload {
        order_id: order.id.clone(),
        committee: order.committee,
        seller_receive_address: order.seller_receive_address.clone(),
        amount: order.requested_amount,
        token_address: token.to_string(),
    })
}

/// Withdrawal: only the seller may delete an order
pub fn check_cancel(
    order_id: &OrderId,
    order: Option<&DisplayOrder>,
    origin: SnapshotOrigin,
    wallets: &WalletStatus,
) -> Result<DeleteOrderRequest, PreconditionError> {
    live_book(order_id, origin)?;
    let native = unlocked_native(&wallets.native)?;
    let order = found(order_id, order)?;
    not_cancelled(order)?;

    let resolver = RoleResolver::new(Some(native.to_string()), None);
    if !resolver.is_owner(&order.to_order()) {
        return Err(PreconditionError::NotOwner {
            order_id: order.id.to_string(),
        });
    }

    Ok(DeleteOrderRequest {
        order_id: order.id.clone(),
        committee: order.committee,
    })
}
