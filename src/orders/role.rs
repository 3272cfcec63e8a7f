//! Ownership and role resolution across the native and counter-asset wallets

use super::model::{DisplayOrder, Order, OrderStatus};
use crate::source::SnapshotOrigin;

use serde::Serialize;

/// Canonical form used for every address comparison
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    stripped.to_lowercase()
}

/// Exact equality of normalized addresses; empty addresses never match
pub fn addresses_equal(a: &str, b: &str) -> bool {
    let a = normalize_address(a);
    !a.is_empty() && a == normalize_address(b)
}

/// What the current user is to a given order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Buyer,
    Other,
}

/// Role predicates for one user, holding one address per wallet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleResolver {
    native: Option<String>,
    counter: Option<String>,
}

impl RoleResolver {
    pub fn new(native: Option<String>, counter: Option<String>) -> Self {
        Self { native, counter }
    }

    pub fn native_address(&self) -> Option<&str> {
        self.native.as_deref()
    }

    pub fn counter_address(&self) -> Option<&str> {
        self.counter.as_deref()
    }

    /// The user's native wallet sold this order
    pub fn is_owner(&self, order: &Order) -> bool {
        self.native
            .as_deref()
            .map(|native| addresses_equal(native, &order.sellers_send_address))
            .unwrap_or(false)
    }

    /// The user's counter-asset wallet locked this order
    pub fn is_buyer(&self, order: &Order) -> bool {
        if !order.is_locked() || self.is_owner(order) {
            return false;
        }
        let Some(counter) = self.counter.as_deref() else {
            return false;
        };
        order
            .buyer_receive_address
            .iter()
            .chain(order.buyer_send_address.iter())
            .any(|buyer| addresses_equal(counter, buyer))
    }

    /// The order is locked by someone, regardless of who
    pub fn is_ready_for_close(&self, order: &Order) -> bool {
        order.is_locked()
    }

    pub fn role(&self, order: &Order) -> Role {
        if self.is_owner(order) {
            Role::Owner
        } else if self.is_buyer(order) {
            Role::Buyer
        } else {
            Role::Other
        }
    }
}

/// Coordinator activity that disables row actions
#[derive(Debug, Clone, Default)]
pub struct PendingFlags {
    pub lock_in_flight: bool,
    pub close_in_flight: bool,
    pub cancel_in_flight: bool,
}

/// Per-row action availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderActions {
    pub can_lock: bool,
    pub can_close: bool,
    pub can_cancel: bool,
}

impl OrderActions {
    pub fn resolve(
        resolver: &RoleResolver,
        order: &DisplayOrder,
        pending: &PendingFlags,
        origin: SnapshotOrigin,
    ) -> Self {
        let validated = order.to_order();
        let role = resolver.role(&validated);
        let open = order.status == OrderStatus::Active && origin != SnapshotOrigin::Placeholder;

        Self {
            can_lock: open
                && role != Role::Owner
                && !validated.is_locked()
                && order.is_priced()
                && !pending.lock_in_flight,
            can_close: open
                && role == Role::Buyer
                && resolver.is_ready_for_close(&validated)
                && !pending.close_in_flight,
            can_cancel: open && role == Role::Owner && !pending.cancel_in_flight,
        }
    }
}
