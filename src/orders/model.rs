//! Order records as delivered by the indexer and as shown to the user

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Micro-units per display unit for both assets
pub const MICRO_UNITS_PER_UNIT: u64 = 1_000_000;

/// Opaque order identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Order book for one chain, as returned by the order-book-by-committee endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainOrderBook {
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub orders: Vec<RawOrder>,
}

/// Sell order exactly as the backend sends it; every field may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "chainId")]
    pub committee: Option<u64>,
    #[serde(default)]
    pub amount_for_sale: Option<u64>,
    #[serde(default)]
    pub requested_amount: Option<u64>,
    #[serde(default)]
    pub sellers_send_address: Option<String>,
    #[serde(default)]
    pub seller_receive_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_receive_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_send_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_chain_deadline: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Field missing from a backend record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed order {id}: missing {field}")]
pub struct MalformedOrder {
    pub id: String,
    pub field: &'static str,
}

/// A sell order whose required fields are all present
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub committee: u64,
    pub amount_for_sale: u64,
    pub requested_amount: u64,
    pub sellers_send_address: String,
    pub seller_receive_address: String,
    pub buyer_receive_address: Option<String>,
    pub buyer_send_address: Option<String>,
    pub buyer_chain_deadline: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Order {
    /// An order is locked iff a buyer receive address is set
    pub fn is_locked(&self) -> bool {
        self.buyer_receive_address.is_some()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

impl TryFrom<RawOrder> for Order {
    type Error = MalformedOrder;

    fn try_from(raw: RawOrder) -> Result<Self, Self::Error> {
        let id = non_empty(raw.id).ok_or(MalformedOrder {
            id: "<unknown>".to_string(),
            field: "id",
        })?;
        let missing = |field: &'static str| MalformedOrder {
            id: id.clone(),
            field,
        };

        Ok(Order {
            committee: raw.committee.ok_or_else(|| missing("committee"))?,
            amount_for_sale: raw.amount_for_sale.ok_or_else(|| missing("amountForSale"))?,
            requested_amount: raw.requested_amount.ok_or_else(|| missing("requestedAmount"))?,
            sellers_send_address: non_empty(raw.sellers_send_address)
                .ok_or_else(|| missing("sellersSendAddress"))?,
            seller_receive_address: non_empty(raw.seller_receive_address)
                .ok_or_else(|| missing("sellerReceiveAddress"))?,
            buyer_receive_address: non_empty(raw.buyer_receive_address),
            buyer_send_address: non_empty(raw.buyer_send_address),
            buyer_chain_deadline: raw.buyer_chain_deadline,
            created_at: raw.created_at,
            id: OrderId(id),
        })
    }
}

impl From<&Order> for RawOrder {
    fn from(order: &Order) -> Self {
        RawOrder {
            id: Some(order.id.0.clone()),
            committee: Some(order.committee),
            amount_for_sale: Some(order.amount_for_sale),
            requested_amount: Some(order.requested_amount),
            sellers_send_address: Some(order.sellers_send_address.clone()),
            seller_receive_address: Some(order.seller_receive_address.clone()),
            buyer_receive_address: order.buyer_receive_address.clone(),
            buyer_send_address: order.buyer_send_address.clone(),
            buyer_chain_deadline: order.buyer_chain_deadline,
            created_at: order.created_at,
        }
    }
}

/// Coarse order status shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Active,
    /// Payment submitted; committee settlement not observed yet
    PendingSettlement,
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Active => "active",
            OrderStatus::PendingSettlement => "pending_settlement",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Display model derived from an [`Order`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayOrder {
    pub id: OrderId,
    pub committee: u64,
    pub chain_label: String,
    pub amount_for_sale: u64,
    pub requested_amount: u64,
    pub amount_for_sale_display: f64,
    pub requested_amount_display: f64,
    /// Counter-asset per native unit; `None` when nothing is for sale
    pub price: Option<f64>,
    pub fee_percent: f64,
    pub status: OrderStatus,
    pub locked: bool,
    pub sellers_send_address: String,
    pub seller_receive_address: String,
    #[serde(default)]
    pub buyer_receive_address: Option<String>,
    #[serde(default)]
    pub buyer_send_address: Option<String>,
    #[serde(default)]
    pub buyer_chain_deadline: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl DisplayOrder {
    /// Rebuild the validated order this display record came from
    pub fn to_order(&self) -> Order {
        Order {
            id: self.id.clone(),
            committee: self.committee,
            amount_for_sale: self.amount_for_sale,
            requested_amount: self.requested_amount,
            sellers_send_address: self.sellers_send_address.clone(),
            seller_receive_address: self.seller_receive_address.clone(),
            buyer_receive_address: self.buyer_receive_address.clone(),
            buyer_send_address: self.buyer_send_address.clone(),
            buyer_chain_deadline: self.buyer_chain_deadline,
            created_at: Some(self.created_at),
        }
    }

    /// Whether the order can take part in price-sensitive views
    pub fn is_priced(&self) -> bool {
        self.price.is_some()
    }
}
