//! Raw order to display order transformation

use super::model::{DisplayOrder, MalformedOrder, Order, OrderStatus, RawOrder, MICRO_UNITS_PER_UNIT};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    /// Committees with well-known names
    static ref DEFAULT_CHAIN_LABELS: HashMap<u64, &'static str> = {
        let mut m = HashMap::new();
        m.insert(1, "Canopy");
        m.insert(2, "Canary");
        m
    };
}

/// Turns validated orders into display records
#[derive(Debug, Clone)]
pub struct OrderTransformer {
    labels: HashMap<u64, String>,
    fee_percent: f64,
}

impl OrderTransformer {
    /// Create a transformer; `overrides` take precedence over the built-in labels
    pub fn new(overrides: HashMap<u64, String>, fee_percent: f64) -> Self {
        let mut labels: HashMap<u64, String> = DEFAULT_CHAIN_LABELS
            .iter()
            .map(|(id, label)| (*id, label.to_string()))
            .collect();
        labels.extend(overrides);
        Self { labels, fee_percent }
    }

    /// Human label for a committee
    pub fn chain_label(&self, committee: u64) -> String {
        self.labels
            .get(&committee)
            .cloned()
            .unwrap_or_else(|| format!("chain-{}", committee))
    }

    /// Derive the display record for an order
    pub fn transform(&self, order: &Order) -> DisplayOrder {
        DisplayOrder {
            id: order.id.clone(),
            committee: order.committee,
            chain_label: self.chain_label(order.committee),
            amount_for_sale: order.amount_for_sale,
            requested_amount: order.requested_amount,
            amount_for_sale_display: to_display_units(order.amount_for_sale),
            requested_amount_display: to_display_units(order.requested_amount),
            price: price(order.amount_for_sale, order.requested_amount),
            fee_percent: self.fee_percent,
            status: OrderStatus::Active,
            locked: order.is_locked(),
            sellers_send_address: order.sellers_send_address.clone(),
            seller_receive_address: order.seller_receive_address.clone(),
            buyer_receive_address: order.buyer_receive_address.clone(),
            buyer_send_address: order.buyer_send_address.clone(),
            buyer_chain_deadline: order.buyer_chain_deadline,
            created_at: order.created_at.unwrap_or_else(DateTime::<Utc>::default),
        }
    }

    /// Validate and transform a backend record in one step
    pub fn transform_raw(&self, raw: RawOrder) -> Result<DisplayOrder, MalformedOrder> {
        let order = Order::try_from(raw)?;
        Ok(self.transform(&order))
    }
}

impl Default for OrderTransformer {
    fn default() -> Self {
        Self::new(HashMap::new(), 0.0)
    }
}

/// Micro-units to display units
pub fn to_display_units(micro: u64) -> f64 {
    micro as f64 / MICRO_UNITS_PER_UNIT as f64
}

/// Counter-asset requested per native unit offered
pub fn price(amount_for_sale: u64, requested_amount: u64) -> Option<f64> {
    if amount_for_sale == 0 {
        return None;
    }
    Some(requested_amount as f64 / amount_for_sale as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::model::OrderId;

    fn order(amount_for_sale: u64, requested_amount: u64, committee: u64) -> Order {
        Order {
            id: OrderId::new("o1"),
            committee,
            amount_for_sale,
            requested_amount,
            sellers_send_address: "seller".to_string(),
            seller_receive_address: "0xseller".to_string(),
            buyer_receive_address: None,
            buyer_send_address: None,
            buyer_chain_deadline: None,
            created_at: None,
        }
    }

    #[test]
    fn test_price_derivation() {
        let display = OrderTransformer::default().transform(&order(1_000_000_000, 980_000_000, 1));
        assert_eq!(display.amount_for_sale_display, 1000.0);
        assert_eq!(display.requested_amount_display, 980.0);
        assert_eq!(display.price, Some(0.98));
        assert_eq!(display.status, OrderStatus::Active);
    }

    #[test]
    fn test_zero_sale_has_no_price() {
        let display = OrderTransformer::default().transform(&order(0, 5_000_000, 1));
        assert_eq!(display.price, None);
        assert!(!display.is_priced());
    }

    #[test]
    fn test_chain_labels() {
        let mut overrides = HashMap::new();
        overrides.insert(2, "Staging".to_string());
        let t = OrderTransformer::new(overrides, 0.5);

        assert_eq!(t.chain_label(1), "Canopy");
        assert_eq!(t.chain_label(2), "Staging");
        assert_eq!(t.chain_label(42), "chain-42");
        assert_eq!(t.transform(&order(1, 1, 42)).fee_percent, 0.5);
    }

    #[test]
    fn test_transform_raw_rejects_missing_id() {
        let raw = RawOrder {
            committee: Some(1),
            ..Default::default()
        };
        assert!(OrderTransformer::default().transform_raw(raw).is_err());
    }
}
