//! Filtering and sorting of the visible order list

use super::model::{DisplayOrder, OrderStatus};

use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderFilter {
    #[default]
    All,
    Active,
    /// Orders whose payment has been submitted
    Filled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

impl OrderFilter {
    pub fn matches(&self, order: &DisplayOrder) -> bool {
        match self {
            OrderFilter::All => true,
            OrderFilter::Active => order.status == OrderStatus::Active,
            OrderFilter::Filled => order.status == OrderStatus::PendingSettlement,
        }
    }
}

impl FromStr for OrderFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(OrderFilter::All),
            "active" => Ok(OrderFilter::Active),
            "filled" => Ok(OrderFilter::Filled),
            other => Err(format!("unknown filter: {}", other)),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newest" => Ok(SortOrder::Newest),
            "oldest" => Ok(SortOrder::Oldest),
            other => Err(format!("unknown sort order: {}", other)),
        }
    }
}

/// Filter then sort by creation time; ties keep backend order
pub fn apply(orders: &[DisplayOrder], filter: OrderFilter, sort: SortOrder) -> Vec<DisplayOrder> {
    let mut visible: Vec<DisplayOrder> = orders.iter().filter(|o| filter.matches(o)).cloned().collect();
    match sort {
        SortOrder::Newest => visible.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::Oldest => visible.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
    }
    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::model::{Order, OrderId};
    use crate::orders::OrderTransformer;
    use chrono::{TimeZone, Utc};

    fn display(id: &str, ts: i64, status: OrderStatus) -> DisplayOrder {
        let order = Order {
            id: OrderId::new(id),
            committee: 1,
            amount_for_sale: 1,
            requested_amount: 1,
            sellers_send_address: "s".to_string(),
            seller_receive_address: "r".to_string(),
            buyer_receive_address: None,
            buyer_send_address: None,
            buyer_chain_deadline: None,
            created_at: Utc.timestamp_opt(ts, 0).single(),
        };
        let mut d = OrderTransformer::default().transform(&order);
        d.status = status;
        d
    }

    #[test]
    fn test_filter_and_sort() {
        let orders = vec![
            display("a", 10, OrderStatus::Active),
            display("b", 30, OrderStatus::PendingSettlement),
            display("c", 20, OrderStatus::Cancelled),
        ];

        let ids = |v: Vec<DisplayOrder>| v.into_iter().map(|o| o.id.0).collect::<Vec<_>>();

        assert_eq!(ids(apply(&orders, OrderFilter::All, SortOrder::Newest)), vec!["b", "c", "a"]);
        assert_eq!(ids(apply(&orders, OrderFilter::All, SortOrder::Oldest)), vec!["a", "c", "b"]);
        assert_eq!(ids(apply(&orders, OrderFilter::Active, SortOrder::Newest)), vec!["a"]);
        assert_eq!(ids(apply(&orders, OrderFilter::Filled, SortOrder::Newest)), vec!["b"]);
    }

    #[test]
    fn test_parse_query_values() {
        assert_eq!("Filled".parse::<OrderFilter>(), Ok(OrderFilter::Filled));
        assert_eq!("oldest".parse::<SortOrder>(), Ok(SortOrder::Oldest));
        assert!("cheapest".parse::<SortOrder>().is_err());
    }
}
