//! Demonstration orders shown when neither the backend nor the cache has data

use crate::orders::RawOrder;

const SAMPLES: &[(&str, u64, u64)] = &[
    ("demo-0001", 1_000_000_000, 980_000_000),
    ("demo-0002", 250_000_000, 262_500_000),
    ("demo-0003", 5_000_000_000, 4_750_000_000),
];

/// Deterministic sample book for a committee
pub fn placeholder_orders(committee: u64) -> Vec<RawOrder> {
    SAMPLES
        .iter()
        .enumerate()
        .map(|(i, (id, sale, requested))| RawOrder {
            id: Some(format!("{}-{}", id, committee)),
            committee: Some(committee),
            amount_for_sale: Some(*sale),
            requested_amount: Some(*requested),
            sellers_send_address: Some(format!("{:040x}", i + 1)),
            seller_receive_address: Some(format!("0x{:040x}", 0xd0 + i)),
            ..Default::default()
        })
        .collect()
}
