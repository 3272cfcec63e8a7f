//! Counter-asset transaction payloads
//!
//! Lock: zero-value transaction to the buyer's own address whose data is the
//! lock metadata JSON. Close: ERC-20 `transfer(seller, amount)` calldata with
//! the close metadata JSON appended, so the committee can tie the payment to
//! the order.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::orders::OrderId;

use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::id;
use serde::Serialize;

/// Arguments of the phase one lock signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockPayload {
    pub order_id: OrderId,
    pub committee: u64,
    /// Native-chain address that receives the asset for sale
    pub buyer_receive_address: String,
    /// Counter-asset address the buyer will pay from
    pub buyer_send_address: String,
    pub token_address: String,
}

/// Arguments of the phase two payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosePayload {
    pub order_id: OrderId,
    pub committee: u64,
    pub seller_receive_address: String,
    /// Counter-asset micro-units
    pub amount: u64,
    pub token_address: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LockMetadata<'a> {
    order_id: &'a str,
    #[serde(rename = "chain_id")]
    chain_id: u64,
    buyer_receive_address: &'a str,
    buyer_send_address: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CloseMetadata<'a> {
    close_order: bool,
    order_id: &'a str,
    #[serde(rename = "chain_id")]
    chain_id: u64,
}

pub(crate) fn parse_address(value: &str) -> CoordinatorResult<Address> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|e| CoordinatorError::Wallet(format!("Invalid address {}: {}", value, e)))
}

impl LockPayload {
    pub fn recipient(&self) -> CoordinatorResult<Address> {
        parse_address(&self.buyer_send_address)
    }

    pub fn calldata(&self) -> CoordinatorResult<Bytes> {
        let metadata = LockMetadata {
            order_id: self.order_id.as_str(),
            chain_id: self.committee,
            buyer_receive_address: &self.buyer_receive_address,
            buyer_send_address: &self.buyer_send_address,
        };
        let json = serde_json::to_vec(&metadata)
            .map_err(|e| CoordinatorError::Internal(e.to_string()))?;
        Ok(Bytes::from(json))
    }
}

impl ClosePayload {
    pub fn token(&self) -> CoordinatorResult<Address> {
        parse_address(&self.token_address)
    }

    pub fn calldata(&self) -> CoordinatorResult<Bytes> {
        let seller = parse_address(&self.seller_receive_address)?;

        let mut data = id("transfer(address,uint256)").to_vec();
        data.extend(encode(&[Token::Address(seller), Token::Uint(U256::from(self.amount))]));

        let metadata = CloseMetadata {
            close_order: true,
            order_id: self.order_id.as_str(),
            chain_id: self.committee,
        };
        let json = serde_json::to_vec(&metadata)
            .map_err(|e| CoordinatorError::Internal(e.to_string()))?;
        data.extend(json);

        Ok(Bytes::from(data))
    }
}
