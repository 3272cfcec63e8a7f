//! Order book coordinator - lifecycle of peer-to-peer swap orders
//!
//! Fetches the committee order book, resolves what the connected user may do
//! with each order, and drives the lock, close and cancel transactions across
//! the native chain and the counter-asset network.

pub mod api;
pub mod chain;
pub mod config;
pub mod coordination;
pub mod error;
pub mod events;
pub mod metrics;
pub mod orders;
pub mod source;
pub mod tx;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use error::{CoordinatorError, CoordinatorResult, PreconditionError};
