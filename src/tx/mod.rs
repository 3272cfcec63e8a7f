//! Counter-asset transaction building and submission

mod payload;
mod sender;

pub use payload::{ClosePayload, LockPayload};
pub use sender::EvmCounterWallet;
