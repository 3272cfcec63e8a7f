//! Submission gate: one attempt in flight, one transaction per order
//!
//! A coordinator holds a [`GatePermit`] from the moment a request is accepted
//! until its transaction is confirmed or the attempt fails. Dropping the permit
//! always frees the gate, including when the owning task panics.

use crate::orders::OrderId;

use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Why a request was dropped without starting an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum GateRejection {
    /// Another attempt is still in flight
    Busy { in_flight: OrderId },
    /// A transaction for this order was already submitted this session
    AlreadySent { order_id: OrderId },
}

#[derive(Debug, Default)]
struct GateState {
    in_flight: Option<OrderId>,
    sent: HashSet<OrderId>,
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionGate {
    state: Arc<Mutex<GateState>>,
}

impl SubmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Claim the gate for `order_id`
    pub fn try_enter(&self, order_id: &OrderId) -> Result<GatePermit, GateRejection> {
        let mut state = self.lock_state();
        if let Some(current) = &state.in_flight {
            return Err(GateRejection::Busy {
                in_flight: current.clone(),
            });
        }
        if state.sent.contains(order_id) {
            return Err(GateRejection::AlreadySent {
                order_id: order_id.clone(),
            });
        }
        state.in_flight = Some(order_id.clone());

        Ok(GatePermit {
            state: self.state.clone(),
            order_id: order_id.clone(),
            sent: false,
            settled: false,
        })
    }

    /// Order currently being submitted, if any
    pub fn in_flight(&self) -> Option<OrderId> {
        self.lock_state().in_flight.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.lock_state().in_flight.is_some()
    }

    pub fn was_sent(&self, order_id: &OrderId) -> bool {
        self.lock_state().sent.contains(order_id)
    }
}

/// Exclusive right to submit one transaction
#[derive(Debug)]
pub struct GatePermit {
    state: Arc<Mutex<GateState>>,
    order_id: OrderId,
    sent: bool,
    settled: bool,
}

impl GatePermit {
    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    /// The wallet accepted a transaction for this order
    pub fn mark_sent(&mut self) {
        self.sent = true;
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .sent
            .insert(self.order_id.clone());
    }

    /// The transaction confirmed; keep the per-order marker after release
    pub fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.in_flight = None;
        if self.sent && !self.settled {
            state.sent.remove(&self.order_id);
        }
    }
}
