//! Order lifecycle coordination
//!
//! The coordinators drive the two-phase commit of a swap and its withdrawal:
//! 1. Lock: the buyer reserves an order with a signal transaction
//! 2. Close: the same buyer pays the seller on the counter-asset network
//! 3. Cancel: the seller deletes an order on the native chain
//!
//! Each accepted request runs in its own task. That task owns the operation
//! and its gate permit until the transaction settles or the attempt fails, so
//! a caller giving up early never leaves a guard set.

pub mod cancel;
pub mod close;
pub mod gate;
pub mod lock;
pub mod operation;
pub mod preconditions;

pub use cancel::CancelCoordinator;
pub use close::CloseCoordinator;
pub use gate::{GatePermit, GateRejection, SubmissionGate};
pub use lock::LockCoordinator;
pub use operation::{Operation, OperationKind, OperationState, OperationTracker};

use crate::chain::NetworkRegistry;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::events::{EventBus, OrderEvent};
use crate::orders::{OrderId, PendingFlags};
use crate::source::OrderSource;
use crate::wallet::{TxHash, WalletHub};

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Outcome of a request handed to a coordinator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Dispatch {
    /// The wallet signed and the network accepted the transaction
    Submitted { operation_id: Uuid, tx_hash: TxHash },
    /// Dropped without prompting because another attempt holds the gate
    Ignored(GateRejection),
}

/// Shared handles every coordinator works with
#[derive(Clone)]
pub struct CoordinatorContext {
    pub source: Arc<OrderSource>,
    pub wallets: WalletHub,
    pub networks: Arc<NetworkRegistry>,
    pub tracker: Arc<OperationTracker>,
    pub events: EventBus,
    /// Wait before re-fetching after a lock or close settles
    pub settle_delay: Duration,
    /// Wait before re-fetching after a cancellation
    pub cancel_reconcile_delay: Duration,
}

/// The three coordinators of a session
#[derive(Clone)]
pub struct Coordinators {
    pub lock: LockCoordinator,
    pub close: CloseCoordinator,
    pub cancel: CancelCoordinator,
}

impl Coordinators {
    pub fn new(ctx: CoordinatorContext) -> Self {
        Self {
            lock: LockCoordinator::new(ctx.clone()),
            close: CloseCoordinator::new(ctx.clone()),
            cancel: CancelCoordinator::new(ctx),
        }
    }

    /// Row actions to disable while attempts are in flight
    pub fn pending_flags(&self) -> PendingFlags {
        PendingFlags {
            lock_in_flight: self.lock.in_flight().is_some(),
            close_in_flight: self.close.in_flight().is_some(),
            cancel_in_flight: self.cancel.in_flight().is_some(),
        }
    }
}

/// Hand a permit to a new owning task and wait for its first answer
///
/// The task replies once the transaction is accepted (or the attempt fails)
/// and may keep running afterwards to confirm and settle.
pub(crate) async fn run_detached<F, Fut>(kind: OperationKind, work: F) -> CoordinatorResult<Dispatch>
where
    F: FnOnce(oneshot::Sender<CoordinatorResult<Dispatch>>) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (reply_tx, reply_rx) = oneshot::channel();
    tokio::spawn(work(reply_tx));
    reply_rx.await.map_err(|_| {
        CoordinatorError::Internal(format!("{} task ended without a result", kind))
    })?
}

/// Book-keeping for one operation, used only by the task that owns it
pub(crate) struct OperationRun {
    id: Uuid,
    kind: OperationKind,
    order_id: OrderId,
    tracker: Arc<OperationTracker>,
    events: EventBus,
    started: Instant,
}

impl OperationRun {
    pub(crate) async fn begin(ctx: &CoordinatorContext, kind: OperationKind, order_id: &OrderId) -> Self {
        let id = ctx.tracker.begin(kind, order_id).await;
        crate::metrics::record_operation_started(kind);
        info!("Starting {} of order {} (operation {})", kind, order_id, id);

        Self {
            id,
            kind,
            order_id: order_id.clone(),
            tracker: ctx.tracker.clone(),
            events: ctx.events.clone(),
            started: Instant::now(),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) async fn advance(&self, next: OperationState) -> CoordinatorResult<()> {
        self.tracker.transition(self.id, next).await
    }

    /// The network accepted the transaction
    pub(crate) fn submitted(&self, tx_hash: &TxHash) -> Dispatch {
        crate::metrics::record_operation_submitted(self.kind);
        info!("{} of order {} submitted: {}", self.kind, self.order_id, tx_hash);
        Dispatch::Submitted {
            operation_id: self.id,
            tx_hash: tx_hash.clone(),
        }
    }

    pub(crate) async fn settle(&self, tx_hash: &TxHash) {
        let settled = OperationState::Settled {
            tx_hash: tx_hash.to_string(),
        };
        if let Err(e) = self.advance(settled).await {
            warn!("Operation {} could not settle: {}", self.id, e);
            return;
        }
        crate::metrics::record_operation_settled(self.kind, self.started.elapsed().as_secs_f64());
        info!("{} of order {} settled", self.kind, self.order_id);
    }

    /// Record the failure and surface the reason unchanged
    pub(crate) async fn fail(&self, err: &CoordinatorError) {
        let reason = err.to_string();
        let failed = OperationState::Failed {
            reason: reason.clone(),
        };
        if let Err(e) = self.advance(failed).await {
            warn!("Operation {} could not record failure: {}", self.id, e);
        }

        match err {
            CoordinatorError::Precondition(p) => {
                crate::metrics::record_precondition_rejected(self.kind, p.reason());
                warn!("{} of order {} refused: {}", self.kind, self.order_id, reason);
            }
            _ => {
                crate::metrics::record_operation_failed(self.kind);
                error!("{} of order {} failed: {}", self.kind, self.order_id, reason);
            }
        }

        self.events.publish(OrderEvent::OperationFailed {
            operation_id: self.id,
            kind: self.kind,
            order_id: self.order_id.clone(),
            reason,
        });
    }
}

/// Request dropped at the gate; nothing was started
pub(crate) fn ignored(kind: OperationKind, order_id: &OrderId, rejection: GateRejection) -> Dispatch {
    crate::metrics::record_operation_ignored(kind);
    info!("Ignoring {} of order {}: {:?}", kind, order_id, rejection);
    Dispatch::Ignored(rejection)
}
