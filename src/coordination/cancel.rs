//! Seller withdrawal of an order on the native chain
//!
//! The backend drops deleted orders from its book without saying so, so a
//! successful deletion is recorded locally right away and reconciled with a
//! re-fetch shortly after.

use super::gate::{GatePermit, SubmissionGate};
use super::operation::{OperationKind, OperationState};
use super::preconditions::check_cancel;
use super::{ignored, run_detached, CoordinatorContext, Dispatch, OperationRun};
use crate::error::{CoordinatorResult, PreconditionError};
use crate::events::OrderEvent;
use crate::orders::{DisplayOrder, OrderId, OrderStatus};
use crate::wallet::TxHash;

use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct CancelCoordinator {
    ctx: CoordinatorContext,
    gate: SubmissionGate,
}

impl CancelCoordinator {
    pub fn new(ctx: CoordinatorContext) -> Self {
        Self {
            ctx,
            gate: SubmissionGate::new(),
        }
    }

    pub fn in_flight(&self) -> Option<OrderId> {
        self.gate.in_flight()
    }

    /// Delete `order_id`; resolves once the native node accepts the deletion
    pub async fn cancel(&self, order_id: OrderId) -> CoordinatorResult<Dispatch> {
        let permit = match self.gate.try_enter(&order_id) {
            Ok(permit) => permit,
            Err(rejection) => return Ok(ignored(OperationKind::Cancel, &order_id, rejection)),
        };

        let ctx = self.ctx.clone();
        run_detached(OperationKind::Cancel, move |reply| drive(ctx, order_id, permit, reply)).await
    }
}

async fn drive(
    ctx: CoordinatorContext,
    order_id: OrderId,
    mut permit: GatePermit,
    reply: oneshot::Sender<CoordinatorResult<Dispatch>>,
) {
    let run = OperationRun::begin(&ctx, OperationKind::Cancel, &order_id).await;

    let (order, tx_hash) = match submit(&ctx, &run, &order_id, &mut permit).await {
        Ok(submitted) => submitted,
        Err(e) => {
            run.fail(&e).await;
            let _ = reply.send(Err(e));
            return;
        }
    };

    let dispatch = run.submitted(&tx_hash);

    // the deletion is final once the node accepts it
    if let Err(e) = ctx.source.mark_status(&order, OrderStatus::Cancelled).await {
        warn!("Failed to persist cancellation of {}: {}", order_id, e);
    }
    run.settle(&tx_hash).await;
    permit.settle();
    drop(permit);

    let _ = reply.send(Ok(dispatch));
    ctx.events.publish(OrderEvent::OrderCancelled {
        operation_id: run.id(),
        order_id,
        tx_hash: tx_hash.to_string(),
    });

    ctx.source
        .schedule_refresh(order.committee, ctx.cancel_reconcile_delay);
}

async fn submit(
    ctx: &CoordinatorContext,
    run: &OperationRun,
    order_id: &OrderId,
    permit: &mut GatePermit,
) -> CoordinatorResult<(DisplayOrder, TxHash)> {
    run.advance(OperationState::AwaitingPrecondition).await?;
    let (order, origin) = ctx.source.lookup(order_id).await;
    let request = check_cancel(order_id, order.as_ref(), origin, &ctx.wallets.status())?;
    let order = order.ok_or_else(|| PreconditionError::OrderNotFound {
        order_id: order_id.to_string(),
    })?;
    if order.locked {
        warn!("Cancelling order {} although a buyer has locked it", order_id);
    }

    run.advance(OperationState::Signing).await?;
    debug!("Requesting deletion of order {} on committee {}", order_id, request.committee);
    let tx_hash = ctx.wallets.native().delete_order(&request).await?;
    permit.mark_sent();

    run.advance(OperationState::Confirming {
        tx_hash: tx_hash.to_string(),
    })
    .await?;
    Ok((order, tx_hash))
}
