//! Phase one: lock an order for the current user
//!
//! At most one lock is in flight at a time. A request arriving while another
//! lock is signing or confirming is dropped, not queued.

use super::gate::{GatePermit, SubmissionGate};
use super::operation::{OperationKind, OperationState};
use super::preconditions::check_lock;
use super::{ignored, run_detached, CoordinatorContext, Dispatch, OperationRun};
use crate::error::CoordinatorResult;
use crate::events::OrderEvent;
use crate::orders::OrderId;
use crate::tx::LockPayload;
use crate::wallet::TxHash;

use tokio::sync::oneshot;
use tracing::debug;

#[derive(Clone)]
pub struct LockCoordinator {
    ctx: CoordinatorContext,
    gate: SubmissionGate,
}

impl LockCoordinator {
    pub fn new(ctx: CoordinatorContext) -> Self {
        Self {
            ctx,
            gate: SubmissionGate::new(),
        }
    }

    /// Order currently being locked, if any
    pub fn in_flight(&self) -> Option<OrderId> {
        self.gate.in_flight()
    }

    /// Lock `order_id`; resolves once the signal transaction is accepted
    pub async fn lock(&self, order_id: OrderId) -> CoordinatorResult<Dispatch> {
        let permit = match self.gate.try_enter(&order_id) {
            Ok(permit) => permit,
            Err(rejection) => return Ok(ignored(OperationKind::Lock, &order_id, rejection)),
        };

        let ctx = self.ctx.clone();
        run_detached(OperationKind::Lock, move |reply| drive(ctx, order_id, permit, reply)).await
    }
}

async fn drive(
    ctx: CoordinatorContext,
    order_id: OrderId,
    mut permit: GatePermit,
    reply: oneshot::Sender<CoordinatorResult<Dispatch>>,
) {
    let run = OperationRun::begin(&ctx, OperationKind::Lock, &order_id).await;

    let (payload, tx_hash) = match submit(&ctx, &run, &order_id, &mut permit).await {
        Ok(submitted) => submitted,
        Err(e) => {
            run.fail(&e).await;
            let _ = reply.send(Err(e));
            return;
        }
    };

    let _ = reply.send(Ok(run.submitted(&tx_hash)));
    ctx.events.publish(OrderEvent::LockSubmitted {
        operation_id: run.id(),
        order_id: order_id.clone(),
        tx_hash: tx_hash.to_string(),
    });

    if let Err(e) = ctx.wallets.counter().confirm(&tx_hash).await {
        run.fail(&e).await;
        return;
    }
    run.settle(&tx_hash).await;
    permit.settle();
    drop(permit);

    ctx.source.schedule_refresh(payload.committee, ctx.settle_delay);
}

async fn submit(
    ctx: &CoordinatorContext,
    run: &OperationRun,
    order_id: &OrderId,
    permit: &mut GatePermit,
) -> CoordinatorResult<(LockPayload, TxHash)> {
    run.advance(OperationState::AwaitingPrecondition).await?;
    let (order, origin) = ctx.source.lookup(order_id).await;
    let payload = check_lock(order_id, order.as_ref(), origin, &ctx.wallets.status(), &ctx.networks)?;

    run.advance(OperationState::Signing).await?;
    debug!("Requesting lock signature for order {}", order_id);
    let tx_hash = ctx.wallets.counter().send_lock(&payload).await?;
    permit.mark_sent();

    run.advance(OperationState::Confirming {
        tx_hash: tx_hash.to_string(),
    })
    .await?;
    Ok((payload, tx_hash))
}
