//! Phase two: the buyer pays for a locked order
//!
//! Close uses the same gate as lock. Once a payment for an order has been
//! accepted, a second close of that order is dropped for the rest of the
//! session unless the payment fails to confirm.

use super::gate::{GatePermit, SubmissionGate};
use super::operation::{OperationKind, OperationState};
use super::preconditions::check_close;
use super::{ignored, run_detached, CoordinatorContext, Dispatch, OperationRun};
use crate::error::CoordinatorResult;
use crate::events::OrderEvent;
use crate::orders::{OrderId, OrderStatus};
use crate::tx::ClosePayload;
use crate::wallet::TxHash;

use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct CloseCoordinator {
    ctx: CoordinatorContext,
    gate: SubmissionGate,
}

impl CloseCoordinator {
    pub fn new(ctx: CoordinatorContext) -> Self {
        Self {
            ctx,
            gate: SubmissionGate::new(),
        }
    }

    pub fn in_flight(&self) -> Option<OrderId> {
        self.gate.in_flight()
    }

    /// Pay the seller of `order_id`; resolves once the payment is accepted
    pub async fn close(&self, order_id: OrderId) -> CoordinatorResult<Dispatch> {
        let permit = match self.gate.try_enter(&order_id) {
            Ok(permit) => permit,
            Err(rejection) => return Ok(ignored(OperationKind::Close, &order_id, rejection)),
        };

        let ctx = self.ctx.clone();
        run_detached(OperationKind::Close, move |reply| drive(ctx, order_id, permit, reply)).await
    }
}

async fn drive(
    ctx: CoordinatorContext,
    order_id: OrderId,
    mut permit: GatePermit,
    reply: oneshot::Sender<CoordinatorResult<Dispatch>>,
) {
    let run = OperationRun::begin(&ctx, OperationKind::Close, &order_id).await;

    let (payload, tx_hash) = match submit(&ctx, &run, &order_id, &mut permit).await {
        Ok(submitted) => submitted,
        Err(e) => {
            run.fail(&e).await;
            let _ = reply.send(Err(e));
            return;
        }
    };

    if let Some(order) = ctx.source.find(&order_id).await {
        if let Err(e) = ctx.source.mark_status(&order, OrderStatus::PendingSettlement).await {
            warn!("Failed to record pending settlement of {}: {}", order_id, e);
        }
    }

    let _ = reply.send(Ok(run.submitted(&tx_hash)));
    ctx.events.publish(OrderEvent::CloseSubmitted {
        operation_id: run.id(),
        order_id: order_id.clone(),
        tx_hash: tx_hash.to_string(),
    });

    if let Err(e) = ctx.wallets.counter().confirm(&tx_hash).await {
        run.fail(&e).await;
        if let Some(order) = ctx.source.find(&order_id).await {
            if let Err(e) = ctx.source.mark_status(&order, OrderStatus::Active).await {
                warn!("Failed to reopen order {}: {}", order_id, e);
            }
        }
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
) -> CoordinatorResult<(ClosePayload, TxHash)> {
    run.advance(OperationState::AwaitingPrecondition).await?;
    let (order, origin) = ctx.source.lookup(order_id).await;
    let payload = check_close(order_id, order.as_ref(), origin, &ctx.wallets.status(), &ctx.networks)?;

    run.advance(OperationState::Signing).await?;
    debug!(
        "Requesting payment of {} to {} for order {}",
        payload.amount, payload.seller_receive_address, order_id
    );
    let tx_hash = ctx.wallets.counter().send_close(&payload).await?;
    permit.mark_sent();

    run.advance(OperationState::Confirming {
        tx_hash: tx_hash.to_string(),
    })
    .await?;
    Ok((payload, tx_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::GateRejection;
    use crate::error::{CoordinatorError, PreconditionError};
    use crate::orders::{OrderActions, Role};
    use crate::source::SnapshotOrigin;
    use crate::testing::{
        book, raw_order, CoordinatorHarness, BUYER_COUNTER, BUYER_NATIVE, SELLER_NATIVE,
    };
    use std::time::Duration;

    #[tokio::test]
    async fn test_close_pays_requested_amount_to_seller() {
        let harness = CoordinatorHarness::new(BUYER_NATIVE, BUYER_COUNTER);
        harness.backend.set(vec![book(
            1,
            vec![raw_order("o1", SELLER_NATIVE, Some(BUYER_COUNTER))],
        )]);
        harness.source.fetch_orders(1).await;

        let dispatch = harness.coordinators.close.close(OrderId::new("o1")).await.unwrap();
        assert!(matches!(dispatch, Dispatch::Submitted { .. }));

        let payload = harness.counter.last_close().unwrap();
        let order = harness.source.find(&OrderId::new("o1")).await.unwrap();
        assert_eq!(payload.amount, order.requested_amount);
        assert_eq!(payload.seller_receive_address, order.seller_receive_address);
        assert_eq!(order.status, OrderStatus::PendingSettlement);
    }

    #[tokio::test]
    async fn test_second_close_of_same_order_is_ignored() {
        let harness = CoordinatorHarness::new(BUYER_NATIVE, BUYER_COUNTER);
        harness.backend.set(vec![book(
            1,
            vec![raw_order("o1", SELLER_NATIVE, Some(BUYER_COUNTER))],
        )]);
        harness.source.fetch_orders(1).await;

        harness.coordinators.close.close(OrderId::new("o1")).await.unwrap();
        // let the owning task confirm and release the gate
        while harness.coordinators.close.in_flight().is_some() {
            tokio::task::yield_now().await;
        }

        let again = harness.coordinators.close.close(OrderId::new("o1")).await.unwrap();
        assert_eq!(
            again,
            Dispatch::Ignored(GateRejection::AlreadySent {
                order_id: OrderId::new("o1")
            })
        );
        assert_eq!(harness.counter.prompts(), 1);
    }

    #[tokio::test]
    async fn test_close_rejected_for_other_buyer() {
        let stranger = "0x00000000000000000000000000000000000000e1";
        let harness = CoordinatorHarness::new(BUYER_NATIVE, stranger);
        harness.backend.set(vec![book(
            1,
            vec![raw_order("o1", SELLER_NATIVE, Some(BUYER_COUNTER))],
        )]);
        harness.source.fetch_orders(1).await;

        let err = harness.coordinators.close.close(OrderId::new("o1")).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Precondition(PreconditionError::NotBuyer { .. })
        ));
        assert_eq!(harness.counter.prompts(), 0);
    }

    #[tokio::test]
    async fn test_unconfirmed_payment_can_be_retried() {
        let harness = CoordinatorHarness::new(BUYER_NATIVE, BUYER_COUNTER);
        harness.backend.set(vec![book(
            1,
            vec![raw_order("o1", SELLER_NATIVE, Some(BUYER_COUNTER))],
        )]);
        harness.source.fetch_orders(1).await;

        harness.counter.fail_confirmation();
        let first = harness.coordinators.close.close(OrderId::new("o1")).await.unwrap();
        let Dispatch::Submitted { operation_id, .. } = first else {
            panic!("expected submission, got {:?}", first);
        };
        while harness.coordinators.close.in_flight().is_some() {
            tokio::task::yield_now().await;
        }
        let op = harness.tracker.get(operation_id).await.unwrap();
        assert_eq!(op.state.name(), "failed");
        let order = harness.source.find(&OrderId::new("o1")).await.unwrap();
        assert_eq!(order.status, OrderStatus::Active);

        let retry = harness.coordinators.close.close(OrderId::new("o1")).await.unwrap();
        assert!(matches!(retry, Dispatch::Submitted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_available_only_to_locking_buyer_after_lock() {
        let harness = CoordinatorHarness::new(BUYER_NATIVE, BUYER_COUNTER);
        harness
            .backend
            .set(vec![book(1, vec![raw_order("o1", SELLER_NATIVE, None)])]);
        harness.source.fetch_orders(1).await;

        let before = harness.source.find(&OrderId::new("o1")).await.unwrap();
        let actions = OrderActions::resolve(
            &harness.wallets.resolver(),
            &before,
            &harness.coordinators.pending_flags(),
            SnapshotOrigin::Live,
        );
        assert!(actions.can_lock);
        assert!(!actions.can_close);

        harness.coordinators.lock.lock(OrderId::new("o1")).await.unwrap();
        harness.backend.set(vec![book(
            1,
            vec![raw_order("o1", SELLER_NATIVE, Some(BUYER_COUNTER))],
        )]);
        tokio::time::sleep(Duration::from_secs(4)).await;

        let after = harness.source.find(&OrderId::new("o1")).await.unwrap();
        assert_eq!(harness.wallets.resolver().role(&after.to_order()), Role::Buyer);
        let actions = OrderActions::resolve(
            &harness.wallets.resolver(),
            &after,
            &harness.coordinators.pending_flags(),
            SnapshotOrigin::Live,
        );
        assert!(actions.can_close);
        assert!(!actions.can_lock);

        harness.counter.switch_address("0x00000000000000000000000000000000000000e1");
        let actions = OrderActions::resolve(
            &harness.wallets.resolver(),
            &after,
            &harness.coordinators.pending_flags(),
            SnapshotOrigin::Live,
        );
        assert!(!actions.can_close);
        assert!(harness.coordinators.close.close(OrderId::new("o1")).await.is_err());
    }
}
