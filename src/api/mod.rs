//! HTTP API serving the order book UI
//!
//! Read endpoints expose the committed snapshot with per-row roles and
//! actions, both wallet states and recent operations. Write endpoints hand
//! requests to the coordinators and map their outcome onto status codes.

use crate::config::ApiConfig;
use crate::coordination::{Coordinators, Dispatch, Operation, OperationTracker};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::orders::view::apply;
use crate::orders::{DisplayOrder, OrderActions, OrderFilter, OrderId, Role, SortOrder};
use crate::source::{OrderSource, SnapshotOrigin};
use crate::wallet::{WalletHub, WalletStatus};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

const RECENT_OPERATIONS: usize = 50;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<OrderSource>,
    pub wallets: WalletHub,
    pub coordinators: Coordinators,
    pub tracker: Arc<OperationTracker>,
}

/// Build the router; separate from `run_server` so tests can drive it directly
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/orders", get(get_orders))
        .route("/orders/refresh", post(refresh_orders))
        .route("/orders/:id/lock", post(lock_order))
        .route("/orders/:id/close", post(close_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/operations", get(get_operations))
        .route("/wallets", get(get_wallets))
        .route("/wallets/native/unlock", post(unlock_native))
        .route("/wallets/native/lock", post(lock_native))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> CoordinatorResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CoordinatorError::Config(format!("Cannot bind API address {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| CoordinatorError::Internal(format!("API server stopped: {}", e)))?;

    Ok(())
}

/// Coordinator errors as HTTP responses
pub struct ApiError(CoordinatorError);

impl From<CoordinatorError> for ApiError {
    fn from(e: CoordinatorError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoordinatorError::Precondition(p) if p.is_connection() => StatusCode::PRECONDITION_FAILED,
            CoordinatorError::Precondition(_) => StatusCode::CONFLICT,
            CoordinatorError::Transaction(_)
            | CoordinatorError::Reverted { .. }
            | CoordinatorError::InsufficientBalance { .. }
            | CoordinatorError::Wallet(_)
            | CoordinatorError::ChainConnection { .. }
            | CoordinatorError::Timeout { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                retryable: self.0.is_retryable(),
            }),
        )
            .into_response()
    }
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Committed order book with the current user's role and actions per row
async fn get_orders(State(state): State<AppState>, Query(query): Query<OrdersQuery>) -> impl IntoResponse {
    let snapshot = state.source.snapshot().await;
    let resolver = state.wallets.resolver();
    let pending = state.coordinators.pending_flags();

    let orders = apply(
        &snapshot.orders,
        query.filter.unwrap_or_default(),
        query.sort.unwrap_or_default(),
    )
    .into_iter()
    .map(|order| OrderRow {
        role: resolver.role(&order.to_order()),
        actions: OrderActions::resolve(&resolver, &order, &pending, snapshot.origin),
        order,
    })
    .collect();

    Json(OrdersResponse {
        committee: snapshot.committee,
        sequence: snapshot.sequence,
        origin: snapshot.origin,
        error: snapshot.error.clone(),
        fetched_at: snapshot.fetched_at,
        in_flight: InFlight {
            lock: state.coordinators.lock.in_flight(),
            close: state.coordinators.close.in_flight(),
            cancel: state.coordinators.cancel.in_flight(),
        },
        orders,
    })
}

/// Re-fetch now, optionally switching committee
async fn refresh_orders(State(state): State<AppState>, Query(query): Query<RefreshQuery>) -> impl IntoResponse {
    let committee = query.committee.unwrap_or_else(|| state.source.committee());
    let outcome = state.source.fetch_orders(committee).await;

    Json(RefreshResponse {
        committed: outcome.committed,
        committee,
        sequence: outcome.snapshot.sequence,
        origin: outcome.snapshot.origin,
        order_count: outcome.snapshot.orders.len(),
        error: outcome.snapshot.error.clone(),
    })
}

async fn lock_order(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let dispatch = state.coordinators.lock.lock(OrderId::new(id)).await?;
    Ok(dispatch_response(dispatch))
}

async fn close_order(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let dispatch = state.coordinators.close.close(OrderId::new(id)).await?;
    Ok(dispatch_response(dispatch))
}

async fn cancel_order(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let dispatch = state.coordinators.cancel.cancel(OrderId::new(id)).await?;
    Ok(dispatch_response(dispatch))
}

fn dispatch_response(dispatch: Dispatch) -> Response {
    match dispatch {
        Dispatch::Submitted { .. } => (StatusCode::ACCEPTED, Json(dispatch)).into_response(),
        Dispatch::Ignored(_) => (StatusCode::OK, Json(dispatch)).into_response(),
    }
}

async fn get_operations(State(state): State<AppState>) -> Json<Vec<Operation>> {
    Json(state.tracker.recent(RECENT_OPERATIONS).await)
}

async fn get_wallets(State(state): State<AppState>) -> Json<WalletStatus> {
    Json(state.wallets.status())
}

async fn unlock_native(
    State(state): State<AppState>,
    Json(body): Json<UnlockRequest>,
) -> Result<Json<WalletStatus>, ApiError> {
    state.wallets.native().unlock(body.password)?;
    Ok(Json(state.wallets.status()))
}

async fn lock_native(State(state): State<AppState>) -> Json<WalletStatus> {
    state.wallets.native().lock();
    Json(state.wallets.status())
}

// Request and response types

#[derive(Debug, Default, Deserialize)]
struct OrdersQuery {
    filter: Option<OrderFilter>,
    sort: Option<SortOrder>,
}

#[derive(Debug, Default, Deserialize)]
struct RefreshQuery {
    committee: Option<u64>,
}

#[derive(Deserialize)]
struct UnlockRequest {
    password: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    retryable: bool,
}

#[derive(Serialize)]
struct OrderRow {
    #[serde(flatten)]
    order: DisplayOrder,
    role: Role,
    actions: OrderActions,
}

#[derive(Serialize)]
struct InFlight {
    lock: Option<OrderId>,
    close: Option<OrderId>,
    cancel: Option<OrderId>,
}

#[derive(Serialize)]
struct OrdersResponse {
    committee: u64,
    sequence: u64,
    origin: SnapshotOrigin,
    error: Option<String>,
    fetched_at: DateTime<Utc>,
    in_flight: InFlight,
    orders: Vec<OrderRow>,
}

#[derive(Serialize)]
struct RefreshResponse {
    committed: bool,
    committee: u64,
    sequence: u64,
    origin: SnapshotOrigin,
    order_count: usize,
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{book, raw_order, CoordinatorHarness, BUYER_COUNTER, BUYER_NATIVE, SELLER_NATIVE};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(harness: &CoordinatorHarness) -> Router {
        router(AppState {
            source: harness.source.clone(),
            wallets: harness.wallets.clone(),
            coordinators: harness.coordinators.clone(),
            tracker: harness.tracker.clone(),
        })
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_orders_carry_role_and_actions() {
        let harness = CoordinatorHarness::new(BUYER_NATIVE, BUYER_COUNTER);
        harness.backend.set(vec![book(
            1,
            vec![
                raw_order("open", SELLER_NATIVE, None),
                raw_order("mine", SELLER_NATIVE, Some(BUYER_COUNTER)),
            ],
        )]);
        harness.source.fetch_orders(1).await;

        let (status, body) = call(app(&harness), "GET", "/orders?filter=active&sort=oldest").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["origin"], "live");

        let rows = body["orders"].as_array().unwrap();
        let open = rows.iter().find(|r| r["id"] == "open").unwrap();
        assert_eq!(open["role"], "other");
        assert_eq!(open["actions"]["can_lock"], true);

        let mine = rows.iter().find(|r| r["id"] == "mine").unwrap();
        assert_eq!(mine["role"], "buyer");
        assert_eq!(mine["actions"]["can_close"], true);
        assert_eq!(mine["actions"]["can_lock"], false);
    }

    #[tokio::test]
    async fn test_unknown_filter_is_bad_request() {
        let harness = CoordinatorHarness::new(BUYER_NATIVE, BUYER_COUNTER);
        let (status, _) = call(app(&harness), "GET", "/orders?filter=bogus").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_lock_endpoint_status_codes() {
        let harness = CoordinatorHarness::new(BUYER_NATIVE, BUYER_COUNTER);
        harness.backend.set(vec![book(
            1,
            vec![
                raw_order("open", SELLER_NATIVE, None),
                raw_order("taken", SELLER_NATIVE, Some("0x00000000000000000000000000000000000000e1")),
            ],
        )]);
        harness.source.fetch_orders(1).await;

        let (status, body) = call(app(&harness), "POST", "/orders/open/lock").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "submitted");
        assert!(body["tx_hash"].as_str().unwrap().starts_with("0x"));
        while harness.coordinators.lock.in_flight().is_some() {
            tokio::task::yield_now().await;
        }

        let (status, body) = call(app(&harness), "POST", "/orders/taken/lock").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Order taken is already locked");
    }

    #[tokio::test]
    async fn test_busy_lock_is_ignored() {
        let harness = CoordinatorHarness::new(BUYER_NATIVE, BUYER_COUNTER);
        harness.backend.set(vec![book(
            1,
            vec![raw_order("a", SELLER_NATIVE, None), raw_order("b", SELLER_NATIVE, None)],
        )]);
        harness.source.fetch_orders(1).await;
        harness.counter.hold_signing();

        let first = tokio::spawn(call(app(&harness), "POST", "/orders/a/lock"));
        harness.counter.wait_for_prompts(1).await;

        let (status, body) = call(app(&harness), "POST", "/orders/b/lock").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ignored");
        assert_eq!(body["reason"], "busy");

        harness.counter.release_signing();
        assert_eq!(first.await.unwrap().0, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_signature_rejection_is_bad_gateway() {
        let harness = CoordinatorHarness::new(BUYER_NATIVE, BUYER_COUNTER);
        harness
            .backend
            .set(vec![book(1, vec![raw_order("o1", SELLER_NATIVE, None)])]);
        harness.source.fetch_orders(1).await;
        harness.counter.fail_next("User rejected the request");

        let (status, body) = call(app(&harness), "POST", "/orders/o1/lock").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "User rejected the request");
    }

    #[tokio::test]
    async fn test_locked_wallet_is_precondition_failed() {
        let harness = CoordinatorHarness::new(SELLER_NATIVE, BUYER_COUNTER);
        harness
            .backend
            .set(vec![book(1, vec![raw_order("o1", SELLER_NATIVE, None)])]);
        harness.source.fetch_orders(1).await;

        let (_, wallets) = call(app(&harness), "POST", "/wallets/native/lock").await;
        assert_eq!(wallets["native"]["state"], "locked");

        let (status, _) = call(app(&harness), "POST", "/orders/o1/cancel").await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(harness.native.prompts(), 0);
    }

    #[tokio::test]
    async fn test_refresh_and_operations() {
        let harness = CoordinatorHarness::new(BUYER_NATIVE, BUYER_COUNTER);
        harness
            .backend
            .set(vec![book(1, vec![raw_order("o1", SELLER_NATIVE, None)])]);

        let (status, body) = call(app(&harness), "POST", "/orders/refresh?committee=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["committed"], true);
        assert_eq!(body["order_count"], 1);
        assert_eq!(harness.backend.calls(), 1);

        call(app(&harness), "POST", "/orders/o1/lock").await;
        let (_, operations) = call(app(&harness), "GET", "/operations").await;
        let operations = operations.as_array().unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0]["kind"], "lock");
    }
}
