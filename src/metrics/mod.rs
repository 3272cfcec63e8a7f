//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Order book fetches and their origin
//! - Stale fetches discarded
//! - Coordinator operations by kind and outcome
//! - Precondition rejections by reason

use crate::coordination::OperationKind;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::events::OrderEvent;
use crate::source::SnapshotOrigin;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Order book metrics
    pub static ref FETCHES: CounterVec = register_counter_vec!(
        "orderbook_fetches_total",
        "Order book fetches committed, by origin",
        &["committee", "origin"]
    ).unwrap();

    pub static ref STALE_FETCHES: CounterVec = register_counter_vec!(
        "orderbook_stale_fetches_total",
        "Fetch results discarded because a newer fetch was dispatched",
        &["committee"]
    ).unwrap();

    pub static ref ORDERS_ON_BOOK: GaugeVec = register_gauge_vec!(
        "orderbook_orders",
        "Orders in the committed snapshot",
        &["committee"]
    ).unwrap();

    // Event metrics
    pub static ref EVENTS_PUBLISHED: CounterVec = register_counter_vec!(
        "orderbook_events_published_total",
        "Events published by type",
        &["event_type"]
    ).unwrap();

    // Operation metrics
    pub static ref OPERATIONS_STARTED: CounterVec = register_counter_vec!(
        "orderbook_operations_started_total",
        "Coordinator operations started",
        &["kind"]
    ).unwrap();

    pub static ref OPERATIONS_IGNORED: CounterVec = register_counter_vec!(
        "orderbook_operations_ignored_total",
        "Requests dropped because another attempt was in flight",
        &["kind"]
    ).unwrap();

    pub static ref OPERATIONS_SUBMITTED: CounterVec = register_counter_vec!(
        "orderbook_operations_submitted_total",
        "Transactions accepted by the network",
        &["kind"]
    ).unwrap();

    pub static ref OPERATIONS_SETTLED: CounterVec = register_counter_vec!(
        "orderbook_operations_settled_total",
        "Transactions confirmed",
        &["kind"]
    ).unwrap();

    pub static ref OPERATIONS_FAILED: CounterVec = register_counter_vec!(
        "orderbook_operations_failed_total",
        "Operations that failed after passing preconditions",
        &["kind"]
    ).unwrap();

    pub static ref PRECONDITION_REJECTIONS: CounterVec = register_counter_vec!(
        "orderbook_precondition_rejections_total",
        "Operations refused before any signing prompt",
        &["kind", "reason"]
    ).unwrap();

    pub static ref OPERATION_LATENCY: HistogramVec = register_histogram_vec!(
        "orderbook_operation_latency_seconds",
        "Time from request to confirmed transaction",
        &["kind"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> CoordinatorResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| CoordinatorError::Config(format!("Cannot bind metrics port {}: {}", self.port, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| CoordinatorError::Internal(format!("Metrics server stopped: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// Helper functions to record metrics

pub fn record_fetch(committee: u64, origin: SnapshotOrigin, order_count: usize) {
    let committee = committee.to_string();
    let origin = match origin {
        SnapshotOrigin::Live => "live",
        SnapshotOrigin::Cache => "cache",
        SnapshotOrigin::Placeholder => "placeholder",
    };
    FETCHES.with_label_values(&[&committee, origin]).inc();
    ORDERS_ON_BOOK
        .with_label_values(&[&committee])
        .set(order_count as f64);
}

pub fn record_stale_fetch(committee: u64) {
    STALE_FETCHES
        .with_label_values(&[&committee.to_string()])
        .inc();
}

pub fn record_event(event: &OrderEvent) {
    EVENTS_PUBLISHED.with_label_values(&[event.name()]).inc();
}

pub fn record_operation_started(kind: OperationKind) {
    OPERATIONS_STARTED.with_label_values(&[kind.as_str()]).inc();
}

pub fn record_operation_ignored(kind: OperationKind) {
    OPERATIONS_IGNORED.with_label_values(&[kind.as_str()]).inc();
}

pub fn record_operation_submitted(kind: OperationKind) {
    OPERATIONS_SUBMITTED.with_label_values(&[kind.as_str()]).inc();
}

pub fn record_operation_settled(kind: OperationKind, latency_secs: f64) {
    OPERATIONS_SETTLED.with_label_values(&[kind.as_str()]).inc();
    OPERATION_LATENCY
        .with_label_values(&[kind.as_str()])
        .observe(latency_secs);
}

pub fn record_operation_failed(kind: OperationKind) {
    OPERATIONS_FAILED.with_label_values(&[kind.as_str()]).inc();
}

pub fn record_precondition_rejected(kind: OperationKind, reason: &str) {
    PRECONDITION_REJECTIONS
        .with_label_values(&[kind.as_str(), reason])
        .inc();
}
