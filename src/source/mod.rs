//! Order source - fetches the order book and owns the visible snapshot
//!
//! Handles:
//! - Sequencing of overlapping fetches so only the latest result is committed
//! - Fallback to the local cache, then to placeholder data, on transport errors
//! - Local status overlays (cancelled, pending settlement) the backend never reports
//! - Delayed re-fetches after a transaction settles

pub mod api;
pub mod cache;
pub mod placeholder;

pub use api::{HttpOrderBookApi, OrderBookApi};
pub use cache::LocalOrderStore;

use crate::error::CoordinatorResult;
use crate::events::{EventBus, OrderEvent};
use crate::orders::{
    addresses_equal, ChainOrderBook, DisplayOrder, Order, OrderId, OrderStatus, OrderTransformer,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where the orders of a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOrigin {
    Live,
    Cache,
    Placeholder,
}

/// One committed view of the order book
#[derive(Debug, Clone, Serialize)]
pub struct OrderBookSnapshot {
    pub committee: u64,
    pub sequence: u64,
    pub origin: SnapshotOrigin,
    pub orders: Vec<DisplayOrder>,
    /// Fetch error for a non-blocking banner
    pub error: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl OrderBookSnapshot {
    pub fn find(&self, id: &OrderId) -> Option<&DisplayOrder> {
        self.orders.iter().find(|o| &o.id == id)
    }
}

/// Result of one fetch call
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub snapshot: Arc<OrderBookSnapshot>,
    /// False when a newer fetch was dispatched before this one resolved
    pub committed: bool,
}

/// Fetches, reconciles and publishes the order book
pub struct OrderSource {
    api: Arc<dyn OrderBookApi>,
    store: Arc<LocalOrderStore>,
    transformer: OrderTransformer,
    events: EventBus,
    placeholder_fallback: bool,
    /// Last dispatched fetch
    latest_sequence: AtomicU64,
    committee: AtomicU64,
    current: RwLock<Arc<OrderBookSnapshot>>,
    owner: RwLock<Option<String>>,
    first_seen: DashMap<OrderId, DateTime<Utc>>,
}

impl OrderSource {
    /// Create a source whose initial snapshot is the cached book of `committee`
    pub fn new(
        api: Arc<dyn OrderBookApi>,
        store: Arc<LocalOrderStore>,
        transformer: OrderTransformer,
        events: EventBus,
        committee: u64,
        placeholder_fallback: bool,
    ) -> Self {
        let initial = OrderBookSnapshot {
            committee,
            sequence: 0,
            origin: SnapshotOrigin::Cache,
            orders: store.orders_for(committee),
            error: None,
            fetched_at: Utc::now(),
        };

        Self {
            api,
            store,
            transformer,
            events,
            placeholder_fallback,
            latest_sequence: AtomicU64::new(0),
            committee: AtomicU64::new(committee),
            current: RwLock::new(Arc::new(initial)),
            owner: RwLock::new(None),
            first_seen: DashMap::new(),
        }
    }

    /// Set the native address whose orders are kept in the local cache
    pub async fn set_owner(&self, address: Option<String>) {
        *self.owner.write().await = address;
    }

    /// Committee of the most recent fetch
    pub fn committee(&self) -> u64 {
        self.committee.load(Ordering::SeqCst)
    }

    /// Currently committed snapshot
    pub async fn snapshot(&self) -> Arc<OrderBookSnapshot> {
        self.current.read().await.clone()
    }

    /// Look an order up in the committed snapshot
    pub async fn find(&self, id: &OrderId) -> Option<DisplayOrder> {
        self.current.read().await.find(id).cloned()
    }

    /// Look an order up together with the origin of the snapshot holding it
    pub async fn lookup(&self, id: &OrderId) -> (Option<DisplayOrder>, SnapshotOrigin) {
        let current = self.current.read().await;
        (current.find(id).cloned(), current.origin)
    }

    /// Fetch the book of a committee; never fails, see [`FetchOutcome`]
    pub async fn fetch_orders(&self, committee: u64) -> FetchOutcome {
        let sequence = self.latest_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.committee.store(committee, Ordering::SeqCst);
        debug!("Dispatching order book fetch #{} for committee {}", sequence, committee);

        let snapshot = match self.api.fetch_order_books(committee).await {
            Ok(books) => OrderBookSnapshot {
                committee,
                sequence,
                origin: SnapshotOrigin::Live,
                orders: self.reconcile(committee, books).await,
                error: None,
                fetched_at: Utc::now(),
            },
            Err(e) => {
                warn!("Order book fetch #{} for committee {} failed: {}", sequence, committee, e);
                self.fallback(committee, sequence, e.to_string())
            }
        };
        let snapshot = Arc::new(snapshot);

        let mut current = self.current.write().await;
        let latest = self.latest_sequence.load(Ordering::SeqCst);
        if sequence != latest {
            drop(current);
            debug!("Discarding stale fetch #{} (latest is #{})", sequence, latest);
            crate::metrics::record_stale_fetch(committee);
            self.events.publish(OrderEvent::StaleFetchDiscarded {
                committee,
                sequence,
                latest,
            });
            return FetchOutcome {
                snapshot,
                committed: false,
            };
        }
        *current = snapshot.clone();
        drop(current);

        crate::metrics::record_fetch(committee, snapshot.origin, snapshot.orders.len());
        self.events.publish(OrderEvent::OrderBookUpdated {
            committee,
            sequence,
            origin: snapshot.origin,
            order_count: snapshot.orders.len(),
        });

        FetchOutcome {
            snapshot,
            committed: true,
        }
    }

    /// Re-fetch the committee currently on display
    pub async fn refresh(&self) -> FetchOutcome {
        self.fetch_orders(self.committee()).await
    }

    /// Re-fetch after a settling delay so the indexer can observe new state
    pub fn schedule_refresh(self: &Arc<Self>, committee: u64, delay: Duration) -> JoinHandle<()> {
        let source = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("Settling delay elapsed, re-fetching committee {}", committee);
            source.fetch_orders(committee).await;
        })
    }

    /// Apply a local status to the visible book and persist it
    pub async fn mark_status(&self, order: &DisplayOrder, status: OrderStatus) -> CoordinatorResult<()> {
        {
            let mut current = self.current.write().await;
            let snapshot = Arc::make_mut(&mut *current);
            if let Some(visible) = snapshot.orders.iter_mut().find(|o| o.id == order.id) {
                visible.status = status;
            }
        }
        self.store.set_status(order, status)?;
        info!("Order {} marked {}", order.id, status);
        Ok(())
    }

    /// Validate, transform and overlay local markers on a live result
    async fn reconcile(&self, committee: u64, books: Vec<ChainOrderBook>) -> Vec<DisplayOrder> {
        let mut orders = Vec::new();
        let mut seen = HashSet::new();
        let mut expired = Vec::new();

        for raw in books.into_iter().flat_map(|b| b.orders) {
            let mut order = match Order::try_from(raw) {
                Ok(order) => order,
                Err(e) => {
                    warn!("Skipping order from committee {}: {}", committee, e);
                    continue;
                }
            };
            if !seen.insert(order.id.clone()) {
                continue;
            }
            if order.created_at.is_none() {
                let first_seen = *self.first_seen.entry(order.id.clone()).or_insert_with(Utc::now);
                order.created_at = Some(first_seen);
            }

            let mut display = self.transformer.transform(&order);
            match self.store.get(&display.id) {
                Some(cached)
                    if cached.status == OrderStatus::PendingSettlement
                        && !same_lock(&cached, &display) =>
                {
                    let id = &display.id;
                    debug!("Order {} is no longer locked by the paying buyer", id);
                    expired.push(display.id.clone());
                }
                Some(cached) => display.status = cached.status,
                None => {}
            }
            orders.push(display);
        }

        // anything else the backend no longer lists has settled or been withdrawn
        expired.extend(
            self.store
                .orders_for(committee)
                .into_iter()
                .filter(|o| o.status != OrderStatus::Cancelled && !seen.contains(&o.id))
                .map(|o| o.id),
        );
        match self.store.remove(&expired) {
            Ok(0) => {}
            Ok(n) => debug!("Dropped {} cached orders superseded by committee {}", n, committee),
            Err(e) => warn!("Failed to prune order cache: {}", e),
        }

        // the backend omits cancelled orders; keep showing them
        for cancelled in self.store.cancelled_for(committee) {
            if !seen.contains(&cancelled.id) {
                orders.push(cancelled);
            }
        }

        if let Some(owner) = self.owner.read().await.as_deref() {
            let owned: Vec<DisplayOrder> = orders
                .iter()
                .filter(|o| o.status == OrderStatus::Active)
                .filter(|o| addresses_equal(owner, &o.sellers_send_address))
                .cloned()
                .collect();
            if let Err(e) = self.store.upsert_owned(&owned) {
                warn!("Failed to update order cache: {}", e);
            }
        }

        orders
    }

    fn fallback(&self, committee: u64, sequence: u64, error: String) -> OrderBookSnapshot {
        let cached = self.store.orders_for(committee);
        let (origin, orders) = if !cached.is_empty() {
            (SnapshotOrigin::Cache, cached)
        } else if self.placeholder_fallback {
            let orders = placeholder::placeholder_orders(committee)
                .into_iter()
                .filter_map(|raw| self.transformer.transform_raw(raw).ok())
                .collect();
            (SnapshotOrigin::Placeholder, orders)
        } else {
            (SnapshotOrigin::Cache, Vec::new())
        };

        OrderBookSnapshot {
            committee,
            sequence,
            origin,
            orders,
            error: Some(error),
            fetched_at: Utc::now(),
        }
    }
}

/// The live order is still locked by the buyer recorded when it was paid
fn same_lock(cached: &DisplayOrder, live: &DisplayOrder) -> bool {
    match (&cached.buyer_receive_address, &live.buyer_receive_address) {
        (Some(paid_by), Some(locked_by)) => live.locked && addresses_equal(paid_by, locked_by),
        _ => false,
    }
}
