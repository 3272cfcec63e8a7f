//! Order book coordinator - serves the order book UI and drives swap transactions
//!
//! Polls the backend indexer for the committee order book, keeps the user's
//! own orders in a local cache, and coordinates lock, close and cancel
//! transactions through the native and counter-asset wallets.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, error, info, warn};

use orderbook_coordinator::api::{self, AppState};
use orderbook_coordinator::chain::NetworkRegistry;
use orderbook_coordinator::config::Settings;
use orderbook_coordinator::coordination::{CoordinatorContext, Coordinators, OperationTracker};
use orderbook_coordinator::events::EventBus;
use orderbook_coordinator::metrics::MetricsServer;
use orderbook_coordinator::orders::OrderTransformer;
use orderbook_coordinator::source::{HttpOrderBookApi, LocalOrderStore, OrderSource};
use orderbook_coordinator::tx::EvmCounterWallet;
use orderbook_coordinator::wallet::{NodeKeystoreWallet, WalletHub};

/// How often finished operations are pruned
const OPERATION_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Order Book Coordinator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} networks",
        settings.enabled_networks().len()
    );

    let events = EventBus::new();
    let networks = Arc::new(NetworkRegistry::from_settings(&settings));

    // Wallets
    let native = Arc::new(NodeKeystoreWallet::new(&settings.native_wallet)?);
    let counter = Arc::new(
        EvmCounterWallet::connect(
            &settings.counter_wallet,
            settings.coordinator.confirmation_timeout(),
        )
        .await?,
    );
    let wallets = WalletHub::new(native, counter);

    // Order source over the backend indexer and the local cache
    let store = Arc::new(LocalOrderStore::open(&settings.cache.path));
    info!("Order cache at {} holds {} orders", settings.cache.path, store.len());
    let source = Arc::new(OrderSource::new(
        Arc::new(HttpOrderBookApi::new(&settings.backend)?),
        store,
        OrderTransformer::new(
            settings.committee_labels(),
            settings.coordinator.display_fee_percent,
        ),
        events.clone(),
        settings.coordinator.default_committee,
        settings.coordinator.placeholder_fallback,
    ));
    source
        .set_owner(wallets.native().connection().address().map(String::from))
        .await;

    // Coordinators
    let tracker = Arc::new(OperationTracker::new());
    let coordinators = Coordinators::new(CoordinatorContext {
        source: source.clone(),
        wallets: wallets.clone(),
        networks,
        tracker: tracker.clone(),
        events: events.clone(),
        settle_delay: settings.coordinator.settle_delay(),
        cancel_reconcile_delay: settings.coordinator.cancel_reconcile_delay(),
    });
    info!("Coordinators initialized");

    // Start API server
    let api_handle = tokio::spawn({
        let state = AppState {
            source: source.clone(),
            wallets: wallets.clone(),
            coordinators,
            tracker: tracker.clone(),
        };
        let config = settings.api.clone();
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Poll the order book
    let poll_handle = tokio::spawn({
        let source = source.clone();
        let interval = Duration::from_millis(settings.coordinator.poll_interval_ms);
        async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let outcome = source.refresh().await;
                if let Some(e) = &outcome.snapshot.error {
                    warn!("Order book unavailable, showing {:?} data: {}", outcome.snapshot.origin, e);
                }
            }
        }
    });

    // Re-fetch whenever either wallet changes account, lock state or network
    let wallet_handle = tokio::spawn({
        let source = source.clone();
        let wallets = wallets.clone();
        async move {
            let mut native_rx = wallets.native().subscribe();
            let mut counter_rx = wallets.counter().subscribe();
            loop {
                tokio::select! {
                    changed = native_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let address = native_rx.borrow_and_update().address().map(String::from);
                        source.set_owner(address).await;
                    }
                    changed = counter_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        counter_rx.borrow_and_update();
                    }
                }
                debug!("Wallet connection changed, re-fetching order book");
                source.refresh().await;
            }
        }
    });

    // Prune finished operations
    let cleanup_handle = tokio::spawn({
        let tracker = tracker.clone();
        async move {
            loop {
                tokio::time::sleep(OPERATION_CLEANUP_INTERVAL).await;
                let removed = tracker.cleanup(chrono::Duration::hours(1)).await;
                if removed > 0 {
                    debug!("Pruned {} finished operations", removed);
                }
            }
        }
    });

    info!("Order Book Coordinator is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Abort background tasks
    api_handle.abort();
    poll_handle.abort();
    wallet_handle.abort();
    cleanup_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    let active = tracker.active().await;
    if !active.is_empty() {
        warn!("{} operations were still in flight at shutdown", active.len());
    }

    info!("Order Book Coordinator stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,orderbook_coordinator=debug,hyper=warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
