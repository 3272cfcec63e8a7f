//! Fixtures and fakes shared by the unit tests

use crate::chain::{Network, NetworkRegistry};
use crate::coordination::{CoordinatorContext, Coordinators, OperationTracker};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::events::EventBus;
use crate::orders::{ChainOrderBook, DisplayOrder, OrderTransformer, RawOrder};
use crate::source::{LocalOrderStore, OrderBookApi, OrderSource};
use crate::tx::{ClosePayload, LockPayload};
use crate::wallet::{
    CounterAssetWallet, CounterConnection, DeleteOrderRequest, NativeConnection, NativeWallet,
    TxHash, WalletHub,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch, Notify, Semaphore};

pub const SELLER_NATIVE: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f9012345678";
pub const BUYER_NATIVE: &str = "b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0";
pub const BUYER_COUNTER: &str = "0x00000000000000000000000000000000000000b1";
pub const SELLER_COUNTER: &str = "0x00000000000000000000000000000000000000d0";
pub const USDC: &str = "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238";
pub const SEPOLIA: u64 = 11155111;

/// 1000 units for 1000 units; `buyer` locks the order with both buyer addresses
pub fn raw_order(id: &str, seller: &str, buyer: Option<&str>) -> RawOrder {
    RawOrder {
        id: Some(id.to_string()),
        committee: Some(1),
        amount_for_sale: Some(1_000_000_000),
        requested_amount: Some(1_000_000_000),
        sellers_send_address: Some(seller.to_string()),
        seller_receive_address: Some(SELLER_COUNTER.to_string()),
        buyer_receive_address: buyer.map(String::from),
        buyer_send_address: buyer.map(String::from),
        buyer_chain_deadline: buyer.map(|_| 1_000),
        created_at: None,
    }
}

pub fn display_order(id: &str, committee: u64, seller: &str, buyer: Option<&str>) -> DisplayOrder {
    let mut raw = raw_order(id, seller, buyer);
    raw.committee = Some(committee);
    OrderTransformer::default()
        .transform_raw(raw)
        .expect("fixture order is well formed")
}

pub fn book(chain_id: u64, orders: Vec<RawOrder>) -> ChainOrderBook {
    ChainOrderBook {
        chain_id: Some(chain_id),
        orders,
    }
}

/// Backend answering every fetch with whatever was last `set`
#[derive(Default)]
pub struct StaticOrderBookApi {
    books: Mutex<Vec<ChainOrderBook>>,
    failure: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl StaticOrderBookApi {
    pub fn set(&self, books: Vec<ChainOrderBook>) {
        *self.failure.lock().unwrap() = None;
        *self.books.lock().unwrap() = books;
    }

    /// Fail every fetch with a transport error until the next `set`
    pub fn fail(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderBookApi for StaticOrderBookApi {
    async fn fetch_order_books(&self, _committee: u64) -> CoordinatorResult<Vec<ChainOrderBook>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(CoordinatorError::Transport(message));
        }
        Ok(self.books.lock().unwrap().clone())
    }
}

type FetchReply = oneshot::Sender<CoordinatorResult<Vec<ChainOrderBook>>>;

/// Backend whose responses are released by the test, in any order
#[derive(Default)]
pub struct GatedOrderBookApi {
    pending: Mutex<Vec<Option<FetchReply>>>,
    called: Notify,
}

impl GatedOrderBookApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn wait_for_calls(&self, n: usize) {
        loop {
            let called = self.called.notified();
            if self.pending.lock().unwrap().len() >= n {
                return;
            }
            called.await;
        }
    }

    /// Resolve the `index`-th call (0-based)
    pub fn release(&self, index: usize, result: CoordinatorResult<Vec<ChainOrderBook>>) {
        let reply = self.pending.lock().unwrap()[index]
            .take()
            .expect("call released twice");
        let _ = reply.send(result);
    }
}

#[async_trait]
impl OrderBookApi for GatedOrderBookApi {
    async fn fetch_order_books(&self, _committee: u64) -> CoordinatorResult<Vec<ChainOrderBook>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().push(Some(tx));
        self.called.notify_waiters();
        rx.await
            .unwrap_or_else(|_| Err(CoordinatorError::Transport("request dropped".to_string())))
    }
}

/// Native wallet that counts signing prompts
pub struct FakeNativeWallet {
    address: String,
    state: watch::Sender<NativeConnection>,
    prompts: AtomicUsize,
}

impl FakeNativeWallet {
    pub fn unlocked(address: &str) -> Self {
        let (state, _) = watch::channel(NativeConnection::Unlocked {
            address: address.to_string(),
        });
        Self {
            address: address.to_string(),
            state,
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NativeWallet for FakeNativeWallet {
    fn connection(&self) -> NativeConnection {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<NativeConnection> {
        self.state.subscribe()
    }

    fn unlock(&self, _password: String) -> CoordinatorResult<()> {
        self.state.send_replace(NativeConnection::Unlocked {
            address: self.address.clone(),
        });
        Ok(())
    }

    fn lock(&self) {
        self.state.send_replace(NativeConnection::Locked {
            address: self.address.clone(),
        });
    }

    async fn delete_order(&self, request: &DeleteOrderRequest) -> CoordinatorResult<TxHash> {
        let n = self.prompts.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TxHash(format!("delete-{}-{}", request.order_id, n)))
    }
}

/// Counter-asset wallet whose signing step can be held open
pub struct FakeCounterWallet {
    state: watch::Sender<CounterConnection>,
    prompts: AtomicUsize,
    prompted: Notify,
    held: AtomicBool,
    release: Semaphore,
    fail_next: Mutex<Option<String>>,
    fail_confirmation: AtomicBool,
    last_lock: Mutex<Option<LockPayload>>,
    last_close: Mutex<Option<ClosePayload>>,
}

impl FakeCounterWallet {
    pub fn connected(address: &str) -> Self {
        let (state, _) = watch::channel(CounterConnection::Connected {
            address: address.to_string(),
            chain_id: SEPOLIA,
        });
        Self {
            state,
            prompts: AtomicUsize::new(0),
            prompted: Notify::new(),
            held: AtomicBool::new(false),
            release: Semaphore::new(0),
            fail_next: Mutex::new(None),
            fail_confirmation: AtomicBool::new(false),
            last_lock: Mutex::new(None),
            last_close: Mutex::new(None),
        }
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    pub async fn wait_for_prompts(&self, n: usize) {
        loop {
            let prompted = self.prompted.notified();
            if self.prompts() >= n {
                return;
            }
            prompted.await;
        }
    }

    /// Keep every signing prompt open until `release_signing`
    pub fn hold_signing(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release_signing(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.release.add_permits(Semaphore::MAX_PERMITS >> 4);
    }

    /// Reject the next signing prompt with `message`
    pub fn fail_next(&self, message: &str) {
        *self.fail_next.lock().unwrap() = Some(message.to_string());
    }

    /// Report the next transaction as reverted
    pub fn fail_confirmation(&self) {
        self.fail_confirmation.store(true, Ordering::SeqCst);
    }

    pub fn switch_address(&self, address: &str) {
        self.state.send_replace(CounterConnection::Connected {
            address: address.to_string(),
            chain_id: SEPOLIA,
        });
    }

    pub fn last_lock(&self) -> Option<LockPayload> {
        self.last_lock.lock().unwrap().clone()
    }

    pub fn last_close(&self) -> Option<ClosePayload> {
        self.last_close.lock().unwrap().clone()
    }

    async fn sign(&self) -> CoordinatorResult<TxHash> {
        let n = self.prompts.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompted.notify_waiters();

        if self.held.load(Ordering::SeqCst) {
            let _ = self.release.acquire().await;
        }
        if let Some(message) = self.fail_next.lock().unwrap().take() {
            return Err(CoordinatorError::Transaction(message));
        }
        Ok(TxHash(format!("0x{:064x}", n)))
    }
}

#[async_trait]
impl CounterAssetWallet for FakeCounterWallet {
    fn connection(&self) -> CounterConnection {
        self.state.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<CounterConnection> {
        self.state.subscribe()
    }

    async fn send_lock(&self, payload: &LockPayload) -> CoordinatorResult<TxHash> {
        *self.last_lock.lock().unwrap() = Some(payload.clone());
        self.sign().await
    }

    async fn send_close(&self, payload: &ClosePayload) -> CoordinatorResult<TxHash> {
        *self.last_close.lock().unwrap() = Some(payload.clone());
        self.sign().await
    }

    async fn confirm(&self, tx_hash: &TxHash) -> CoordinatorResult<()> {
        if self.fail_confirmation.swap(false, Ordering::SeqCst) {
            return Err(CoordinatorError::Reverted {
                chain_id: SEPOLIA,
                tx_hash: tx_hash.to_string(),
            });
        }
        Ok(())
    }
}

/// Coordinators wired to fake wallets, a static backend and a temp cache
pub struct CoordinatorHarness {
    pub backend: Arc<StaticOrderBookApi>,
    pub store: Arc<LocalOrderStore>,
    pub source: Arc<OrderSource>,
    pub native: Arc<FakeNativeWallet>,
    pub counter: Arc<FakeCounterWallet>,
    pub wallets: WalletHub,
    pub networks: Arc<NetworkRegistry>,
    pub tracker: Arc<OperationTracker>,
    pub events: EventBus,
    pub coordinators: Coordinators,
    _dir: tempfile::TempDir,
}

impl CoordinatorHarness {
    pub fn new(native: &str, counter: &str) -> Self {
        Self::with_placeholder_fallback(native, counter, false)
    }

    pub fn with_placeholder_fallback(native: &str, counter: &str, placeholder_fallback: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalOrderStore::open(dir.path().join("orders.json")));
        let backend = Arc::new(StaticOrderBookApi::default());
        let events = EventBus::new();
        let source = Arc::new(OrderSource::new(
            backend.clone(),
            store.clone(),
            OrderTransformer::default(),
            events.clone(),
            1,
            placeholder_fallback,
        ));

        let native = Arc::new(FakeNativeWallet::unlocked(native));
        let counter = Arc::new(FakeCounterWallet::connected(counter));
        let wallets = WalletHub::new(native.clone(), counter.clone());
        let networks = Arc::new(NetworkRegistry::new(vec![Network {
            chain_id: SEPOLIA,
            name: "Sepolia".to_string(),
            token_address: USDC.to_string(),
        }]));
        let tracker = Arc::new(OperationTracker::new());

        let coordinators = Coordinators::new(CoordinatorContext {
            source: source.clone(),
            wallets: wallets.clone(),
            networks: networks.clone(),
            tracker: tracker.clone(),
            events: events.clone(),
            settle_delay: Duration::from_secs(3),
            cancel_reconcile_delay: Duration::from_secs(2),
        });

        Self {
            backend,
            store,
            source,
            native,
            counter,
            wallets,
            networks,
            tracker,
            events,
            coordinators,
            _dir: dir,
        }
    }
}
