// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use marketplace_orders::errors::{AppError, Result as AppResult};
use marketplace_orders::models::{
  Actor, CheckoutLine, CheckoutRequest, DeliveryType, Notification, Order, OrderFilter, OrderStatus, Permission,
  Product, ProductStatus, SettlementOutcome, SettlementRequest, SettlementResult, Shop, ShopManager, ShopStats,
  ShopStatus,
};
use marketplace_orders::pipelines::{self, SettlementDisposition};
use marketplace_orders::services::bus::MemoryBus;
use marketplace_orders::services::{ExchangeClient, MessageBus, WalletAccount, WalletClient};
use marketplace_orders::store::{CatalogStore, MemoryStore, OrderStore, StatusChange};
use marketplace_orders::{AppConfig, AppState};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::Level;
use uuid::Uuid;

pub const BUYER_ACCOUNT: &str = "acct-buyer";
pub const SHOP_ACCOUNT: &str = "acct-shop";

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Collaborator fakes ---

#[derive(Default)]
pub struct FakeWallet {
  accounts: Mutex<HashMap<String, WalletAccount>>,
  pub hang: AtomicBool,
}

impl FakeWallet {
  pub fn put_account(&self, account: WalletAccount) {
    self.accounts.lock().insert(account.id.clone(), account);
  }
}

#[async_trait]
impl WalletClient for FakeWallet {
  async fn account(&self, account_id: &str) -> AppResult<Option<WalletAccount>> {
    if self.hang.load(Ordering::SeqCst) {
      std::future::pending::<()>().await;
    }
    Ok(self.accounts.lock().get(account_id).cloned())
  }
}

#[derive(Default)]
pub struct FakeExchange {
  rates: Mutex<HashMap<(String, String), Decimal>>,
  pub calls: AtomicUsize,
  pub hang: AtomicBool,
}

impl FakeExchange {
  pub fn set_rate(&self, from: &str, to: &str, rate: Decimal) {
    self.rates.lock().insert((from.to_string(), to.to_string()), rate);
  }
}

#[async_trait]
impl ExchangeClient for FakeExchange {
  async fn rate(&self, from: &str, to: &str) -> AppResult<Decimal> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.hang.load(Ordering::SeqCst) {
      std::future::pending::<()>().await;
    }
    self
      .rates
      .lock()
      .get(&(from.to_string(), to.to_string()))
      .copied()
      .ok_or_else(|| AppError::NotFound(format!("no rate {}->{}", from, to)))
  }
}

/// Delegates to a `MemoryStore`, with scripted trouble on correlation lookups:
/// the first `failures` lookups fail as a database outage would, and a lookup
/// armed with `stall_next` finds its order and then waits for `release`.
pub struct ScriptedOrders {
  inner: Arc<MemoryStore>,
  pub failures: AtomicUsize,
  pub lookups: AtomicUsize,
  stall: Mutex<Option<String>>,
  located: Notify,
  release: Notify,
}

impl ScriptedOrders {
  pub fn new(inner: Arc<MemoryStore>) -> Self {
    Self {
      inner,
      failures: AtomicUsize::new(0),
      lookups: AtomicUsize::new(0),
      stall: Mutex::new(None),
      located: Notify::new(),
      release: Notify::new(),
    }
  }

  pub fn fail_next_lookups(&self, count: usize) {
    self.failures.store(count, Ordering::SeqCst);
  }

  /// The next lookup of `correlation_id` holds its result until `release`.
  pub fn stall_next(&self, correlation_id: &str) {
    *self.stall.lock() = Some(correlation_id.to_string());
  }

  /// Resolves once the stalled lookup has read the order.
  pub async fn stalled(&self) {
    self.located.notified().await;
  }

  pub fn release(&self) {
    self.release.notify_one();
  }
}

#[async_trait]
impl OrderStore for ScriptedOrders {
  async fn insert_reserving(&self, order: &Order) -> AppResult<()> {
    self.inner.insert_reserving(order).await
  }

  async fn get(&self, order_id: Uuid) -> AppResult<Option<Order>> {
    self.inner.get(order_id).await
  }

  async fn find_by_correlation(&self, correlation_id: &str) -> AppResult<Option<Order>> {
    self.lookups.fetch_add(1, Ordering::SeqCst);
    let outage = self
      .failures
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
      .is_ok();
    if outage {
      return Err(AppError::Internal("store offline".to_string()));
    }
    let found = self.inner.find_by_correlation(correlation_id).await?;
    let stall = {
      let mut armed = self.stall.lock();
      if armed.as_deref() == Some(correlation_id) {
        armed.take();
        true
      } else {
        false
      }
    };
    if stall {
      self.located.notify_one();
      self.release.notified().await;
    }
    Ok(found)
  }

  async fn list_by_buyer(&self, buyer_id: Uuid) -> AppResult<Vec<Order>> {
    self.inner.list_by_buyer(buyer_id).await
  }

  async fn list_by_shop(&self, shop_id: Uuid, filter: &OrderFilter) -> AppResult<Vec<Order>> {
    self.inner.list_by_shop(shop_id, filter).await
  }

  async fn complete_payment(&self, order_id: Uuid, ledger_ref: Option<&str>) -> AppResult<Option<Order>> {
    self.inner.complete_payment(order_id, ledger_ref).await
  }

  async fn fail_payment(&self, order_id: Uuid, error: &str) -> AppResult<Option<Order>> {
    self.inner.fail_payment(order_id, error).await
  }

  async fn request_refund(&self, order_id: Uuid, reason: &str, refund_correlation_id: &str) -> AppResult<Option<Order>> {
    self.inner.request_refund(order_id, reason, refund_correlation_id).await
  }

  async fn withdraw_refund(&self, order_id: Uuid, refund_correlation_id: &str) -> AppResult<bool> {
    self.inner.withdraw_refund(order_id, refund_correlation_id).await
  }

  async fn complete_refund(
    &self,
    order_id: Uuid,
    refund_correlation_id: &str,
    ledger_ref: Option<&str>,
  ) -> AppResult<Option<Order>> {
    self.inner.complete_refund(order_id, refund_correlation_id, ledger_ref).await
  }

  async fn fail_refund(&self, order_id: Uuid, refund_correlation_id: &str, error: &str) -> AppResult<Option<Order>> {
    self.inner.fail_refund(order_id, refund_correlation_id, error).await
  }

  async fn update_status(
    &self,
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
    change: &StatusChange,
  ) -> AppResult<Option<Order>> {
    self.inner.update_status(order_id, from, to, change).await
  }
}

// --- Harness ---

pub fn test_config() -> AppConfig {
  AppConfig {
    collaborator_timeout: Duration::from_millis(200),
    consumer_retry_base: Duration::from_millis(10),
    consumer_retry_max: Duration::from_millis(50),
    ..AppConfig::default()
  }
}

pub struct Harness {
  pub state: AppState,
  pub store: Arc<MemoryStore>,
  pub bus: MemoryBus,
  pub wallet: Arc<FakeWallet>,
  pub exchange: Arc<FakeExchange>,
  pub owner_id: Uuid,
  pub buyer_id: Uuid,
  pub shop_id: Uuid,
}

impl Harness {
  pub fn new() -> Self {
    let store = Arc::new(MemoryStore::new());
    Self::with_orders(store.clone(), store)
  }

  /// Builds a harness whose order store is `orders`; the catalog is always `store`.
  pub fn with_orders(store: Arc<MemoryStore>, orders: Arc<dyn OrderStore>) -> Self {
    setup_tracing();
    let bus = MemoryBus::recording();
    let wallet = Arc::new(FakeWallet::default());
    let exchange = Arc::new(FakeExchange::default());
    let owner_id = Uuid::new_v4();
    let buyer_id = Uuid::new_v4();
    let shop_id = Uuid::new_v4();

    store.put_shop(Shop {
      id: shop_id,
      owner_id,
      name: "Corner Shop".to_string(),
      currency: "USD".to_string(),
      settlement_account_id: SHOP_ACCOUNT.to_string(),
      status: ShopStatus::Active,
      delivery_enabled: true,
      delivery_fee: dec!(3.00),
      min_order_amount: Decimal::ZERO,
      max_order_amount: None,
      managers: Vec::new(),
      stats: ShopStats::default(),
    });
    wallet.put_account(WalletAccount {
      id: BUYER_ACCOUNT.to_string(),
      owner_id: buyer_id,
      currency: "USD".to_string(),
      balance: dec!(1000.00),
    });

    let catalog: Arc<dyn CatalogStore> = store.clone();
    let bus_handle: Arc<dyn MessageBus> = Arc::new(bus.clone());
    let wallet_handle: Arc<dyn WalletClient> = wallet.clone();
    let exchange_handle: Arc<dyn ExchangeClient> = exchange.clone();
    let state = AppState::new(orders, catalog, bus_handle, wallet_handle, exchange_handle, test_config());

    Self {
      state,
      store,
      bus,
      wallet,
      exchange,
      owner_id,
      buyer_id,
      shop_id,
    }
  }

  pub async fn shop(&self) -> Shop {
    self.state.catalog.shop(self.shop_id).await.unwrap().unwrap()
  }

  pub async fn update_shop(&self, f: impl FnOnce(&mut Shop)) {
    let mut shop = self.shop().await;
    f(&mut shop);
    self.store.put_shop(shop);
  }

  pub fn add_product(&self, name: &str, unit_price: Decimal, stock: i32) -> Product {
    let product = Product {
      id: Uuid::new_v4(),
      shop_id: self.shop_id,
      name: name.to_string(),
      unit_price,
      status: ProductStatus::Active,
      track_stock: true,
      stock,
      reserved: 0,
      sold_count: 0,
    };
    self.store.put_product(product.clone());
    product
  }

  pub async fn product(&self, id: Uuid) -> Product {
    self.state.catalog.products(&[id]).await.unwrap().remove(0)
  }

  pub async fn order(&self, id: Uuid) -> Order {
    self.state.orders.get(id).await.unwrap().unwrap()
  }

  pub fn buyer(&self) -> Actor {
    Actor::new(self.buyer_id)
  }

  pub fn owner(&self) -> Actor {
    Actor::new(self.owner_id)
  }

  /// Adds a manager holding `permissions` and returns them as an actor.
  pub async fn add_manager(&self, permissions: &[Permission]) -> Actor {
    let user_id = Uuid::new_v4();
    self
      .update_shop(|shop| {
        shop.managers.push(ShopManager {
          user_id,
          permissions: permissions.to_vec(),
        })
      })
      .await;
    Actor::new(user_id)
  }

  pub fn request(&self, lines: &[(Uuid, i32)], delivery_type: DeliveryType) -> CheckoutRequest {
    CheckoutRequest {
      shop_id: self.shop_id,
      account_id: BUYER_ACCOUNT.to_string(),
      items: lines
        .iter()
        .map(|(product_id, quantity)| CheckoutLine {
          product_id: *product_id,
          quantity: *quantity,
        })
        .collect(),
      delivery_type,
      shipping_address: match delivery_type {
        DeliveryType::Delivery => Some("1 Main St".to_string()),
        DeliveryType::Pickup => None,
      },
      buyer_note: None,
    }
  }

  pub async fn checkout(&self, request: CheckoutRequest) -> AppResult<Order> {
    pipelines::create_order(&self.state, self.buyer_id, request).await
  }

  /// A single-line pickup order of `quantity` units, settled as completed.
  pub async fn paid_order(&self, unit_price: Decimal, quantity: i32) -> Order {
    let product = self.add_product("Widget", unit_price, 100);
    let order = self
      .checkout(self.request(&[(product.id, quantity)], DeliveryType::Pickup))
      .await
      .unwrap();
    self.settle(&order.correlation_id, SettlementOutcome::Completed).await;
    self.order(order.id).await
  }

  pub async fn settle(&self, correlation_id: &str, status: SettlementOutcome) -> SettlementDisposition {
    pipelines::apply_settlement_result(&self.state, settlement_result(correlation_id, status))
      .await
      .unwrap()
  }

  /// Polls the order until `check` holds or `timeout` passes, returning the
  /// last state seen.
  pub async fn wait_for_order(&self, order_id: Uuid, timeout: Duration, check: impl Fn(&Order) -> bool) -> Order {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
      let order = self.order(order_id).await;
      if check(&order) || tokio::time::Instant::now() >= deadline {
        return order;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  }

  pub fn settlement_requests(&self) -> Vec<SettlementRequest> {
    self.bus.published_json(&self.state.config.settlement_request_topic)
  }

  pub fn notifications(&self) -> Vec<Notification> {
    self.bus.published_json(&self.state.config.notification_topic)
  }
}

pub fn settlement_result(correlation_id: &str, status: SettlementOutcome) -> SettlementResult {
  SettlementResult {
    correlation_id: correlation_id.to_string(),
    status,
    ledger_ref: match status {
      SettlementOutcome::Completed => Some(format!("ledger-{}", correlation_id)),
      SettlementOutcome::Failed => None,
    },
    timestamp: chrono::Utc::now(),
    error: match status {
      SettlementOutcome::Completed => None,
      SettlementOutcome::Failed => Some("insufficient balance".to_string()),
    },
  }
}

/// Polls `check` until it holds or `timeout` passes.
pub async fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut check: F) -> bool {
  let deadline = tokio::time::Instant::now() + timeout;
  while tokio::time::Instant::now() < deadline {
    if check() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  check()
}
