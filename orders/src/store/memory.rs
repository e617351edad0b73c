// marketplace_orders/src/store/memory.rs

//! Single-lock store for local runs and tests. Orders, products and shops sit
//! behind one `RwLock`, so every conditional update and its side effects are
//! applied together.

use super::{reservation_error, CatalogStore, OrderStore, StatusChange};
use crate::errors::Result as AppResult;
use crate::models::{Order, OrderFilter, OrderItem, OrderStatus, PaymentStatus, Product, ProductStatus, Shop};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
  shops: HashMap<Uuid, Shop>,
  products: HashMap<Uuid, Product>,
  orders: HashMap<Uuid, Order>,
  /// Insertion order, for newest-first listings.
  order_seq: Vec<Uuid>,
  correlations: HashMap<String, Uuid>,
}

impl Tables {
  fn release_reservations(&mut self, items: &[OrderItem]) {
    for item in items.iter().filter(|i| i.track_stock) {
      if let Some(product) = self.products.get_mut(&item.product_id) {
        product.reserved = (product.reserved - item.quantity).max(0);
      }
    }
  }

  fn active_product_count(&self, shop_id: Uuid) -> i64 {
    self
      .products
      .values()
      .filter(|p| p.shop_id == shop_id && p.status == ProductStatus::Active)
      .count() as i64
  }

  /// Runs `apply` on the order when `expected` holds. Returns the updated copy.
  fn transition(
    &mut self,
    order_id: Uuid,
    expected: impl FnOnce(&Order) -> bool,
    apply: impl FnOnce(&mut Order),
  ) -> Option<Order> {
    let order = self.orders.get_mut(&order_id)?;
    if !expected(order) {
      debug!(%order_id, payment_status = ?order.payment_status, "Conditional update did not match.");
      return None;
    }
    apply(order);
    order.updated_at = Utc::now();
    Some(order.clone())
  }
}

#[derive(Default)]
pub struct MemoryStore {
  tables: RwLock<Tables>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Inserts or replaces a shop. The catalog is owned elsewhere; this is how
  /// local runs and tests seed it.
  pub fn put_shop(&self, shop: Shop) {
    self.tables.write().shops.insert(shop.id, shop);
  }

  pub fn put_product(&self, product: Product) {
    self.tables.write().products.insert(product.id, product);
  }
}

#[async_trait]
impl CatalogStore for MemoryStore {
  async fn shop(&self, shop_id: Uuid) -> AppResult<Option<Shop>> {
    Ok(self.tables.read().shops.get(&shop_id).cloned())
  }

  async fn products(&self, product_ids: &[Uuid]) -> AppResult<Vec<Product>> {
    let tables = self.tables.read();
    Ok(product_ids.iter().filter_map(|id| tables.products.get(id).cloned()).collect())
  }
}

#[async_trait]
impl OrderStore for MemoryStore {
  async fn insert_reserving(&self, order: &Order) -> AppResult<()> {
    let mut tables = self.tables.write();

    for item in order.items.iter().filter(|i| i.track_stock) {
      let available = tables.products.get(&item.product_id).map(Product::available);
      if available.map_or(true, |left| left < item.quantity) {
        return Err(reservation_error(item.product_id, &item.product_name, available));
      }
    }
    for item in order.items.iter().filter(|i| i.track_stock) {
      if let Some(product) = tables.products.get_mut(&item.product_id) {
        product.reserved += item.quantity;
      }
    }

    tables.correlations.insert(order.correlation_id.clone(), order.id);
    tables.order_seq.push(order.id);
    tables.orders.insert(order.id, order.clone());
    Ok(())
  }

  async fn get(&self, order_id: Uuid) -> AppResult<Option<Order>> {
    Ok(self.tables.read().orders.get(&order_id).cloned())
  }

  async fn find_by_correlation(&self, correlation_id: &str) -> AppResult<Option<Order>> {
    let tables = self.tables.read();
    Ok(
      tables
        .correlations
        .get(correlation_id)
        .and_then(|id| tables.orders.get(id))
        .cloned(),
    )
  }

  async fn list_by_buyer(&self, buyer_id: Uuid) -> AppResult<Vec<Order>> {
    let tables = self.tables.read();
    Ok(
      tables
        .order_seq
        .iter()
        .rev()
        .filter_map(|id| tables.orders.get(id))
        .filter(|o| o.buyer_id == buyer_id)
        .cloned()
        .collect(),
    )
  }

  async fn list_by_shop(&self, shop_id: Uuid, filter: &OrderFilter) -> AppResult<Vec<Order>> {
    let tables = self.tables.read();
    Ok(
      tables
        .order_seq
        .iter()
        .rev()
        .filter_map(|id| tables.orders.get(id))
        .filter(|o| o.shop_id == shop_id && filter.matches(o.order_status, o.payment_status))
        .cloned()
        .collect(),
    )
  }

  async fn complete_payment(&self, order_id: Uuid, ledger_ref: Option<&str>) -> AppResult<Option<Order>> {
    let mut tables = self.tables.write();
    let updated = tables.transition(
      order_id,
      |o| o.payment_status == PaymentStatus::Pending,
      |o| {
        o.payment_status = PaymentStatus::Completed;
        o.ledger_ref = ledger_ref.map(str::to_string);
        o.settlement_error = None;
        o.paid_at = Some(Utc::now());
      },
    );
    let Some(order) = updated else { return Ok(None) };

    for item in &order.items {
      if let Some(product) = tables.products.get_mut(&item.product_id) {
        if item.track_stock {
          product.stock -= item.quantity;
          product.reserved = (product.reserved - item.quantity).max(0);
        }
        product.sold_count += item.quantity;
      }
    }
    let product_count = tables.active_product_count(order.shop_id);
    if let Some(shop) = tables.shops.get_mut(&order.shop_id) {
      shop.stats.order_count += 1;
      shop.stats.revenue += order.total_amount;
      shop.stats.product_count = product_count;
    }
    Ok(Some(order))
  }

  async fn fail_payment(&self, order_id: Uuid, error: &str) -> AppResult<Option<Order>> {
    let mut tables = self.tables.write();
    let updated = tables.transition(
      order_id,
      |o| o.payment_status == PaymentStatus::Pending,
      |o| {
        o.payment_status = PaymentStatus::Failed;
        o.order_status = OrderStatus::Cancelled;
        o.settlement_error = Some(error.to_string());
      },
    );
    if let Some(order) = &updated {
      tables.release_reservations(&order.items);
    }
    Ok(updated)
  }

  async fn request_refund(&self, order_id: Uuid, reason: &str, refund_correlation_id: &str) -> AppResult<Option<Order>> {
    let mut tables = self.tables.write();
    let updated = tables.transition(
      order_id,
      |o| o.payment_status == PaymentStatus::Completed,
      |o| {
        o.payment_status = PaymentStatus::RefundRequested;
        o.refund_reason = Some(reason.to_string());
        o.refund_correlation_id = Some(refund_correlation_id.to_string());
        o.refund_requested_at = Some(Utc::now());
      },
    );
    if updated.is_some() {
      tables.correlations.insert(refund_correlation_id.to_string(), order_id);
    }
    Ok(updated)
  }

  async fn withdraw_refund(&self, order_id: Uuid, refund_correlation_id: &str) -> AppResult<bool> {
    let mut tables = self.tables.write();
    let updated = tables.transition(
      order_id,
      |o| o.payment_status == PaymentStatus::RefundRequested && o.is_refund_correlation(refund_correlation_id),
      |o| {
        o.payment_status = PaymentStatus::Completed;
        o.refund_reason = None;
        o.refund_correlation_id = None;
        o.refund_requested_at = None;
      },
    );
    if updated.is_some() {
      tables.correlations.remove(refund_correlation_id);
    }
    Ok(updated.is_some())
  }

  async fn complete_refund(
    &self,
    order_id: Uuid,
    refund_correlation_id: &str,
    ledger_ref: Option<&str>,
  ) -> AppResult<Option<Order>> {
    let mut tables = self.tables.write();
    let updated = tables.transition(
      order_id,
      |o| o.payment_status == PaymentStatus::RefundRequested && o.is_refund_correlation(refund_correlation_id),
      |o| {
        o.payment_status = PaymentStatus::Refunded;
        o.order_status = OrderStatus::Cancelled;
        o.refunded_at = Some(Utc::now());
        if let Some(ledger_ref) = ledger_ref {
          o.ledger_ref = Some(ledger_ref.to_string());
        }
      },
    );
    if let Some(order) = &updated {
      if let Some(shop) = tables.shops.get_mut(&order.shop_id) {
        shop.stats.revenue -= order.total_amount;
      }
    }
    Ok(updated)
  }

  async fn fail_refund(&self, order_id: Uuid, refund_correlation_id: &str, error: &str) -> AppResult<Option<Order>> {
    let mut tables = self.tables.write();
    let updated = tables.transition(
      order_id,
      |o| o.payment_status == PaymentStatus::RefundRequested && o.is_refund_correlation(refund_correlation_id),
      |o| {
        o.payment_status = PaymentStatus::Completed;
        o.settlement_error = Some(error.to_string());
        o.refund_correlation_id = None;
      },
    );
    if updated.is_some() {
      tables.correlations.remove(refund_correlation_id);
    }
    Ok(updated)
  }

  async fn update_status(
    &self,
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
    change: &StatusChange,
  ) -> AppResult<Option<Order>> {
    let mut tables = self.tables.write();
    Ok(tables.transition(
      order_id,
      |o| o.order_status == from && to.permits_payment(o.payment_status),
      |o| {
        o.order_status = to;
        if let Some(tracking) = &change.tracking_number {
          o.tracking_number = Some(tracking.clone());
        }
        if let Some(note) = &change.seller_note {
          o.seller_note = Some(note.clone());
        }
      },
    ))
  }
}
