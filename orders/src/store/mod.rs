// marketplace_orders/src/store/mod.rs

//! Durable order records plus the catalog counters they move.
//!
//! Every method that changes an order does so conditionally on the state it
//! expects, together with its stock and shop side effects, in one atomic
//! operation. A method returning `None` (or `false`) means the order was not
//! in the expected state and nothing changed, which is how replayed and
//! racing updates become no-ops.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::errors::{AppError, Result as AppResult};
use crate::models::{Order, OrderFilter, OrderStatus, Product, Shop};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait CatalogStore: Send + Sync {
  async fn shop(&self, shop_id: Uuid) -> AppResult<Option<Shop>>;

  /// Products among `product_ids` that exist, in no particular order.
  async fn products(&self, product_ids: &[Uuid]) -> AppResult<Vec<Product>>;
}

/// Optional fields an order status update may carry.
#[derive(Debug, Clone, Default)]
pub struct StatusChange {
  pub tracking_number: Option<String>,
  pub seller_note: Option<String>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
  /// Reserves stock for every tracked line and inserts `order`, or does
  /// neither. Fails with `InsufficientStock` when any line no longer fits.
  async fn insert_reserving(&self, order: &Order) -> AppResult<()>;

  async fn get(&self, order_id: Uuid) -> AppResult<Option<Order>>;

  /// Looks up by payment correlation id or refund correlation id.
  async fn find_by_correlation(&self, correlation_id: &str) -> AppResult<Option<Order>>;

  /// Newest first.
  async fn list_by_buyer(&self, buyer_id: Uuid) -> AppResult<Vec<Order>>;

  /// Newest first.
  async fn list_by_shop(&self, shop_id: Uuid, filter: &OrderFilter) -> AppResult<Vec<Order>>;

  /// `pending -> completed`: commits reservations, counts sales and credits
  /// the shop.
  async fn complete_payment(&self, order_id: Uuid, ledger_ref: Option<&str>) -> AppResult<Option<Order>>;

  /// `pending -> failed`, order cancelled, reservations released.
  async fn fail_payment(&self, order_id: Uuid, error: &str) -> AppResult<Option<Order>>;

  /// `completed -> refund_requested` with the reason and refund correlation id.
  async fn request_refund(&self, order_id: Uuid, reason: &str, refund_correlation_id: &str) -> AppResult<Option<Order>>;

  /// Undoes `request_refund` when the refund request never left: back to
  /// `completed`, reason and refund correlation cleared.
  async fn withdraw_refund(&self, order_id: Uuid, refund_correlation_id: &str) -> AppResult<bool>;

  /// `refund_requested -> refunded`, order cancelled, shop revenue debited.
  /// Only applies while `refund_correlation_id` is still the pending refund.
  async fn complete_refund(
    &self,
    order_id: Uuid,
    refund_correlation_id: &str,
    ledger_ref: Option<&str>,
  ) -> AppResult<Option<Order>>;

  /// `refund_requested -> completed` with the ledger's error recorded. The
  /// refund correlation is cleared so the refund can be requested again.
  /// Only applies while `refund_correlation_id` is still the pending refund.
  async fn fail_refund(&self, order_id: Uuid, refund_correlation_id: &str, error: &str) -> AppResult<Option<Order>>;

  /// Compare-and-set on `order_status`. The update also requires the payment
  /// state `to` needs, see `OrderStatus::permits_payment`.
  async fn update_status(
    &self,
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
    change: &StatusChange,
  ) -> AppResult<Option<Order>>;
}

/// The error for a tracked line whose reservation did not fit. `available` is
/// `None` when the product row is gone.
pub(crate) fn reservation_error(product_id: Uuid, product_name: &str, available: Option<i32>) -> AppError {
  match available {
    None => AppError::NotFound(format!("product {}", product_id)),
    Some(left) => AppError::InsufficientStock(format!("only {} of '{}' left", left.max(0), product_name)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn vanished_product_is_not_found_and_short_stock_is_insufficient() {
    let id = Uuid::new_v4();
    assert!(matches!(reservation_error(id, "Mug", None), AppError::NotFound(_)));
    match reservation_error(id, "Mug", Some(-2)) {
      AppError::InsufficientStock(msg) => assert_eq!(msg, "only 0 of 'Mug' left"),
      other => panic!("unexpected {:?}", other),
    }
  }
}
