// marketplace_orders/src/store/postgres.rs

//! PostgreSQL store. Each mutating call is one transaction: a conditional
//! `UPDATE ... WHERE <expected state> RETURNING *` on the order, then the
//! counter increments it implies.

use super::{reservation_error, CatalogStore, OrderStore, StatusChange};
use crate::errors::{AppError, Result as AppResult};
use crate::models::{Order, OrderFilter, OrderItem, OrderStatus, Product, Shop};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  /// Applies the embedded migrations under `migrations/`.
  pub async fn migrate(&self) -> AppResult<()> {
    sqlx::migrate!("./migrations")
      .run(&self.pool)
      .await
      .map_err(|e| AppError::Config(format!("Database migration failed: {}", e)))?;
    info!("Database migrations applied.");
    Ok(())
  }

  async fn release_reservations(tx: &mut Transaction<'_, Postgres>, items: &[OrderItem]) -> AppResult<()> {
    for item in items.iter().filter(|i| i.track_stock) {
      sqlx::query("UPDATE products SET reserved = GREATEST(reserved - $2, 0) WHERE id = $1")
        .bind(item.product_id)
        .bind(item.quantity)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
  }

  async fn transition(&self, sql: &str, order_id: Uuid, text: Option<&str>) -> AppResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(sql)
      .bind(order_id)
      .bind(text)
      .fetch_optional(&self.pool)
      .await?;
    Ok(order)
  }
}

#[async_trait]
impl CatalogStore for PgStore {
  async fn shop(&self, shop_id: Uuid) -> AppResult<Option<Shop>> {
    let shop = sqlx::query_as::<_, Shop>("SELECT * FROM shops WHERE id = $1")
      .bind(shop_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(shop)
  }

  async fn products(&self, product_ids: &[Uuid]) -> AppResult<Vec<Product>> {
    let products = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ANY($1)")
      .bind(product_ids)
      .fetch_all(&self.pool)
      .await?;
    Ok(products)
  }
}

#[async_trait]
impl OrderStore for PgStore {
  #[instrument(name = "PgStore::insert_reserving", skip_all, fields(order_id = %order.id), err)]
  async fn insert_reserving(&self, order: &Order) -> AppResult<()> {
    let mut tx = self.pool.begin().await?;

    for item in order.items.iter().filter(|i| i.track_stock) {
      let reserved = sqlx::query(
        "UPDATE products SET reserved = reserved + $2 \
         WHERE id = $1 AND stock - reserved >= $2",
      )
      .bind(item.product_id)
      .bind(item.quantity)
      .execute(&mut *tx)
      .await?;
      if reserved.rows_affected() == 0 {
        let available: Option<i32> = sqlx::query_scalar("SELECT stock - reserved FROM products WHERE id = $1")
          .bind(item.product_id)
          .fetch_optional(&mut *tx)
          .await?;
        // Dropping `tx` rolls back the reservations made so far.
        return Err(reservation_error(item.product_id, &item.product_name, available));
      }
    }

    sqlx::query(
      r#"
      INSERT INTO orders (
        id, order_number, correlation_id, buyer_id, shop_id, items,
        subtotal, delivery_fee, total_amount, currency,
        buyer_account_id, buyer_currency, converted_amount, exchange_rate,
        payment_status, order_status, delivery_type, shipping_address, buyer_note,
        created_at, updated_at
      ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
      "#,
    )
    .bind(order.id)
    .bind(&order.order_number)
    .bind(&order.correlation_id)
    .bind(order.buyer_id)
    .bind(order.shop_id)
    .bind(Json(&order.items))
    .bind(order.subtotal)
    .bind(order.delivery_fee)
    .bind(order.total_amount)
    .bind(&order.currency)
    .bind(&order.buyer_account_id)
    .bind(&order.buyer_currency)
    .bind(order.converted_amount)
    .bind(order.exchange_rate)
    .bind(order.payment_status)
    .bind(order.order_status)
    .bind(order.delivery_type)
    .bind(&order.shipping_address)
    .bind(&order.buyer_note)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
  }

  async fn get(&self, order_id: Uuid) -> AppResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(order)
  }

  async fn find_by_correlation(&self, correlation_id: &str) -> AppResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(
      "SELECT * FROM orders WHERE correlation_id = $1 OR refund_correlation_id = $1",
    )
    .bind(correlation_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(order)
  }

  async fn list_by_buyer(&self, buyer_id: Uuid) -> AppResult<Vec<Order>> {
    let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC, id")
      .bind(buyer_id)
      .fetch_all(&self.pool)
      .await?;
    Ok(orders)
  }

  async fn list_by_shop(&self, shop_id: Uuid, filter: &OrderFilter) -> AppResult<Vec<Order>> {
    let orders = sqlx::query_as::<_, Order>(
      "SELECT * FROM orders WHERE shop_id = $1 \
       AND ($2::order_status_enum IS NULL OR order_status = $2) \
       AND ($3::payment_status_enum IS NULL OR payment_status = $3) \
       ORDER BY created_at DESC, id",
    )
    .bind(shop_id)
    .bind(filter.order_status)
    .bind(filter.payment_status)
    .fetch_all(&self.pool)
    .await?;
    Ok(orders)
  }

  #[instrument(name = "PgStore::complete_payment", skip(self), err)]
  async fn complete_payment(&self, order_id: Uuid, ledger_ref: Option<&str>) -> AppResult<Option<Order>> {
    let mut tx = self.pool.begin().await?;
    let updated = sqlx::query_as::<_, Order>(
      "UPDATE orders SET payment_status = 'completed', ledger_ref = $2, settlement_error = NULL, \
       paid_at = now(), updated_at = now() \
       WHERE id = $1 AND payment_status = 'pending' RETURNING *",
    )
    .bind(order_id)
    .bind(ledger_ref)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(order) = updated else { return Ok(None) };

    for item in &order.items {
      sqlx::query(
        "UPDATE products SET \
           stock = CASE WHEN $3 THEN stock - $2 ELSE stock END, \
           reserved = CASE WHEN $3 THEN GREATEST(reserved - $2, 0) ELSE reserved END, \
           sold_count = sold_count + $2 \
         WHERE id = $1",
      )
      .bind(item.product_id)
      .bind(item.quantity)
      .bind(item.track_stock)
      .execute(&mut *tx)
      .await?;
    }
    sqlx::query(
      "UPDATE shops SET order_count = order_count + 1, revenue = revenue + $2, \
       product_count = (SELECT COUNT(*) FROM products WHERE shop_id = $1 AND status = 'active') \
       WHERE id = $1",
    )
    .bind(order.shop_id)
    .bind(order.total_amount)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(order))
  }

  #[instrument(name = "PgStore::fail_payment", skip(self), err)]
  async fn fail_payment(&self, order_id: Uuid, error: &str) -> AppResult<Option<Order>> {
    let mut tx = self.pool.begin().await?;
    let updated = sqlx::query_as::<_, Order>(
      "UPDATE orders SET payment_status = 'failed', order_status = 'cancelled', settlement_error = $2, \
       updated_at = now() \
       WHERE id = $1 AND payment_status = 'pending' RETURNING *",
    )
    .bind(order_id)
    .bind(error)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(order) = updated else { return Ok(None) };

    Self::release_reservations(&mut tx, &order.items).await?;
    tx.commit().await?;
    Ok(Some(order))
  }

  async fn request_refund(&self, order_id: Uuid, reason: &str, refund_correlation_id: &str) -> AppResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(
      "UPDATE orders SET payment_status = 'refund_requested', refund_reason = $2, \
       refund_correlation_id = $3, refund_requested_at = now(), updated_at = now() \
       WHERE id = $1 AND payment_status = 'completed' RETURNING *",
    )
    .bind(order_id)
    .bind(reason)
    .bind(refund_correlation_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(order)
  }

  async fn withdraw_refund(&self, order_id: Uuid, refund_correlation_id: &str) -> AppResult<bool> {
    let reverted = self
      .transition(
        "UPDATE orders SET payment_status = 'completed', refund_reason = NULL, \
         refund_correlation_id = NULL, refund_requested_at = NULL, updated_at = now() \
         WHERE id = $1 AND payment_status = 'refund_requested' AND refund_correlation_id = $2 RETURNING *",
        order_id,
        Some(refund_correlation_id),
      )
      .await?;
    Ok(reverted.is_some())
  }

  #[instrument(name = "PgStore::complete_refund", skip(self), err)]
  async fn complete_refund(
    &self,
    order_id: Uuid,
    refund_correlation_id: &str,
    ledger_ref: Option<&str>,
  ) -> AppResult<Option<Order>> {
    let mut tx = self.pool.begin().await?;
    let updated = sqlx::query_as::<_, Order>(
      "UPDATE orders SET payment_status = 'refunded', order_status = 'cancelled', \
       ledger_ref = COALESCE($3, ledger_ref), refunded_at = now(), updated_at = now() \
       WHERE id = $1 AND payment_status = 'refund_requested' AND refund_correlation_id = $2 RETURNING *",
    )
    .bind(order_id)
    .bind(refund_correlation_id)
    .bind(ledger_ref)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(order) = updated else { return Ok(None) };

    sqlx::query("UPDATE shops SET revenue = revenue - $2 WHERE id = $1")
      .bind(order.shop_id)
      .bind(order.total_amount)
      .execute(&mut *tx)
      .await?;
    tx.commit().await?;
    Ok(Some(order))
  }

  async fn fail_refund(&self, order_id: Uuid, refund_correlation_id: &str, error: &str) -> AppResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(
      "UPDATE orders SET payment_status = 'completed', settlement_error = $3, \
       refund_correlation_id = NULL, updated_at = now() \
       WHERE id = $1 AND payment_status = 'refund_requested' AND refund_correlation_id = $2 RETURNING *",
    )
    .bind(order_id)
    .bind(refund_correlation_id)
    .bind(error)
    .fetch_optional(&self.pool)
    .await?;
    Ok(order)
  }

  async fn update_status(
    &self,
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
    change: &StatusChange,
  ) -> AppResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(
      "UPDATE orders SET order_status = $3, \
       tracking_number = COALESCE($4, tracking_number), seller_note = COALESCE($5, seller_note), \
       updated_at = now() \
       WHERE id = $1 AND order_status = $2 AND (NOT $6 OR payment_status = 'completed') \
       AND (NOT $7 OR payment_status NOT IN ('pending', 'refund_requested')) RETURNING *",
    )
    .bind(order_id)
    .bind(from)
    .bind(to)
    .bind(&change.tracking_number)
    .bind(&change.seller_note)
    .bind(to.requires_payment())
    .bind(to == OrderStatus::Cancelled)
    .fetch_optional(&self.pool)
    .await?;
    Ok(order)
  }
}
