// marketplace_orders/src/models/product.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "product_status_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
  Active,
  Inactive,
  Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
  pub id: Uuid,
  pub shop_id: Uuid,
  pub name: String,
  pub unit_price: Decimal,
  pub status: ProductStatus,
  pub track_stock: bool,
  /// On hand.
  pub stock: i32,
  /// Held by pending orders.
  pub reserved: i32,
  pub sold_count: i32,
}

impl Product {
  pub fn available(&self) -> i32 {
    self.stock - self.reserved
  }
}
