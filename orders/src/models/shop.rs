// marketplace_orders/src/models/shop.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "shop_status_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ShopStatus {
  Active,
  Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
  ViewOrders,
  ManageOrders,
  RefundOrders,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopManager {
  pub user_id: Uuid,
  pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ShopStats {
  pub order_count: i64,
  pub revenue: Decimal,
  pub product_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Shop {
  pub id: Uuid,
  pub owner_id: Uuid,
  pub name: String,
  pub currency: String,
  pub settlement_account_id: String,
  pub status: ShopStatus,
  pub delivery_enabled: bool,
  pub delivery_fee: Decimal,
  pub min_order_amount: Decimal,
  pub max_order_amount: Option<Decimal>,
  #[sqlx(json)]
  pub managers: Vec<ShopManager>,
  #[sqlx(flatten)]
  pub stats: ShopStats,
}

impl Shop {
  /// The owner holds every permission; managers hold what they were granted.
  pub fn grants(&self, user_id: Uuid, permission: Permission) -> bool {
    if self.owner_id == user_id {
      return true;
    }
    self
      .managers
      .iter()
      .any(|m| m.user_id == user_id && m.permissions.contains(&permission))
  }
}
