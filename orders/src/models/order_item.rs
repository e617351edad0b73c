// marketplace_orders/src/models/order_item.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A priced line, frozen at checkout. Stored inline with its order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
  pub product_id: Uuid,
  pub product_name: String,
  pub quantity: i32,
  pub unit_price: Decimal,
  pub line_total: Decimal,
  /// Whether the product tracked stock when the order was placed; settlement
  /// releases or commits the reservation only for these lines.
  pub track_stock: bool,
}
