// marketplace_orders/src/models/checkout.rs

//! Request payloads of the order operations.

use super::order::{DeliveryType, OrderStatus, PaymentStatus};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutLine {
  pub product_id: Uuid,
  pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
  pub shop_id: Uuid,
  /// The buyer's funding account at the wallet service.
  pub account_id: String,
  pub items: Vec<CheckoutLine>,
  pub delivery_type: DeliveryType,
  #[serde(default)]
  pub shipping_address: Option<String>,
  #[serde(default)]
  pub buyer_note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
  pub order_status: OrderStatus,
  #[serde(default)]
  pub tracking_number: Option<String>,
  #[serde(default)]
  pub seller_note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
  pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
  pub order_status: Option<OrderStatus>,
  pub payment_status: Option<PaymentStatus>,
}

impl OrderFilter {
  pub fn matches(&self, order_status: OrderStatus, payment_status: PaymentStatus) -> bool {
    self.order_status.map_or(true, |s| s == order_status) && self.payment_status.map_or(true, |s| s == payment_status)
  }
}
