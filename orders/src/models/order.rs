// marketplace_orders/src/models/order.rs

use super::order_item::OrderItem;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "payment_status_enum", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
  Pending,
  Completed,
  Failed,
  RefundRequested,
  Refunded,
}

impl PaymentStatus {
  /// Every transition the settlement lifecycle allows.
  pub fn can_transition_to(self, next: PaymentStatus) -> bool {
    use PaymentStatus::*;
    matches!(
      (self, next),
      (Pending, Completed) | (Pending, Failed) | (Completed, RefundRequested) | (RefundRequested, Refunded) | (RefundRequested, Completed)
    )
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  Pending,
  Confirmed,
  Processing,
  Shipped,
  Delivered,
  Cancelled,
}

impl OrderStatus {
  /// Position on the fulfilment path. `Cancelled` is off the path.
  fn rank(self) -> Option<u8> {
    match self {
      OrderStatus::Pending => Some(0),
      OrderStatus::Confirmed => Some(1),
      OrderStatus::Processing => Some(2),
      OrderStatus::Shipped => Some(3),
      OrderStatus::Delivered => Some(4),
      OrderStatus::Cancelled => None,
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
  }

  /// Forward moves only; `Cancelled` from anything not yet terminal.
  pub fn can_advance_to(self, next: OrderStatus) -> bool {
    if self.is_terminal() {
      return false;
    }
    match (self.rank(), next.rank()) {
      (_, None) => true,
      (Some(current), Some(target)) => target > current,
      (None, Some(_)) => false,
    }
  }

  /// Statuses at or past `Confirmed` need a settled payment.
  pub fn requires_payment(self) -> bool {
    matches!(
      self,
      OrderStatus::Confirmed | OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
    )
  }

  /// Whether an order may move to this status while its payment is
  /// `payment`. Cancelling is refused while a settlement is in flight: the
  /// ledger may still move the money.
  pub fn permits_payment(self, payment: PaymentStatus) -> bool {
    match self {
      OrderStatus::Cancelled => !matches!(payment, PaymentStatus::Pending | PaymentStatus::RefundRequested),
      status if status.requires_payment() => payment == PaymentStatus::Completed,
      _ => true,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Confirmed => "confirmed",
      OrderStatus::Processing => "processing",
      OrderStatus::Shipped => "shipped",
      OrderStatus::Delivered => "delivered",
      OrderStatus::Cancelled => "cancelled",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "delivery_type_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryType {
  Pickup,
  Delivery,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
  pub id: Uuid,
  pub order_number: String,
  /// Correlates the payment settlement. Set once at creation.
  pub correlation_id: String,
  pub buyer_id: Uuid,
  pub shop_id: Uuid,

  #[sqlx(json)]
  pub items: Vec<OrderItem>,
  pub subtotal: Decimal,
  pub delivery_fee: Decimal,
  pub total_amount: Decimal,
  pub currency: String,

  pub buyer_account_id: String,
  pub buyer_currency: String,
  pub converted_amount: Decimal,
  pub exchange_rate: Decimal,
  pub ledger_ref: Option<String>,
  pub settlement_error: Option<String>,

  pub payment_status: PaymentStatus,
  pub order_status: OrderStatus,

  pub delivery_type: DeliveryType,
  pub shipping_address: Option<String>,
  pub tracking_number: Option<String>,
  pub buyer_note: Option<String>,
  pub seller_note: Option<String>,
  pub refund_reason: Option<String>,
  pub refund_correlation_id: Option<String>,

  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub paid_at: Option<DateTime<Utc>>,
  pub refund_requested_at: Option<DateTime<Utc>>,
  pub refunded_at: Option<DateTime<Utc>>,
}

impl Order {
  /// `ORD-YYYYMMDD-XXXXXXXX`, the suffix taken from a fresh UUID.
  pub fn generate_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
  }

  /// Whether `correlation_id` refers to this order's refund rather than its payment.
  pub fn is_refund_correlation(&self, correlation_id: &str) -> bool {
    self.refund_correlation_id.as_deref() == Some(correlation_id)
  }
}
