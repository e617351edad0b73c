// marketplace_orders/src/models/events.rs

//! Payloads exchanged with the ledger and the notification service over the bus.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementKind {
  Payment,
  Refund,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementMetadata {
  pub order_id: Uuid,
  pub order_number: String,
  pub shop_id: Uuid,
  pub shop_name: String,
  pub original_amount: Decimal,
  pub original_currency: String,
  pub kind: SettlementKind,
}

/// Outbound: asks the ledger to move `amount` from `source_account` to
/// `destination_account`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRequest {
  pub correlation_id: String,
  pub source_account: String,
  pub user_id: Uuid,
  pub amount: Decimal,
  pub currency: String,
  pub destination_account: String,
  pub destination_user_id: Uuid,
  pub reference: String,
  pub origin_service: String,
  pub metadata: SettlementMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementOutcome {
  Completed,
  Failed,
}

/// Inbound: the ledger's verdict on an earlier request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementResult {
  pub correlation_id: String,
  pub status: SettlementOutcome,
  #[serde(default)]
  pub ledger_ref: Option<String>,
  pub timestamp: DateTime<Utc>,
  #[serde(default)]
  pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
  OrderStatusChanged,
  PaymentConfirmed,
  PaymentFailed,
  RefundCompleted,
  RefundFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
  pub order_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
  pub user_id: Uuid,
  #[serde(rename = "type")]
  pub kind: NotificationKind,
  pub title: String,
  pub message: String,
  pub data: NotificationData,
  pub timestamp: DateTime<Utc>,
}
