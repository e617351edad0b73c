// marketplace_orders/src/pipelines/contexts.rs

//! Context data of every saga. Handlers receive these wrapped in
//! `saga_engine::ContextData`.

use crate::models::{
  Actor, CheckoutRequest, NotificationKind, Order, OrderItem, SettlementResult, Shop, UpdateStatusRequest,
};
use crate::services::WalletAccount;
use crate::state::AppState;
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Clone)]
pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub buyer_id: Uuid,
  pub request: CheckoutRequest,

  pub shop: Option<Shop>,
  pub buyer_account: Option<WalletAccount>,
  pub items: Vec<OrderItem>,
  pub subtotal: Decimal,
  pub delivery_fee: Decimal,
  pub total_amount: Decimal,
  /// Frozen once `convert_currency` has run.
  pub exchange_rate: Decimal,
  pub converted_amount: Decimal,

  /// Set by `persist_order`; the compensation keeps it current.
  pub order: Option<Order>,
}

impl CheckoutCtxData {
  pub fn new(app_state: AppState, buyer_id: Uuid, request: CheckoutRequest) -> Self {
    Self {
      app_state,
      buyer_id,
      request,
      shop: None,
      buyer_account: None,
      items: Vec::new(),
      subtotal: Decimal::ZERO,
      delivery_fee: Decimal::ZERO,
      total_amount: Decimal::ZERO,
      exchange_rate: Decimal::ONE,
      converted_amount: Decimal::ZERO,
      order: None,
    }
  }
}

#[derive(Clone)]
pub struct StatusCtxData {
  pub app_state: AppState,
  pub order_id: Uuid,
  pub actor: Actor,
  pub request: UpdateStatusRequest,
  pub order: Option<Order>,
  pub shop: Option<Shop>,
  pub updated: Option<Order>,
}

#[derive(Clone)]
pub struct RefundCtxData {
  pub app_state: AppState,
  pub order_id: Uuid,
  pub actor: Actor,
  pub reason: String,
  pub order: Option<Order>,
  pub shop: Option<Shop>,
  pub refund_correlation_id: Option<String>,
  pub updated: Option<Order>,
}

/// What a settlement result did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementDisposition {
  /// No order carries the correlation id.
  Unmatched,
  /// The order had already moved on; nothing changed.
  Replayed,
  Applied(NotificationKind),
}

#[derive(Clone)]
pub struct SettlementCtxData {
  pub app_state: AppState,
  pub result: SettlementResult,
  pub order: Option<Order>,
  pub disposition: SettlementDisposition,
  pub updated: Option<Order>,
}

impl SettlementCtxData {
  pub fn new(app_state: AppState, result: SettlementResult) -> Self {
    Self {
      app_state,
      result,
      order: None,
      disposition: SettlementDisposition::Unmatched,
      updated: None,
    }
  }
}
