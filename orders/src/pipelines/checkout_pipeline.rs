// marketplace_orders/src/pipelines/checkout_pipeline.rs

//! Checkout: validate, price, reserve, persist, then hand settlement to the
//! ledger. If the settlement request cannot be published the persisted order
//! is failed and its reservation released by the `persist_order`
//! compensation.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{
  CheckoutRequest, DeliveryType, Order, OrderItem, OrderStatus, PaymentStatus, ProductStatus, SettlementKind,
  SettlementMetadata, SettlementRequest, ShopStatus,
};
use crate::pipelines::common_steps::{call_collaborator, publish_settlement_request};
use crate::pipelines::contexts::CheckoutCtxData;
use crate::services::exchange;
use crate::state::AppState;
use chrono::Utc;
use rust_decimal::Decimal;
use saga_engine::{ContextData, Saga, SagaOutcome, SagaRegistry, StepControl};
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const UNPUBLISHED_SETTLEMENT_ERROR: &str = "settlement request not published";

pub fn register_checkout_saga(registry: &SagaRegistry<AppError>) {
  let mut saga = Saga::<CheckoutCtxData, AppError>::new(
    "checkout",
    &[
      ("validate_request", false, None),
      ("resolve_shop", false, None),
      ("resolve_buyer_account", false, None),
      ("price_lines", false, None),
      ("apply_order_policy", false, None),
      ("convert_currency", false, None),
      ("check_balance", false, None),
      ("persist_order", false, None),
      ("publish_settlement_request", false, None),
    ],
  );

  saga.on("validate_request", validate_request);
  saga.on("resolve_shop", resolve_shop);
  saga.on("resolve_buyer_account", resolve_buyer_account);
  saga.on("price_lines", price_lines);
  saga.on("apply_order_policy", apply_order_policy);
  saga.on("convert_currency", convert_currency);
  saga.on("check_balance", check_balance);
  saga.on("persist_order", persist_order);
  saga.compensate("persist_order", abandon_order);
  saga.on("publish_settlement_request", publish_request);

  registry.register(saga);
  info!("Checkout saga registered.");
}

/// Creates an order for `buyer_id` and requests its settlement.
#[instrument(name = "orders::create", skip(state, request), fields(%buyer_id, shop_id = %request.shop_id))]
pub async fn create_order(state: &AppState, buyer_id: Uuid, request: CheckoutRequest) -> AppResult<Order> {
  let ctx = ContextData::new(CheckoutCtxData::new(state.clone(), buyer_id, request));
  match state.sagas.run(ctx.clone()).await? {
    SagaOutcome::Completed => ctx
      .read()
      .order
      .clone()
      .ok_or_else(|| AppError::Internal("checkout completed without an order".to_string())),
    SagaOutcome::Halted => Err(AppError::Internal("checkout halted unexpectedly".to_string())),
  }
}

async fn validate_request(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let guard = ctx.read();
  let request = &guard.request;

  if request.items.is_empty() {
    return Err(AppError::Validation("an order needs at least one item".to_string()));
  }
  if request.account_id.trim().is_empty() {
    return Err(AppError::Validation("account_id is required".to_string()));
  }
  let mut seen = HashSet::new();
  for line in &request.items {
    if line.quantity <= 0 {
      return Err(AppError::Validation(format!(
        "quantity for product {} must be positive",
        line.product_id
      )));
    }
    if !seen.insert(line.product_id) {
      return Err(AppError::Validation(format!("product {} is listed twice", line.product_id)));
    }
  }
  if request.delivery_type == DeliveryType::Delivery
    && request.shipping_address.as_deref().map_or(true, |a| a.trim().is_empty())
  {
    return Err(AppError::Validation("delivery orders need a shipping address".to_string()));
  }
  Ok(StepControl::Continue)
}

async fn resolve_shop(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (state, shop_id) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.request.shop_id)
  };

  let shop = state
    .catalog
    .shop(shop_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("shop {}", shop_id)))?;
  if shop.status == ShopStatus::Suspended {
    return Err(AppError::Unavailable(format!("shop '{}' is suspended", shop.name)));
  }
  ctx.write().shop = Some(shop);
  Ok(StepControl::Continue)
}

async fn resolve_buyer_account(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (state, buyer_id, account_id) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.buyer_id, guard.request.account_id.clone())
  };

  let account = call_collaborator(
    "wallet service",
    state.config.collaborator_timeout,
    state.wallet.account(&account_id),
  )
  .await?
  .ok_or_else(|| AppError::NotFound(format!("wallet account {}", account_id)))?;

  if account.owner_id != buyer_id {
    warn!(%account_id, %buyer_id, "Checkout with an account the buyer does not own.");
    return Err(AppError::Forbidden(format!("account {} does not belong to the buyer", account_id)));
  }
  ctx.write().buyer_account = Some(account);
  Ok(StepControl::Continue)
}

async fn price_lines(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (state, shop_id, lines) = {
    let guard = ctx.read();
    let shop_id = guard.shop.as_ref().map(|s| s.id).unwrap_or(guard.request.shop_id);
    (guard.app_state.clone(), shop_id, guard.request.items.clone())
  };

  let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
  let products: HashMap<Uuid, _> = state
    .catalog
    .products(&ids)
    .await?
    .into_iter()
    .map(|p| (p.id, p))
    .collect();

  let mut items = Vec::with_capacity(lines.len());
  for line in &lines {
    let product = products
      .get(&line.product_id)
      .filter(|p| p.shop_id == shop_id)
      .ok_or_else(|| AppError::NotFound(format!("product {} in shop {}", line.product_id, shop_id)))?;
    if product.status != ProductStatus::Active {
      return Err(AppError::Unavailable(format!("product '{}' is not for sale", product.name)));
    }
    if product.track_stock && line.quantity > product.available() {
      return Err(AppError::InsufficientStock(format!(
        "only {} of '{}' left",
        product.available().max(0),
        product.name
      )));
    }
    items.push(OrderItem {
      product_id: product.id,
      product_name: product.name.clone(),
      quantity: line.quantity,
      unit_price: product.unit_price,
      line_total: product.unit_price * Decimal::from(line.quantity),
      track_stock: product.track_stock,
    });
  }

  ctx.write().items = items;
  Ok(StepControl::Continue)
}

async fn apply_order_policy(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let mut guard = ctx.write();
  let shop = guard
    .shop
    .clone()
    .ok_or_else(|| AppError::Internal("order policy checked before the shop was resolved".to_string()))?;

  let subtotal: Decimal = guard.items.iter().map(|i| i.line_total).sum();
  let delivery_fee = match guard.request.delivery_type {
    DeliveryType::Pickup => Decimal::ZERO,
    DeliveryType::Delivery if shop.delivery_enabled => shop.delivery_fee,
    DeliveryType::Delivery => {
      return Err(AppError::PolicyViolation(format!("shop '{}' does not deliver", shop.name)));
    }
  };
  let total_amount = subtotal + delivery_fee;

  if total_amount <= Decimal::ZERO {
    return Err(AppError::PolicyViolation("order total must be positive".to_string()));
  }
  if total_amount < shop.min_order_amount {
    return Err(AppError::PolicyViolation(format!(
      "order total {} is below the shop minimum {}",
      total_amount, shop.min_order_amount
    )));
  }
  if let Some(max) = shop.max_order_amount {
    if total_amount > max {
      return Err(AppError::PolicyViolation(format!(
        "order total {} is above the shop maximum {}",
        total_amount, max
      )));
    }
  }

  guard.subtotal = subtotal;
  guard.delivery_fee = delivery_fee;
  guard.total_amount = total_amount;
  Ok(StepControl::Continue)
}

async fn convert_currency(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (state, from, to, total) = {
    let guard = ctx.read();
    (
      guard.app_state.clone(),
      guard.shop.as_ref().map(|s| s.currency.clone()).unwrap_or_default(),
      guard.buyer_account.as_ref().map(|a| a.currency.clone()).unwrap_or_default(),
      guard.total_amount,
    )
  };

  let (rate, converted) = if from == to {
    (Decimal::ONE, total)
  } else {
    let rate = call_collaborator(
      "exchange service",
      state.config.collaborator_timeout,
      state.exchange.rate(&from, &to),
    )
    .await
    .map_err(|e| match e {
      AppError::ServiceUnavailable(_) => e,
      other => AppError::ServiceUnavailable(format!("exchange rate {}->{} unavailable: {}", from, to, other)),
    })?;
    (rate, exchange::convert(total, rate))
  };

  if converted <= Decimal::ZERO {
    return Err(AppError::PolicyViolation(format!(
      "order total {} {} converts to nothing in {}",
      total, from, to
    )));
  }
  info!(%from, %to, %rate, %total, %converted, "Exchange rate frozen.");

  let mut guard = ctx.write();
  guard.exchange_rate = rate;
  guard.converted_amount = converted;
  Ok(StepControl::Continue)
}

/// Advisory: the ledger has the final say when it settles.
async fn check_balance(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let guard = ctx.read();
  let account = guard
    .buyer_account
    .as_ref()
    .ok_or_else(|| AppError::Internal("balance checked before the account was resolved".to_string()))?;
  if account.balance < guard.converted_amount {
    return Err(AppError::InsufficientFunds(format!(
      "account {} holds {} {}, order needs {}",
      account.id, account.balance, account.currency, guard.converted_amount
    )));
  }
  Ok(StepControl::Continue)
}

async fn persist_order(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (state, order) = {
    let guard = ctx.read();
    let shop = guard
      .shop
      .as_ref()
      .ok_or_else(|| AppError::Internal("order persisted before the shop was resolved".to_string()))?;
    let account = guard
      .buyer_account
      .as_ref()
      .ok_or_else(|| AppError::Internal("order persisted before the account was resolved".to_string()))?;
    let now = Utc::now();
    let order = Order {
      id: Uuid::new_v4(),
      order_number: Order::generate_number(now),
      correlation_id: Uuid::new_v4().to_string(),
      buyer_id: guard.buyer_id,
      shop_id: shop.id,
      items: guard.items.clone(),
      subtotal: guard.subtotal,
      delivery_fee: guard.delivery_fee,
      total_amount: guard.total_amount,
      currency: shop.currency.clone(),
      buyer_account_id: account.id.clone(),
      buyer_currency: account.currency.clone(),
      converted_amount: guard.converted_amount,
      exchange_rate: guard.exchange_rate,
      ledger_ref: None,
      settlement_error: None,
      payment_status: PaymentStatus::Pending,
      order_status: OrderStatus::Pending,
      delivery_type: guard.request.delivery_type,
      shipping_address: guard.request.shipping_address.clone(),
      tracking_number: None,
      buyer_note: guard.request.buyer_note.clone(),
      seller_note: None,
      refund_reason: None,
      refund_correlation_id: None,
      created_at: now,
      updated_at: now,
      paid_at: None,
      refund_requested_at: None,
      refunded_at: None,
    };
    (guard.app_state.clone(), order)
  };

  state.orders.insert_reserving(&order).await?;
  info!(order_id = %order.id, order_number = %order.order_number, total = %order.total_amount, "Order persisted, stock reserved.");
  ctx.write().order = Some(order);
  Ok(StepControl::Continue)
}

async fn abandon_order(ctx: ContextData<CheckoutCtxData>) -> AppResult<()> {
  let (state, order_id) = {
    let guard = ctx.read();
    match &guard.order {
      Some(order) => (guard.app_state.clone(), order.id),
      None => return Ok(()),
    }
  };

  match state.orders.fail_payment(order_id, UNPUBLISHED_SETTLEMENT_ERROR).await? {
    Some(order) => {
      warn!(%order_id, "Order abandoned, reservation released.");
      ctx.write().order = Some(order);
    }
    None => warn!(%order_id, "Order already left pending; nothing to abandon."),
  }
  Ok(())
}

async fn publish_request(ctx: ContextData<CheckoutCtxData>) -> AppResult<StepControl> {
  let (state, request) = {
    let guard = ctx.read();
    let order = guard
      .order
      .as_ref()
      .ok_or_else(|| AppError::Internal("settlement requested before the order was persisted".to_string()))?;
    let shop = guard
      .shop
      .as_ref()
      .ok_or_else(|| AppError::Internal("settlement requested without a shop".to_string()))?;
    let request = SettlementRequest {
      correlation_id: order.correlation_id.clone(),
      source_account: order.buyer_account_id.clone(),
      user_id: order.buyer_id,
      amount: order.converted_amount,
      currency: order.buyer_currency.clone(),
      destination_account: shop.settlement_account_id.clone(),
      destination_user_id: shop.owner_id,
      reference: order.order_number.clone(),
      origin_service: guard.app_state.config.origin_service.clone(),
      metadata: SettlementMetadata {
        order_id: order.id,
        order_number: order.order_number.clone(),
        shop_id: shop.id,
        shop_name: shop.name.clone(),
        original_amount: order.total_amount,
        original_currency: order.currency.clone(),
        kind: SettlementKind::Payment,
      },
    };
    (guard.app_state.clone(), request)
  };

  publish_settlement_request(&state, &request).await?;
  Ok(StepControl::Continue)
}
