// marketplace_orders/src/pipelines/refund_pipeline.rs

//! Refunds are two-phase: this saga moves the order to `refund_requested`
//! and asks the ledger to reverse the payment. The order only becomes
//! `refunded` when the ledger reports the reversal under the refund's own
//! correlation id.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{Actor, Order, Permission, PaymentStatus, SettlementKind, SettlementMetadata, SettlementRequest};
use crate::pipelines::common_steps::{load_order_and_shop, publish_settlement_request, require_permission};
use crate::pipelines::contexts::RefundCtxData;
use crate::state::AppState;
use saga_engine::{ContextData, Saga, SagaOutcome, SagaRegistry, StepControl};
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub fn register_refund_saga(registry: &SagaRegistry<AppError>) {
  let mut saga = Saga::<RefundCtxData, AppError>::new(
    "refund",
    &[
      ("load_order", false, None),
      ("authorize_actor", false, None),
      ("check_refundable", false, None),
      ("mark_refund_requested", false, None),
      ("publish_refund_request", false, None),
    ],
  );

  saga.on("load_order", |ctx: ContextData<RefundCtxData>| async move {
    let (state, order_id) = {
      let guard = ctx.read();
      (guard.app_state.clone(), guard.order_id)
    };
    let (order, shop) = load_order_and_shop(&state, order_id).await?;
    let mut guard = ctx.write();
    guard.order = Some(order);
    guard.shop = Some(shop);
    Ok::<_, AppError>(StepControl::Continue)
  });

  saga.on("authorize_actor", |ctx: ContextData<RefundCtxData>| async move {
    let guard = ctx.read();
    let shop = guard
      .shop
      .as_ref()
      .ok_or_else(|| AppError::Internal("shop not loaded".to_string()))?;
    require_permission(shop, &guard.actor, Permission::RefundOrders)?;
    Ok::<_, AppError>(StepControl::Continue)
  });

  saga.on("check_refundable", check_refundable);
  saga.on("mark_refund_requested", mark_refund_requested);
  saga.compensate("mark_refund_requested", withdraw_refund_request);
  saga.on("publish_refund_request", publish_refund_request);

  registry.register(saga);
  info!("Refund saga registered.");
}

/// Starts a refund of a paid order on behalf of shop staff. The returned order
/// is `refund_requested`.
#[instrument(name = "orders::refund", skip(state, actor, reason), fields(user_id = %actor.user_id))]
pub async fn refund_order(state: &AppState, actor: Actor, order_id: Uuid, reason: String) -> AppResult<Order> {
  let ctx = ContextData::new(RefundCtxData {
    app_state: state.clone(),
    order_id,
    actor,
    reason,
    order: None,
    shop: None,
    refund_correlation_id: None,
    updated: None,
  });
  match state.sagas.run(ctx.clone()).await? {
    SagaOutcome::Completed => ctx
      .read()
      .updated
      .clone()
      .ok_or_else(|| AppError::Internal("refund completed without an order".to_string())),
    SagaOutcome::Halted => Err(AppError::Internal("refund halted unexpectedly".to_string())),
  }
}

async fn check_refundable(ctx: ContextData<RefundCtxData>) -> AppResult<StepControl> {
  let guard = ctx.read();
  let order = guard
    .order
    .as_ref()
    .ok_or_else(|| AppError::Internal("order not loaded".to_string()))?;
  if guard.reason.trim().is_empty() {
    return Err(AppError::Validation("a refund needs a reason".to_string()));
  }
  if order.payment_status != PaymentStatus::Completed {
    return Err(AppError::PolicyViolation(format!(
      "order {} is not refundable while payment is {:?}",
      order.order_number, order.payment_status
    )));
  }
  Ok(StepControl::Continue)
}

async fn mark_refund_requested(ctx: ContextData<RefundCtxData>) -> AppResult<StepControl> {
  let (state, order_id, reason) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.order_id, guard.reason.trim().to_string())
  };
  let refund_correlation_id = Uuid::new_v4().to_string();

  let updated = state
    .orders
    .request_refund(order_id, &reason, &refund_correlation_id)
    .await?
    .ok_or_else(|| AppError::PolicyViolation(format!("order {} is no longer refundable", order_id)))?;
  info!(%order_id, %refund_correlation_id, "Refund requested.");

  let mut guard = ctx.write();
  guard.refund_correlation_id = Some(refund_correlation_id);
  guard.updated = Some(updated);
  Ok(StepControl::Continue)
}

async fn withdraw_refund_request(ctx: ContextData<RefundCtxData>) -> AppResult<()> {
  let (state, order_id, refund_correlation_id) = {
    let guard = ctx.read();
    match &guard.refund_correlation_id {
      Some(id) => (guard.app_state.clone(), guard.order_id, id.clone()),
      None => return Ok(()),
    }
  };
  if state.orders.withdraw_refund(order_id, &refund_correlation_id).await? {
    warn!(%order_id, "Refund request withdrawn; order is completed again.");
  }
  let mut guard = ctx.write();
  guard.refund_correlation_id = None;
  guard.updated = None;
  Ok(())
}

async fn publish_refund_request(ctx: ContextData<RefundCtxData>) -> AppResult<StepControl> {
  let (state, request) = {
    let guard = ctx.read();
    let order = guard
      .updated
      .as_ref()
      .ok_or_else(|| AppError::Internal("refund published before it was recorded".to_string()))?;
    let shop = guard
      .shop
      .as_ref()
      .ok_or_else(|| AppError::Internal("shop not loaded".to_string()))?;
    let correlation_id = guard
      .refund_correlation_id
      .clone()
      .ok_or_else(|| AppError::Internal("refund correlation id missing".to_string()))?;
    let request = SettlementRequest {
      correlation_id,
      source_account: shop.settlement_account_id.clone(),
      user_id: shop.owner_id,
      amount: order.converted_amount,
      currency: order.buyer_currency.clone(),
      destination_account: order.buyer_account_id.clone(),
      destination_user_id: order.buyer_id,
      reference: format!("{}-REFUND", order.order_number),
      origin_service: guard.app_state.config.origin_service.clone(),
      metadata: SettlementMetadata {
        order_id: order.id,
        order_number: order.order_number.clone(),
        shop_id: shop.id,
        shop_name: shop.name.clone(),
        original_amount: order.total_amount,
        original_currency: order.currency.clone(),
        kind: SettlementKind::Refund,
      },
    };
    (guard.app_state.clone(), request)
  };

  publish_settlement_request(&state, &request).await?;
  Ok(StepControl::Continue)
}
