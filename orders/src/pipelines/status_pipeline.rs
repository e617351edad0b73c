// marketplace_orders/src/pipelines/status_pipeline.rs

use crate::errors::{AppError, Result as AppResult};
use crate::models::{Actor, NotificationKind, Order, Permission, PaymentStatus, UpdateStatusRequest};
use crate::pipelines::common_steps::{load_order_and_shop, require_permission};
use crate::pipelines::contexts::StatusCtxData;
use crate::services::notifications::notify_buyer;
use crate::state::AppState;
use crate::store::StatusChange;
use saga_engine::{ContextData, Saga, SagaOutcome, SagaRegistry, StepControl};
use tracing::{info, instrument};
use uuid::Uuid;

pub fn register_status_saga(registry: &SagaRegistry<AppError>) {
  let mut saga = Saga::<StatusCtxData, AppError>::new(
    "order_status",
    &[
      ("load_order", false, None),
      ("authorize_actor", false, None),
      ("validate_transition", false, None),
      ("apply_transition", false, None),
      ("notify_buyer", true, None),
    ],
  );

  saga.on("load_order", |ctx: ContextData<StatusCtxData>| async move {
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

  saga.on("authorize_actor", |ctx: ContextData<StatusCtxData>| async move {
    let guard = ctx.read();
    let shop = guard
      .shop
      .as_ref()
      .ok_or_else(|| AppError::Internal("shop not loaded".to_string()))?;
    require_permission(shop, &guard.actor, Permission::ManageOrders)?;
    Ok::<_, AppError>(StepControl::Continue)
  });

  saga.on("validate_transition", validate_transition);
  saga.on("apply_transition", apply_transition);

  saga.on("notify_buyer", |ctx: ContextData<StatusCtxData>| async move {
    let (state, updated) = {
      let guard = ctx.read();
      (guard.app_state.clone(), guard.updated.clone())
    };
    if let Some(order) = updated {
      notify_buyer(
        state.bus.as_ref(),
        &state.config.notification_topic,
        &order,
        NotificationKind::OrderStatusChanged,
      )
      .await?;
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  registry.register(saga);
  info!("Order status saga registered.");
}

/// Moves an order along its fulfilment path on behalf of shop staff.
#[instrument(name = "orders::update_status", skip(state, actor, request), fields(user_id = %actor.user_id, to = request.order_status.as_str()))]
pub async fn update_order_status(
  state: &AppState,
  actor: Actor,
  order_id: Uuid,
  request: UpdateStatusRequest,
) -> AppResult<Order> {
  let ctx = ContextData::new(StatusCtxData {
    app_state: state.clone(),
    order_id,
    actor,
    request,
    order: None,
    shop: None,
    updated: None,
  });
  match state.sagas.run(ctx.clone()).await? {
    SagaOutcome::Completed => ctx
      .read()
      .updated
      .clone()
      .ok_or_else(|| AppError::Internal("status update completed without an order".to_string())),
    SagaOutcome::Halted => Err(AppError::Internal("status update halted unexpectedly".to_string())),
  }
}

async fn validate_transition(ctx: ContextData<StatusCtxData>) -> AppResult<StepControl> {
  let guard = ctx.read();
  let order = guard
    .order
    .as_ref()
    .ok_or_else(|| AppError::Internal("order not loaded".to_string()))?;
  let current = order.order_status;
  let target = guard.request.order_status;

  if !current.can_advance_to(target) {
    return Err(AppError::PolicyViolation(format!(
      "order {} cannot move from {} to {}",
      order.order_number,
      current.as_str(),
      target.as_str()
    )));
  }
  if !target.permits_payment(order.payment_status) {
    let reason = match order.payment_status {
      PaymentStatus::Pending => "its payment is still settling",
      PaymentStatus::RefundRequested => "its refund is still settling",
      _ => "it is not paid",
    };
    return Err(AppError::PolicyViolation(format!(
      "order {} cannot be {}: {}",
      order.order_number,
      target.as_str(),
      reason
    )));
  }
  Ok(StepControl::Continue)
}

async fn apply_transition(ctx: ContextData<StatusCtxData>) -> AppResult<StepControl> {
  let (state, order_id, from, to, change) = {
    let guard = ctx.read();
    let order = guard
      .order
      .as_ref()
      .ok_or_else(|| AppError::Internal("order not loaded".to_string()))?;
    let change = StatusChange {
      tracking_number: guard.request.tracking_number.clone(),
      seller_note: guard.request.seller_note.clone(),
    };
    (
      guard.app_state.clone(),
      order.id,
      order.order_status,
      guard.request.order_status,
      change,
    )
  };

  let updated = state
    .orders
    .update_status(order_id, from, to, &change)
    .await?
    .ok_or_else(|| AppError::PolicyViolation(format!("order {} changed while it was being updated", order_id)))?;
  info!(%order_id, from = from.as_str(), to = to.as_str(), "Order status updated.");
  ctx.write().updated = Some(updated);
  Ok(StepControl::Continue)
}
