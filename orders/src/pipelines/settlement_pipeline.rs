// marketplace_orders/src/pipelines/settlement_pipeline.rs

//! Applies one settlement result from the ledger to the order it correlates
//! with. Unknown correlation ids and replays halt the saga without touching
//! anything.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{NotificationKind, SettlementOutcome, SettlementResult};
use crate::pipelines::contexts::{SettlementCtxData, SettlementDisposition};
use crate::services::notifications::notify_buyer;
use crate::state::AppState;
use saga_engine::{ContextData, Saga, SagaRegistry, StepControl};
use tracing::{debug, info, instrument};

pub fn register_settlement_saga(registry: &SagaRegistry<AppError>) {
  let mut saga = Saga::<SettlementCtxData, AppError>::new(
    "settlement_result",
    &[
      ("locate_order", false, None),
      ("apply_result", false, None),
      ("notify_buyer", true, None),
    ],
  );

  saga.on("locate_order", locate_order);
  saga.on("apply_result", apply_result);
  saga.on("notify_buyer", |ctx: ContextData<SettlementCtxData>| async move {
    let (state, disposition, updated) = {
      let guard = ctx.read();
      (guard.app_state.clone(), guard.disposition, guard.updated.clone())
    };
    if let (SettlementDisposition::Applied(kind), Some(order)) = (disposition, updated) {
      notify_buyer(state.bus.as_ref(), &state.config.notification_topic, &order, kind).await?;
    }
    Ok::<_, AppError>(StepControl::Continue)
  });

  registry.register(saga);
  info!("Settlement result saga registered.");
}

/// Applies `result` and reports what it did. Errors are persistence failures;
/// the caller should retry the same result later.
#[instrument(
  name = "orders::apply_settlement_result",
  skip(state, result),
  fields(correlation_id = %result.correlation_id, status = ?result.status)
)]
pub async fn apply_settlement_result(state: &AppState, result: SettlementResult) -> AppResult<SettlementDisposition> {
  let ctx = ContextData::new(SettlementCtxData::new(state.clone(), result));
  state.sagas.run(ctx.clone()).await?;
  let disposition = ctx.read().disposition;
  Ok(disposition)
}

async fn locate_order(ctx: ContextData<SettlementCtxData>) -> AppResult<StepControl> {
  let (state, correlation_id) = {
    let guard = ctx.read();
    (guard.app_state.clone(), guard.result.correlation_id.clone())
  };

  match state.orders.find_by_correlation(&correlation_id).await? {
    Some(order) => {
      ctx.write().order = Some(order);
      Ok(StepControl::Continue)
    }
    None => {
      debug!(%correlation_id, "No order for settlement result; ignoring.");
      ctx.write().disposition = SettlementDisposition::Unmatched;
      Ok(StepControl::Halt)
    }
  }
}

async fn apply_result(ctx: ContextData<SettlementCtxData>) -> AppResult<StepControl> {
  let (state, order, result) = {
    let guard = ctx.read();
    let order = guard
      .order
      .clone()
      .ok_or_else(|| AppError::Internal("settlement applied before the order was located".to_string()))?;
    (guard.app_state.clone(), order, guard.result.clone())
  };
  // The payment correlation never changes; anything else found this order as a refund.
  let is_refund = result.correlation_id != order.correlation_id;
  let error_text = result
    .error
    .clone()
    .unwrap_or_else(|| "settlement failed".to_string());

  let (kind, updated) = match (is_refund, result.status) {
    (false, SettlementOutcome::Completed) => (
      NotificationKind::PaymentConfirmed,
      state.orders.complete_payment(order.id, result.ledger_ref.as_deref()).await?,
    ),
    (false, SettlementOutcome::Failed) => (
      NotificationKind::PaymentFailed,
      state.orders.fail_payment(order.id, &error_text).await?,
    ),
    (true, SettlementOutcome::Completed) => (
      NotificationKind::RefundCompleted,
      state
        .orders
        .complete_refund(order.id, &result.correlation_id, result.ledger_ref.as_deref())
        .await?,
    ),
    (true, SettlementOutcome::Failed) => (
      NotificationKind::RefundFailed,
      state.orders.fail_refund(order.id, &result.correlation_id, &error_text).await?,
    ),
  };

  let mut guard = ctx.write();
  match updated {
    Some(updated) => {
      info!(
        order_id = %updated.id,
        payment_status = ?updated.payment_status,
        order_status = updated.order_status.as_str(),
        "Settlement result applied."
      );
      guard.disposition = SettlementDisposition::Applied(kind);
      guard.updated = Some(updated);
      Ok(StepControl::Continue)
    }
    None => {
      debug!(order_id = %order.id, payment_status = ?order.payment_status, "Settlement result already applied.");
      guard.disposition = SettlementDisposition::Replayed;
      Ok(StepControl::Halt)
    }
  }
}
