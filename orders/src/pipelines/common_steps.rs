// marketplace_orders/src/pipelines/common_steps.rs

//! Pieces shared by several sagas.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{Actor, Order, Permission, SettlementRequest, Shop};
use crate::services::bus::publish_json;
use crate::state::AppState;
use std::future::Future;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Bounds a collaborator call. Elapsed time and any collaborator failure other
/// than a definite answer surface as `ServiceUnavailable`.
pub async fn call_collaborator<T, F>(what: &'static str, timeout: Duration, call: F) -> AppResult<T>
where
  F: Future<Output = AppResult<T>>,
{
  match tokio::time::timeout(timeout, call).await {
    Ok(result) => result,
    Err(_) => {
      warn!(collaborator = what, timeout_ms = timeout.as_millis() as u64, "Collaborator call timed out.");
      Err(AppError::ServiceUnavailable(format!("{} timed out", what)))
    }
  }
}

/// Loads an order and the shop it belongs to.
pub async fn load_order_and_shop(state: &AppState, order_id: Uuid) -> AppResult<(Order, Shop)> {
  let order = state
    .orders
    .get(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("order {}", order_id)))?;
  let shop = state
    .catalog
    .shop(order.shop_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("shop {}", order.shop_id)))?;
  Ok((order, shop))
}

pub fn require_permission(shop: &Shop, actor: &Actor, permission: Permission) -> AppResult<()> {
  if shop.grants(actor.user_id, permission) {
    return Ok(());
  }
  warn!(
    user_id = %actor.user_id,
    shop_id = %shop.id,
    ?permission,
    asserted = ?actor.permissions,
    "Actor lacks shop permission."
  );
  Err(AppError::Forbidden(format!(
    "user {} may not {:?} for shop {}",
    actor.user_id, permission, shop.id
  )))
}

#[instrument(
  name = "common_step::publish_settlement_request",
  skip(state, request),
  fields(correlation_id = %request.correlation_id, kind = ?request.metadata.kind),
  err
)]
pub async fn publish_settlement_request(state: &AppState, request: &SettlementRequest) -> AppResult<()> {
  publish_json(state.bus.as_ref(), &state.config.settlement_request_topic, request)
    .await
    .map_err(|e| AppError::ServiceUnavailable(format!("settlement request not published: {}", e)))?;
  info!(amount = %request.amount, currency = %request.currency, "Settlement request published.");
  Ok(())
}
