// marketplace_orders/src/pipelines/queries.rs

//! Read operations. These need no saga; access rules live here.

use crate::errors::{AppError, Result as AppResult};
use crate::models::{Actor, Order, OrderFilter, Permission};
use crate::pipelines::common_steps::{load_order_and_shop, require_permission};
use crate::state::AppState;
use tracing::instrument;
use uuid::Uuid;

/// The buyer sees their own orders; shop staff need `view_orders`.
#[instrument(name = "orders::get", skip(state, actor), fields(user_id = %actor.user_id))]
pub async fn get_order(state: &AppState, actor: &Actor, order_id: Uuid) -> AppResult<Order> {
  let (order, shop) = load_order_and_shop(state, order_id).await?;
  if order.buyer_id != actor.user_id {
    require_permission(&shop, actor, Permission::ViewOrders)?;
  }
  Ok(order)
}

pub async fn list_my_orders(state: &AppState, actor: &Actor) -> AppResult<Vec<Order>> {
  state.orders.list_by_buyer(actor.user_id).await
}

#[instrument(name = "orders::list_for_shop", skip(state, actor, filter), fields(user_id = %actor.user_id))]
pub async fn list_shop_orders(
  state: &AppState,
  actor: &Actor,
  shop_id: Uuid,
  filter: &OrderFilter,
) -> AppResult<Vec<Order>> {
  let shop = state
    .catalog
    .shop(shop_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("shop {}", shop_id)))?;
  require_permission(&shop, actor, Permission::ViewOrders)?;
  state.orders.list_by_shop(shop_id, filter).await
}
