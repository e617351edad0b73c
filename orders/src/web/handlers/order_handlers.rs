// marketplace_orders/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Actor, CheckoutRequest, OrderFilter, RefundRequest, UpdateStatusRequest};
use crate::pipelines;
use crate::state::AppState;

#[instrument(name = "handler::create_order", skip(app_state, actor, payload), fields(user_id = %actor.user_id))]
pub async fn create_order_handler(
  app_state: web::Data<AppState>,
  actor: Actor,
  payload: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, AppError> {
  let order = pipelines::create_order(app_state.get_ref(), actor.user_id, payload.into_inner()).await?;
  info!(order_id = %order.id, order_number = %order.order_number, "Order created, awaiting settlement.");
  Ok(HttpResponse::Created().json(order))
}

pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  actor: Actor,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order = pipelines::get_order(app_state.get_ref(), &actor, path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(order))
}

pub async fn my_orders_handler(app_state: web::Data<AppState>, actor: Actor) -> Result<HttpResponse, AppError> {
  let orders = pipelines::list_my_orders(app_state.get_ref(), &actor).await?;
  Ok(HttpResponse::Ok().json(orders))
}

pub async fn shop_orders_handler(
  app_state: web::Data<AppState>,
  actor: Actor,
  path: web::Path<Uuid>,
  filter: web::Query<OrderFilter>,
) -> Result<HttpResponse, AppError> {
  let orders = pipelines::list_shop_orders(app_state.get_ref(), &actor, path.into_inner(), &filter).await?;
  Ok(HttpResponse::Ok().json(orders))
}

#[instrument(name = "handler::update_status", skip(app_state, actor, payload), fields(user_id = %actor.user_id))]
pub async fn update_status_handler(
  app_state: web::Data<AppState>,
  actor: Actor,
  path: web::Path<Uuid>,
  payload: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, AppError> {
  let order = pipelines::update_order_status(app_state.get_ref(), actor, path.into_inner(), payload.into_inner()).await?;
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::refund", skip(app_state, actor, payload), fields(user_id = %actor.user_id))]
pub async fn refund_handler(
  app_state: web::Data<AppState>,
  actor: Actor,
  path: web::Path<Uuid>,
  payload: web::Json<RefundRequest>,
) -> Result<HttpResponse, AppError> {
  let order = pipelines::refund_order(app_state.get_ref(), actor, path.into_inner(), payload.into_inner().reason).await?;
  // The refund settles asynchronously.
  Ok(HttpResponse::Accepted().json(order))
}
