// marketplace_orders/src/web/handlers/health_handlers.rs

use crate::consumer::ConsumerMonitor;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Reports the settlement consumers' state. Degraded while no worker is
/// consuming, for example during a bus reconnect.
pub async fn health_check_handler(monitor: web::Data<ConsumerMonitor>) -> HttpResponse {
  let workers = monitor.snapshot();
  if monitor.is_healthy() {
    HttpResponse::Ok().json(json!({ "status": "ok", "consumers": workers }))
  } else {
    HttpResponse::ServiceUnavailable().json(json!({ "status": "degraded", "consumers": workers }))
  }
}
