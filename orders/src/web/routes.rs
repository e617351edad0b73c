// marketplace_orders/src/web/routes.rs

use crate::web::handlers::{health_handlers, order_handlers};
use actix_web::web;

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_handlers::health_check_handler))
      .service(
        web::scope("/orders")
          .route("", web::post().to(order_handlers::create_order_handler))
          // Registered before `/{order_id}` so "mine" is not parsed as an id.
          .route("/mine", web::get().to(order_handlers::my_orders_handler))
          .route("/{order_id}", web::get().to(order_handlers::get_order_handler))
          .route("/{order_id}/status", web::put().to(order_handlers::update_status_handler))
          .route("/{order_id}/refund", web::post().to(order_handlers::refund_handler)),
      )
      .route(
        "/shops/{shop_id}/orders",
        web::get().to(order_handlers::shop_orders_handler),
      ),
  );
}
