// tests/http_tests.rs

mod common;

use actix_web::{http::StatusCode, test, web, App};
use common::{Harness, BUYER_ACCOUNT};
use marketplace_orders::consumer::{ConsumerHandle, ConsumerMonitor};
use marketplace_orders::models::{Order, OrderStatus, PaymentStatus, SettlementOutcome};
use marketplace_orders::web::configure_app_routes;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

macro_rules! app {
  ($h:expr, $monitor:expr) => {
    test::init_service(
      App::new()
        .app_data(web::Data::new($h.state.clone()))
        .app_data(web::Data::new($monitor))
        .configure(configure_app_routes),
    )
    .await
  };
}

#[actix_rt::test]
async fn order_lifecycle_over_http() {
  let h = Harness::new();
  let app = app!(h, ConsumerMonitor::default());
  let mug = h.add_product("Mug", dec!(10.00), 5);
  let buyer = h.buyer_id.to_string();
  let owner = h.owner_id.to_string();

  let req = test::TestRequest::post()
    .uri("/api/v1/orders")
    .insert_header(("X-User-Id", buyer.as_str()))
    .set_json(json!({
      "shop_id": h.shop_id,
      "account_id": BUYER_ACCOUNT,
      "items": [{"product_id": mug.id, "quantity": 2}],
      "delivery_type": "pickup"
    }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let created: Order = test::read_body_json(resp).await;
  assert_eq!(created.payment_status, PaymentStatus::Pending);
  assert_eq!(created.total_amount, dec!(20.00));

  let req = test::TestRequest::get()
    .uri("/api/v1/orders/mine")
    .insert_header(("X-User-Id", buyer.as_str()))
    .to_request();
  let mine: Vec<Order> = test::call_and_read_body_json(&app, req).await;
  assert_eq!(mine.len(), 1);

  h.settle(&created.correlation_id, SettlementOutcome::Completed).await;

  let req = test::TestRequest::put()
    .uri(&format!("/api/v1/orders/{}/status", created.id))
    .insert_header(("X-User-Id", owner.as_str()))
    .insert_header(("X-Permissions", "manage_orders, refund_orders"))
    .set_json(json!({"order_status": "confirmed"}))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let confirmed: Order = test::read_body_json(resp).await;
  assert_eq!(confirmed.order_status, OrderStatus::Confirmed);

  let req = test::TestRequest::post()
    .uri(&format!("/api/v1/orders/{}/refund", created.id))
    .insert_header(("X-User-Id", owner.as_str()))
    .set_json(json!({"reason": "out of stock at the warehouse"}))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::ACCEPTED);
  let refunding: Order = test::read_body_json(resp).await;
  assert_eq!(refunding.payment_status, PaymentStatus::RefundRequested);

  let req = test::TestRequest::get()
    .uri(&format!("/api/v1/shops/{}/orders?payment_status=refund_requested", h.shop_id))
    .insert_header(("X-User-Id", owner.as_str()))
    .to_request();
  let listed: Vec<Order> = test::call_and_read_body_json(&app, req).await;
  assert_eq!(listed.len(), 1);
  assert_eq!(listed[0].id, created.id);
}

#[actix_rt::test]
async fn errors_carry_status_and_kind() {
  let h = Harness::new();
  let app = app!(h, ConsumerMonitor::default());
  let mug = h.add_product("Mug", dec!(10.00), 1);

  let req = test::TestRequest::get().uri("/api/v1/orders/mine").to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["kind"], "forbidden");

  let req = test::TestRequest::get()
    .uri("/api/v1/orders/mine")
    .insert_header(("X-User-Id", "not-a-uuid"))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

  let req = test::TestRequest::post()
    .uri("/api/v1/orders")
    .insert_header(("X-User-Id", h.buyer_id.to_string()))
    .set_json(json!({
      "shop_id": h.shop_id,
      "account_id": BUYER_ACCOUNT,
      "items": [{"product_id": mug.id, "quantity": 2}],
      "delivery_type": "pickup"
    }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::CONFLICT);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["kind"], "insufficient_stock");

  let req = test::TestRequest::get()
    .uri(&format!("/api/v1/orders/{}", uuid::Uuid::new_v4()))
    .insert_header(("X-User-Id", h.buyer_id.to_string()))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["kind"], "not_found");
}

#[actix_rt::test]
async fn health_reflects_consumer_state() {
  let h = Harness::new();

  let idle = app!(h, ConsumerMonitor::default());
  let req = test::TestRequest::get().uri("/api/v1/health").to_request();
  let resp = test::call_service(&idle, req).await;
  assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["status"], "degraded");

  let consumers = ConsumerHandle::spawn(&h.state, CancellationToken::new());
  let monitor = consumers.monitor();
  assert!(common::wait_until(std::time::Duration::from_secs(3), || monitor.is_healthy()).await);

  let live = app!(h, monitor);
  let req = test::TestRequest::get().uri("/api/v1/health").to_request();
  let resp = test::call_service(&live, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["status"], "ok");
  assert_eq!(body["consumers"], json!(["running"]));

  consumers.shutdown().await;
}
