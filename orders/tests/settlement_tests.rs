// tests/settlement_tests.rs

mod common;

use common::{settlement_result, Harness};
use marketplace_orders::models::{DeliveryType, NotificationKind, OrderStatus, PaymentStatus, SettlementOutcome};
use marketplace_orders::pipelines::{self, SettlementDisposition};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[tokio::test]
async fn completed_payment_commits_stock_and_credits_the_shop() {
  let h = Harness::new();
  let mug = h.add_product("Mug", dec!(10.00), 10);
  let tea = h.add_product("Tea", dec!(5.00), 10);
  let order = h
    .checkout(h.request(&[(mug.id, 2), (tea.id, 1)], DeliveryType::Delivery))
    .await
    .unwrap();

  let disposition = h.settle(&order.correlation_id, SettlementOutcome::Completed).await;
  assert_eq!(disposition, SettlementDisposition::Applied(NotificationKind::PaymentConfirmed));

  let paid = h.order(order.id).await;
  assert_eq!(paid.payment_status, PaymentStatus::Completed);
  assert_eq!(paid.order_status, OrderStatus::Pending);
  assert!(paid.paid_at.is_some());
  assert_eq!(paid.ledger_ref, Some(format!("ledger-{}", order.correlation_id)));

  let mug_now = h.product(mug.id).await;
  assert_eq!((mug_now.stock, mug_now.reserved, mug_now.sold_count), (8, 0, 2));
  let tea_now = h.product(tea.id).await;
  assert_eq!((tea_now.stock, tea_now.reserved, tea_now.sold_count), (9, 0, 1));

  let shop = h.shop().await;
  assert_eq!(shop.stats.revenue, dec!(28.00));
  assert_eq!(shop.stats.order_count, 1);
  assert_eq!(shop.stats.product_count, 2);

  let notifications = h.notifications();
  assert_eq!(notifications.len(), 1);
  assert_eq!(notifications[0].kind, NotificationKind::PaymentConfirmed);
  assert_eq!(notifications[0].user_id, h.buyer_id);
  assert_eq!(notifications[0].data.order_id, order.id);
}

#[tokio::test]
async fn replayed_completion_changes_nothing_twice() {
  let h = Harness::new();
  let mug = h.add_product("Mug", dec!(10.00), 10);
  let order = h.checkout(h.request(&[(mug.id, 3)], DeliveryType::Pickup)).await.unwrap();

  h.settle(&order.correlation_id, SettlementOutcome::Completed).await;
  let replay = h.settle(&order.correlation_id, SettlementOutcome::Completed).await;
  assert_eq!(replay, SettlementDisposition::Replayed);

  // A late failure for the same payment is ignored as well.
  let late_failure = h.settle(&order.correlation_id, SettlementOutcome::Failed).await;
  assert_eq!(late_failure, SettlementDisposition::Replayed);

  let product = h.product(mug.id).await;
  assert_eq!((product.stock, product.reserved, product.sold_count), (7, 0, 3));
  let shop = h.shop().await;
  assert_eq!(shop.stats.revenue, dec!(30.00));
  assert_eq!(shop.stats.order_count, 1);
  assert_eq!(h.order(order.id).await.payment_status, PaymentStatus::Completed);
  assert_eq!(h.notifications().len(), 1);
}

#[tokio::test]
async fn failed_payment_cancels_and_releases_reservations() {
  let h = Harness::new();
  let mug = h.add_product("Mug", dec!(10.00), 4);
  let order = h.checkout(h.request(&[(mug.id, 4)], DeliveryType::Pickup)).await.unwrap();
  assert_eq!(h.product(mug.id).await.available(), 0);

  let disposition = h.settle(&order.correlation_id, SettlementOutcome::Failed).await;
  assert_eq!(disposition, SettlementDisposition::Applied(NotificationKind::PaymentFailed));

  let failed = h.order(order.id).await;
  assert_eq!(failed.payment_status, PaymentStatus::Failed);
  assert_eq!(failed.order_status, OrderStatus::Cancelled);
  assert_eq!(failed.settlement_error.as_deref(), Some("insufficient balance"));

  let product = h.product(mug.id).await;
  assert_eq!((product.stock, product.reserved, product.sold_count), (4, 0, 0));
  assert_eq!(h.shop().await.stats.revenue, Decimal::ZERO);
  assert_eq!(h.notifications()[0].kind, NotificationKind::PaymentFailed);
}

#[tokio::test]
async fn unknown_correlation_is_a_silent_no_op() {
  let h = Harness::new();
  let mug = h.add_product("Mug", dec!(10.00), 4);
  let order = h.checkout(h.request(&[(mug.id, 1)], DeliveryType::Pickup)).await.unwrap();

  let disposition = h.settle("not-a-known-correlation", SettlementOutcome::Completed).await;
  assert_eq!(disposition, SettlementDisposition::Unmatched);

  assert_eq!(h.order(order.id).await.payment_status, PaymentStatus::Pending);
  assert_eq!(h.product(mug.id).await.reserved, 1);
  assert!(h.notifications().is_empty());
}

#[tokio::test]
async fn notification_failure_does_not_undo_the_settlement() {
  let h = Harness::new();
  let mug = h.add_product("Mug", dec!(10.00), 4);
  let order = h.checkout(h.request(&[(mug.id, 1)], DeliveryType::Pickup)).await.unwrap();

  h.bus.fail_next_publishes(1);
  let disposition = pipelines::apply_settlement_result(
    &h.state,
    settlement_result(&order.correlation_id, SettlementOutcome::Completed),
  )
  .await
  .unwrap();

  assert_eq!(disposition, SettlementDisposition::Applied(NotificationKind::PaymentConfirmed));
  assert_eq!(h.order(order.id).await.payment_status, PaymentStatus::Completed);
  assert!(h.notifications().is_empty());
}
