// marketplace_orders/src/services/notifications.rs

use crate::models::{Notification, NotificationData, NotificationKind, Order};
use crate::services::bus::{publish_json, BusError, MessageBus};
use chrono::Utc;
use tracing::{info, instrument, warn};

/// Builds the buyer-facing notification for `kind` on `order`.
pub fn for_order(order: &Order, kind: NotificationKind) -> Notification {
  let (title, message) = match kind {
    NotificationKind::PaymentConfirmed => (
      "Payment confirmed".to_string(),
      format!("Payment for order {} was received.", order.order_number),
    ),
    NotificationKind::PaymentFailed => (
      "Payment failed".to_string(),
      format!(
        "Payment for order {} did not go through{}.",
        order.order_number,
        order
          .settlement_error
          .as_deref()
          .map(|e| format!(": {}", e))
          .unwrap_or_default()
      ),
    ),
    NotificationKind::RefundCompleted => (
      "Refund completed".to_string(),
      format!(
        "{} {} was returned to your account for order {}.",
        order.converted_amount, order.buyer_currency, order.order_number
      ),
    ),
    NotificationKind::RefundFailed => (
      "Refund failed".to_string(),
      format!("The refund for order {} could not be completed.", order.order_number),
    ),
    NotificationKind::OrderStatusChanged => (
      "Order updated".to_string(),
      format!("Order {} is now {}.", order.order_number, order.order_status.as_str()),
    ),
  };

  Notification {
    user_id: order.buyer_id,
    kind,
    title,
    message,
    data: NotificationData { order_id: order.id },
    timestamp: Utc::now(),
  }
}

/// Publishes a notification to the buyer. Failures are logged and returned;
/// nothing is retried.
#[instrument(name = "notify_buyer", skip(bus, order), fields(order_id = %order.id, ?kind), err)]
pub async fn notify_buyer(bus: &dyn MessageBus, topic: &str, order: &Order, kind: NotificationKind) -> Result<(), BusError> {
  let notification = for_order(order, kind);
  match publish_json(bus, topic, &notification).await {
    Ok(()) => {
      info!(buyer_id = %order.buyer_id, "Buyer notified.");
      Ok(())
    }
    Err(e) => {
      warn!(error = %e, "Notification not published.");
      Err(e)
    }
  }
}
