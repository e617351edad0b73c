// marketplace_orders/src/models/mod.rs

//! Records owned by the order store, the catalog boundary and the bus.

pub mod actor;
pub mod checkout;
pub mod events;
pub mod order;
pub mod order_item;
pub mod product;
pub mod shop;

pub use actor::Actor;
pub use checkout::{CheckoutLine, CheckoutRequest, OrderFilter, RefundRequest, UpdateStatusRequest};
pub use events::{
  Notification, NotificationData, NotificationKind, SettlementKind, SettlementMetadata, SettlementOutcome,
  SettlementRequest, SettlementResult,
};
pub use order::{DeliveryType, Order, OrderStatus, PaymentStatus};
pub use order_item::OrderItem;
pub use product::{Product, ProductStatus};
pub use shop::{Permission, Shop, ShopManager, ShopStats, ShopStatus};
