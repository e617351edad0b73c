// marketplace_orders/src/pipelines/mod.rs

//! The sagas of the order service and the operations that run them.

use crate::errors::AppError;
use saga_engine::SagaRegistry;

pub mod common_steps;
pub mod contexts;

pub mod checkout_pipeline;
pub mod queries;
pub mod refund_pipeline;
pub mod settlement_pipeline;
pub mod status_pipeline;

pub use checkout_pipeline::create_order;
pub use contexts::SettlementDisposition;
pub use queries::{get_order, list_my_orders, list_shop_orders};
pub use refund_pipeline::refund_order;
pub use settlement_pipeline::apply_settlement_result;
pub use status_pipeline::update_order_status;

/// Registers every saga. Called once when the application state is built.
pub fn register_all_sagas(registry: &SagaRegistry<AppError>) {
  tracing::info!("Registering sagas...");

  checkout_pipeline::register_checkout_saga(registry);
  status_pipeline::register_status_saga(registry);
  refund_pipeline::register_refund_saga(registry);
  settlement_pipeline::register_settlement_saga(registry);

  tracing::info!("All sagas registered.");
}
