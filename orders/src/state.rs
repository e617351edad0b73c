// marketplace_orders/src/state.rs

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::{ExchangeClient, MessageBus, WalletClient};
use crate::store::{CatalogStore, OrderStore};
use saga_engine::SagaRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub orders: Arc<dyn OrderStore>,
  pub catalog: Arc<dyn CatalogStore>,
  pub bus: Arc<dyn MessageBus>,
  pub wallet: Arc<dyn WalletClient>,
  pub exchange: Arc<dyn ExchangeClient>,
  pub sagas: Arc<SagaRegistry<AppError>>,
  pub config: Arc<AppConfig>,
}

impl AppState {
  /// Wires the collaborators together and registers every saga.
  pub fn new(
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn CatalogStore>,
    bus: Arc<dyn MessageBus>,
    wallet: Arc<dyn WalletClient>,
    exchange: Arc<dyn ExchangeClient>,
    config: AppConfig,
  ) -> Self {
    let state = Self {
      orders,
      catalog,
      bus,
      wallet,
      exchange,
      sagas: Arc::new(SagaRegistry::<AppError>::new()),
      config: Arc::new(config),
    };
    crate::pipelines::register_all_sagas(&state.sagas);
    state
  }
}
