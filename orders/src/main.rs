// marketplace_orders/src/main.rs

use marketplace_orders::consumer::ConsumerHandle;
use marketplace_orders::services::bus::{MemoryBus, MessageBus, PgBus};
use marketplace_orders::services::{ExchangeClient, HttpExchangeClient, HttpWalletClient, WalletClient};
use marketplace_orders::store::{CatalogStore, MemoryStore, OrderStore, PgStore};
use marketplace_orders::{web, AppConfig, AppError, AppState};

use actix_web::{web as actix_data, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

type Backends = (Arc<dyn OrderStore>, Arc<dyn CatalogStore>, Arc<dyn MessageBus>);

async fn connect_backends(config: &AppConfig) -> Result<Backends, AppError> {
  match &config.database_url {
    Some(url) => {
      let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
      tracing::info!("Successfully connected to the database.");
      let store = Arc::new(PgStore::new(pool.clone()));
      store.migrate().await?;
      let orders: Arc<dyn OrderStore> = store.clone();
      let catalog: Arc<dyn CatalogStore> = store;
      let bus: Arc<dyn MessageBus> = Arc::new(PgBus::new(pool, config.bus_poll_interval, config.bus_lease));
      Ok((orders, catalog, bus))
    }
    None => {
      tracing::warn!("DATABASE_URL not set; using the in-memory store and bus. Nothing survives a restart.");
      let store = Arc::new(MemoryStore::new());
      let orders: Arc<dyn OrderStore> = store.clone();
      let catalog: Arc<dyn CatalogStore> = store;
      let bus: Arc<dyn MessageBus> = Arc::new(MemoryBus::new());
      Ok((orders, catalog, bus))
    }
  }
}

fn startup_error(e: AppError) -> std::io::Error {
  tracing::error!(error = %e, "Startup failed.");
  std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting order service...");

  let app_config = AppConfig::from_env().map_err(startup_error)?;

  let (orders, catalog, bus) = connect_backends(&app_config).await.map_err(startup_error)?;

  let wallet: Arc<dyn WalletClient> = Arc::new(
    HttpWalletClient::new(&app_config.wallet_service_url, app_config.collaborator_timeout).map_err(startup_error)?,
  );
  let exchange: Arc<dyn ExchangeClient> = Arc::new(
    HttpExchangeClient::new(&app_config.exchange_service_url, app_config.collaborator_timeout)
      .map_err(startup_error)?,
  );

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  let app_state = AppState::new(orders, catalog, bus, wallet, exchange, app_config);

  let shutdown = CancellationToken::new();
  let consumers = ConsumerHandle::spawn(&app_state, shutdown.clone());
  let monitor = consumers.monitor();

  tracing::info!("Attempting to bind server to {}...", server_address);
  let server = HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .app_data(actix_data::Data::new(monitor.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)?
  .run();

  // The server stops itself on SIGINT/SIGTERM; the consumers follow.
  let served = server.await;
  consumers.shutdown().await;
  tracing::info!("Order service stopped.");
  served
}
