// marketplace_orders/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  /// Absent means the in-memory store and bus.
  pub database_url: Option<String>,

  pub wallet_service_url: String,
  pub exchange_service_url: String,
  pub collaborator_timeout: Duration,

  pub settlement_request_topic: String,
  pub settlement_result_topic: String,
  pub notification_topic: String,
  pub origin_service: String,

  pub consumer_workers: usize,
  pub consumer_retry_base: Duration,
  pub consumer_retry_max: Duration,
  pub bus_poll_interval: Duration,
  pub bus_lease: Duration,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      server_host: "127.0.0.1".to_string(),
      server_port: 8080,
      database_url: None,
      wallet_service_url: "http://127.0.0.1:8081".to_string(),
      exchange_service_url: "http://127.0.0.1:8082".to_string(),
      collaborator_timeout: Duration::from_millis(3000),
      settlement_request_topic: "wallet.settlement.requested".to_string(),
      settlement_result_topic: "wallet.settlement.completed".to_string(),
      notification_topic: "notifications.user".to_string(),
      origin_service: "marketplace".to_string(),
      consumer_workers: 1,
      consumer_retry_base: Duration::from_millis(200),
      consumer_retry_max: Duration::from_millis(10_000),
      bus_poll_interval: Duration::from_millis(250),
      bus_lease: Duration::from_secs(30),
    }
  }
}

fn parsed<T>(var_name: &str, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match env::var(var_name) {
    Ok(raw) => raw
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {}: {}", var_name, e))),
    Err(_) => Ok(default),
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();
    let defaults = Self::default();

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };

    let consumer_workers: usize = parsed("CONSUMER_WORKERS", defaults.consumer_workers)?;
    if consumer_workers == 0 {
      return Err(AppError::Config("CONSUMER_WORKERS must be at least 1".to_string()));
    }
    let consumer_retry_base = Duration::from_millis(parsed("CONSUMER_RETRY_BASE_MS", 200u64)?);
    let consumer_retry_max = Duration::from_millis(parsed("CONSUMER_RETRY_MAX_MS", 10_000u64)?);
    if consumer_retry_max < consumer_retry_base {
      return Err(AppError::Config(
        "CONSUMER_RETRY_MAX_MS must not be below CONSUMER_RETRY_BASE_MS".to_string(),
      ));
    }

    let config = Self {
      server_host: get_env("SERVER_HOST").unwrap_or(defaults.server_host),
      server_port: parsed("SERVER_PORT", defaults.server_port)?,
      database_url: get_env("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
      wallet_service_url: get_env("WALLET_SERVICE_URL")?,
      exchange_service_url: get_env("EXCHANGE_SERVICE_URL")?,
      collaborator_timeout: Duration::from_millis(parsed("COLLABORATOR_TIMEOUT_MS", 3000u64)?),
      settlement_request_topic: get_env("SETTLEMENT_REQUEST_TOPIC").unwrap_or(defaults.settlement_request_topic),
      settlement_result_topic: get_env("SETTLEMENT_RESULT_TOPIC").unwrap_or(defaults.settlement_result_topic),
      notification_topic: get_env("NOTIFICATION_TOPIC").unwrap_or(defaults.notification_topic),
      origin_service: get_env("ORIGIN_SERVICE").unwrap_or(defaults.origin_service),
      consumer_workers,
      consumer_retry_base,
      consumer_retry_max,
      bus_poll_interval: Duration::from_millis(parsed("BUS_POLL_INTERVAL_MS", 250u64)?),
      bus_lease: Duration::from_secs(parsed("BUS_LEASE_SECS", 30u64)?),
    };

    tracing::info!(
      server = %format!("{}:{}", config.server_host, config.server_port),
      persistent = config.database_url.is_some(),
      workers = config.consumer_workers,
      "Application configuration loaded successfully."
    );
    Ok(config)
  }
}
