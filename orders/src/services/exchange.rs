// marketplace_orders/src/services/exchange.rs

use crate::errors::{AppError, Result as AppResult};
use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use std::time::Duration;
use tracing::{instrument, warn};

#[async_trait]
pub trait ExchangeClient: Send + Sync {
  /// Units of `to` per unit of `from`.
  async fn rate(&self, from: &str, to: &str) -> AppResult<Decimal>;
}

/// Converts `amount` at `rate`, to cents, half away from zero.
pub fn convert(amount: Decimal, rate: Decimal) -> Decimal {
  (amount * rate).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Deserialize)]
struct RateResponse {
  rate: Decimal,
}

pub struct HttpExchangeClient {
  client: reqwest::Client,
  base_url: String,
}

impl HttpExchangeClient {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| AppError::Config(format!("Failed to build exchange client: {}", e)))?;
    Ok(Self {
      client,
      base_url: base_url.into().trim_end_matches('/').to_string(),
    })
  }
}

#[async_trait]
impl ExchangeClient for HttpExchangeClient {
  #[instrument(name = "exchange::rate", skip(self), err)]
  async fn rate(&self, from: &str, to: &str) -> AppResult<Decimal> {
    let response = self
      .client
      .get(format!("{}/rates", self.base_url))
      .query(&[("from", from), ("to", to)])
      .send()
      .await
      .and_then(reqwest::Response::error_for_status)
      .map_err(|e| {
        warn!(error = %e, "Exchange service request failed.");
        AppError::ServiceUnavailable(format!("exchange service unavailable: {}", e))
      })?;

    let body = response
      .json::<RateResponse>()
      .await
      .map_err(|e| AppError::ServiceUnavailable(format!("exchange service sent an unreadable rate: {}", e)))?;
    if body.rate <= Decimal::ZERO {
      return Err(AppError::ServiceUnavailable(format!(
        "exchange service quoted a non-positive rate {} for {}->{}",
        body.rate, from, to
      )));
    }
    Ok(body.rate)
  }
}
