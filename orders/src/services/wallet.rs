// marketplace_orders/src/services/wallet.rs

//! Read-only view of the wallet ledger's accounts, used at checkout.

use crate::errors::{AppError, Result as AppResult};
use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletAccount {
  pub id: String,
  pub owner_id: Uuid,
  pub currency: String,
  pub balance: Decimal,
}

#[async_trait]
pub trait WalletClient: Send + Sync {
  /// `Ok(None)` when the ledger has no such account.
  async fn account(&self, account_id: &str) -> AppResult<Option<WalletAccount>>;
}

pub struct HttpWalletClient {
  client: reqwest::Client,
  base_url: String,
}

impl HttpWalletClient {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| AppError::Config(format!("Failed to build wallet client: {}", e)))?;
    Ok(Self {
      client,
      base_url: base_url.into().trim_end_matches('/').to_string(),
    })
  }
}

#[async_trait]
impl WalletClient for HttpWalletClient {
  #[instrument(name = "wallet::account", skip(self), err)]
  async fn account(&self, account_id: &str) -> AppResult<Option<WalletAccount>> {
    let url = format!("{}/accounts/{}", self.base_url, account_id);
    let response = self.client.get(&url).send().await.map_err(|e| {
      warn!(error = %e, "Wallet service request failed.");
      AppError::ServiceUnavailable(format!("wallet service unreachable: {}", e))
    })?;

    match response.status() {
      StatusCode::NOT_FOUND => {
        debug!("Wallet account not found.");
        Ok(None)
      }
      status if status.is_success() => {
        let account = response
          .json::<WalletAccount>()
          .await
          .map_err(|e| AppError::ServiceUnavailable(format!("wallet service sent an unreadable account: {}", e)))?;
        Ok(Some(account))
      }
      status => Err(AppError::ServiceUnavailable(format!(
        "wallet service answered {}",
        status
      ))),
    }
  }
}
