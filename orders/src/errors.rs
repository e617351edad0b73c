// marketplace_orders/src/errors.rs

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use saga_engine::SagaError;
use serde_json::json;
use thiserror::Error;

use crate::services::bus::BusError;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Policy Violation: {0}")]
  PolicyViolation(String),

  #[error("Unavailable: {0}")]
  Unavailable(String),

  #[error("Insufficient Stock: {0}")]
  InsufficientStock(String),

  #[error("Insufficient Funds: {0}")]
  InsufficientFunds(String),

  #[error("Service Unavailable: {0}")]
  ServiceUnavailable(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("Message Bus Error: {0}")]
  Bus(#[from] BusError),

  #[error("Saga Workflow Error: {source}")]
  Workflow {
    #[from]
    source: SagaError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<sqlx::Error>() {
      Ok(db_err) => AppError::Database(db_err),
      Err(other) => AppError::Internal(other.to_string()),
    }
  }
}

impl From<serde_json::Error> for AppError {
  fn from(err: serde_json::Error) -> Self {
    AppError::Internal(format!("Serialization failed: {}", err))
  }
}

impl AppError {
  /// Short machine-readable tag returned alongside the message.
  pub fn kind(&self) -> &'static str {
    match self {
      AppError::Validation(_) => "validation",
      AppError::NotFound(_) => "not_found",
      AppError::Forbidden(_) => "forbidden",
      AppError::PolicyViolation(_) => "policy_violation",
      AppError::Unavailable(_) => "unavailable",
      AppError::InsufficientStock(_) => "insufficient_stock",
      AppError::InsufficientFunds(_) => "insufficient_funds",
      AppError::ServiceUnavailable(_) => "service_unavailable",
      AppError::Config(_) => "config",
      AppError::Database(_) => "database",
      AppError::Bus(_) => "bus",
      AppError::Workflow { .. } => "workflow",
      AppError::Internal(_) => "internal",
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::PolicyViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
      AppError::Unavailable(_) | AppError::InsufficientStock(_) => StatusCode::CONFLICT,
      AppError::InsufficientFunds(_) => StatusCode::PAYMENT_REQUIRED,
      AppError::ServiceUnavailable(_) | AppError::Bus(_) => StatusCode::SERVICE_UNAVAILABLE,
      AppError::Config(_) | AppError::Database(_) | AppError::Workflow { .. } | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, "Rejecting request");
    }
    let body = match self {
      // Internal details stay in the log.
      AppError::Database(_) => json!({"error": "Database operation failed", "kind": self.kind()}),
      AppError::Workflow { source } => {
        tracing::error!(saga_error_source = ?source, "Workflow error details");
        json!({"error": "Workflow processing error", "kind": self.kind()})
      }
      _ => json!({"error": self.to_string(), "kind": self.kind()}),
    };
    HttpResponse::build(status).json(body)
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
