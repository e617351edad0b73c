// saga-engine/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SagaError {
  #[error("Step not found: {step_name}")]
  StepNotFound { step_name: String },

  #[error("Handler missing for mandatory step: {step_name}")]
  HandlerMissing { step_name: String },

  #[error("Type mismatch while dispatching saga (expected {expected_type}, at: '{step_name}')")]
  TypeMismatch {
    step_name: String,
    expected_type: String,
  },

  #[error("Error in saga handler or external operation. Source: {source}")]
  HandlerError {
    #[source]
    source: AnyhowError,
  },

  #[error("Configuration error for '{step_name}': {message}")]
  ConfigurationError { step_name: String, message: String },

  #[error("Internal saga error: {0}")]
  Internal(String),
}

impl From<AnyhowError> for SagaError {
  fn from(err: AnyhowError) -> Self {
    // An anyhow error that already wraps a SagaError keeps its message intact
    // through the source chain.
    SagaError::HandlerError { source: err }
  }
}

pub type SagaResult<T, E = SagaError> = std::result::Result<T, E>;
