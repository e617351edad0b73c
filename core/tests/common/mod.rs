// tests/common/mod.rs
#![allow(dead_code)]

use saga_engine::{ContextData, SagaError, StepControl};
use std::future::Future;
use std::pin::Pin;
use tracing::Level;

pub type StepFuture = Pin<Box<dyn Future<Output = Result<StepControl, TestError>> + Send>>;
pub type UndoFuture = Pin<Box<dyn Future<Output = Result<(), TestError>> + Send>>;

#[derive(Clone, Debug, Default)]
pub struct LedgerCtx {
  pub balance: i64,
  pub journal: Vec<String>,
  pub halt_at: Option<String>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("engine: {0}")]
  Engine(String),

  #[error("step failed: {0}")]
  Step(String),

  #[error("compensation failed: {0}")]
  Compensation(String),
}

impl From<SagaError> for TestError {
  fn from(err: SagaError) -> Self {
    TestError::Engine(format!("{:?}", err))
  }
}

/// Adds `amount` to the balance and journals the step name.
pub fn credit(
  step_name: &'static str,
  amount: i64,
) -> impl Fn(ContextData<LedgerCtx>) -> StepFuture + Send + Sync + 'static {
  move |ctx: ContextData<LedgerCtx>| -> StepFuture {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.balance += amount;
      guard.journal.push(step_name.to_string());
      if guard.halt_at.as_deref() == Some(step_name) {
        return Ok(StepControl::Halt);
      }
      Ok(StepControl::Continue)
    })
  }
}

/// Journals the step name and fails.
pub fn failing(
  step_name: &'static str,
) -> impl Fn(ContextData<LedgerCtx>) -> StepFuture + Send + Sync + 'static {
  move |ctx: ContextData<LedgerCtx>| -> StepFuture {
    Box::pin(async move {
      ctx.write().journal.push(step_name.to_string());
      Err(TestError::Step(step_name.to_string()))
    })
  }
}

/// Reverses a credit and journals `undo:<step>`.
pub fn debit_back(
  step_name: &'static str,
  amount: i64,
) -> impl Fn(ContextData<LedgerCtx>) -> UndoFuture + Send + Sync + 'static {
  move |ctx: ContextData<LedgerCtx>| -> UndoFuture {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.balance -= amount;
      guard.journal.push(format!("undo:{}", step_name));
      Ok(())
    })
  }
}

use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
