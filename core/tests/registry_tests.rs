// tests/registry_tests.rs
mod common;

use common::*;
use saga_engine::{ContextData, Saga, SagaOutcome, SagaRegistry, StepControl};

#[derive(Clone, Debug, Default)]
struct OtherCtx {
  label: String,
}

#[tokio::test]
async fn registry_dispatches_by_context_type() {
  setup_tracing();
  let registry = SagaRegistry::<TestError>::new();

  let mut ledger = Saga::<LedgerCtx, TestError>::new("ledger", &[("credit", false, None)]);
  ledger.on("credit", credit("credit", 42));
  registry.register(ledger);

  let mut other = Saga::<OtherCtx, TestError>::new("other", &[("label", false, None)]);
  other.on("label", |ctx: ContextData<OtherCtx>| async move {
    ctx.write().label = "labelled".to_string();
    Ok::<_, TestError>(StepControl::Continue)
  });
  registry.register(other);

  assert!(registry.is_registered::<LedgerCtx>());
  assert!(registry.is_registered::<OtherCtx>());

  let ledger_ctx = ContextData::new(LedgerCtx::default());
  assert_eq!(registry.run(ledger_ctx.clone()).await.unwrap(), SagaOutcome::Completed);
  assert_eq!(ledger_ctx.read().balance, 42);

  let other_ctx = ContextData::new(OtherCtx::default());
  registry.run(other_ctx.clone()).await.unwrap();
  assert_eq!(other_ctx.with(|c| c.label.clone()), "labelled");
}

#[tokio::test]
async fn running_an_unregistered_context_is_a_configuration_error() {
  setup_tracing();
  let registry = SagaRegistry::<TestError>::new();

  let err = registry.run(ContextData::new(OtherCtx::default())).await.unwrap_err();
  match err {
    TestError::Engine(msg) => {
      assert!(msg.contains("ConfigurationError"));
      assert!(msg.contains("OtherCtx"));
    }
    other => panic!("expected configuration error, got {:?}", other),
  }
}

#[tokio::test]
async fn registry_surfaces_handler_errors_after_compensation() {
  setup_tracing();
  let registry = SagaRegistry::<TestError>::new();
  let mut saga = Saga::<LedgerCtx, TestError>::new("failing", &[("credit", false, None), ("fail", false, None)]);
  saga.on("credit", credit("credit", 5));
  saga.compensate("credit", debit_back("credit", 5));
  saga.on("fail", failing("fail"));
  registry.register(saga);

  let ctx = ContextData::new(LedgerCtx::default());
  let err = registry.run(ctx.clone()).await.unwrap_err();

  assert_eq!(err, TestError::Step("fail".to_string()));
  assert_eq!(ctx.snapshot().balance, 0);
}
