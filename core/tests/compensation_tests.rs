// tests/compensation_tests.rs
mod common;

use common::*;
use saga_engine::{ContextData, Saga, SkipCondition};
use std::sync::Arc;

#[tokio::test]
async fn completed_steps_are_compensated_in_reverse_order() {
  setup_tracing();
  let mut saga = Saga::<LedgerCtx, TestError>::new(
    "reverse",
    &[("a", false, None), ("b", false, None), ("c", false, None), ("d", false, None)],
  );
  saga.on("a", credit("a", 1));
  saga.compensate("a", debit_back("a", 1));
  saga.on("b", credit("b", 10));
  saga.compensate("b", debit_back("b", 10));
  saga.on("c", failing("c"));
  saga.compensate("c", debit_back("c", 999));
  saga.on("d", credit("d", 100));

  let ctx = ContextData::new(LedgerCtx::default());
  let err = saga.run(ctx.clone()).await.unwrap_err();

  assert_eq!(err, TestError::Step("c".to_string()));
  let guard = ctx.read();
  // The failing step itself is never compensated, and "d" never ran.
  assert_eq!(guard.journal, vec!["a", "b", "c", "undo:b", "undo:a"]);
  assert_eq!(guard.balance, 0);
}

#[tokio::test]
async fn steps_without_compensation_are_passed_over() {
  setup_tracing();
  let mut saga = Saga::<LedgerCtx, TestError>::new(
    "partial",
    &[("read_only", false, None), ("write", false, None), ("publish", false, None)],
  );
  saga.on("read_only", credit("read_only", 0));
  saga.on("write", credit("write", 50));
  saga.compensate("write", debit_back("write", 50));
  saga.on("publish", failing("publish"));

  let ctx = ContextData::new(LedgerCtx::default());
  saga.run(ctx.clone()).await.unwrap_err();

  assert_eq!(ctx.read().journal, vec!["read_only", "write", "publish", "undo:write"]);
  assert_eq!(ctx.read().balance, 0);
}

#[tokio::test]
async fn failing_compensation_does_not_stop_the_others_or_mask_the_error() {
  setup_tracing();
  let mut saga = Saga::<LedgerCtx, TestError>::new(
    "stubborn",
    &[("a", false, None), ("b", false, None), ("c", false, None)],
  );
  saga.on("a", credit("a", 1));
  saga.compensate("a", debit_back("a", 1));
  saga.on("b", credit("b", 2));
  saga.compensate("b", |ctx: ContextData<LedgerCtx>| async move {
    ctx.write().journal.push("undo:b attempted".to_string());
    Err::<(), _>(TestError::Compensation("b".to_string()))
  });
  saga.on("c", failing("c"));

  let ctx = ContextData::new(LedgerCtx::default());
  let err = saga.run(ctx.clone()).await.unwrap_err();

  assert_eq!(err, TestError::Step("c".to_string()));
  assert_eq!(ctx.read().journal, vec!["a", "b", "c", "undo:b attempted", "undo:a"]);
  assert_eq!(ctx.read().balance, 2);
}

#[tokio::test]
async fn skipped_and_optional_failed_steps_are_not_compensated() {
  setup_tracing();
  let mut saga = Saga::<LedgerCtx, TestError>::new(
    "selective",
    &[
      ("skipped", false, Some(Arc::new(|_ctx: ContextData<LedgerCtx>| true) as SkipCondition<LedgerCtx>)),
      ("optional", true, None),
      ("boom", false, None),
    ],
  );
  saga.on("skipped", credit("skipped", 1));
  saga.compensate("skipped", debit_back("skipped", 1));
  saga.on("optional", failing("optional"));
  saga.compensate("optional", debit_back("optional", 1));
  saga.on("boom", failing("boom"));

  let ctx = ContextData::new(LedgerCtx::default());
  saga.run(ctx.clone()).await.unwrap_err();

  assert_eq!(ctx.read().journal, vec!["optional", "boom"]);
  assert_eq!(ctx.read().balance, 0);
}
