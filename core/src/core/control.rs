// saga-engine/src/core/control.rs

//! Flow signals returned by handlers and the outcome of a saga run.

/// Returned by a forward handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
  /// Run the remaining handlers and steps.
  Continue,
  /// Stop the saga here. Nothing is compensated: a halt is a decision taken by
  /// the step, not a failure.
  Halt,
}

/// Outcome of a saga run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaOutcome {
  /// Every non-skipped step ran.
  Completed,
  /// A handler returned `StepControl::Halt`.
  Halted,
}
