// saga-engine/src/saga/execution.rs

//! `Saga::run()`: forward execution and reverse-order compensation.

use crate::core::context::Handler;
use crate::core::context_data::ContextData;
use crate::core::control::{SagaOutcome, StepControl};
use crate::core::step::StepDef;
use crate::error::SagaError;
use crate::saga::definition::Saga;
use tracing::{event, instrument, span, Instrument, Level};

impl<TData, Err> Saga<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  /// Runs every step in order against `ctx_data`.
  ///
  /// - `Ok(Completed)`: all non-skipped steps ran.
  /// - `Ok(Halted)`: a handler returned `StepControl::Halt`; nothing is undone.
  /// - `Err(e)`: a mandatory step failed. Compensations of the steps completed
  ///   so far have already run, newest first, when this returns.
  #[instrument(
    name = "Saga::run",
    skip_all,
    fields(saga = %self.name, num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<SagaOutcome, Err> {
    event!(Level::DEBUG, "Saga run starting.");
    let mut completed: Vec<&str> = Vec::new();

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_span = span!(
        Level::INFO,
        "saga_step",
        step_name = step_def.name.as_str(),
        step_index = step_idx,
        optional = step_def.optional
      );

      match self.run_step(step_def, ctx_data.clone()).instrument(step_span).await {
        Ok(None) => continue,
        Ok(Some(StepControl::Continue)) => completed.push(step_def.name.as_str()),
        Ok(Some(StepControl::Halt)) => {
          event!(Level::INFO, step_name = %step_def.name, "Saga halted by step.");
          return Ok(SagaOutcome::Halted);
        }
        Err(e) if step_def.optional => {
          event!(Level::WARN, step_name = %step_def.name, error = %e, "Optional step failed; continuing.");
        }
        Err(e) => {
          event!(Level::ERROR, step_name = %step_def.name, error = %e, "Mandatory step failed; compensating.");
          self.compensate_completed(&completed, ctx_data).await;
          return Err(e);
        }
      }
    }

    event!(Level::DEBUG, "Saga run completed.");
    Ok(SagaOutcome::Completed)
  }

  /// `Ok(None)` means the step was skipped.
  async fn run_step(&self, step_def: &StepDef<TData>, ctx_data: ContextData<TData>) -> Result<Option<StepControl>, Err> {
    let step_name = step_def.name.as_str();

    if let Some(skip_cond_fn) = &step_def.skip_if {
      if skip_cond_fn(ctx_data.clone()) {
        event!(Level::DEBUG, "Step skipped by condition.");
        return Ok(None);
      }
    }

    let phases = [
      ("before", self.before.get(step_name)),
      ("on", self.on.get(step_name)),
      ("after", self.after.get(step_name)),
    ];

    if phases.iter().all(|(_, handlers)| handlers.map_or(true, |v| v.is_empty())) {
      if step_def.optional {
        event!(Level::DEBUG, "Optional step has no handlers, skipping.");
        return Ok(None);
      }
      return Err(Err::from(SagaError::HandlerMissing {
        step_name: step_def.name.clone(),
      }));
    }

    for (phase, handlers) in phases {
      let Some(handlers) = handlers else { continue };
      if let StepControl::Halt = Self::run_phase(phase, handlers, &ctx_data).await? {
        return Ok(Some(StepControl::Halt));
      }
    }
    Ok(Some(StepControl::Continue))
  }

  async fn run_phase(
    phase: &'static str,
    handlers: &[Handler<TData, Err>],
    ctx_data: &ContextData<TData>,
  ) -> Result<StepControl, Err> {
    for (handler_idx, handler_fn) in handlers.iter().enumerate() {
      let handler_span = span!(Level::DEBUG, "step_handler", phase, handler_index = handler_idx);
      match handler_fn(ctx_data.clone()).instrument(handler_span).await? {
        StepControl::Continue => {}
        StepControl::Halt => return Ok(StepControl::Halt),
      }
    }
    Ok(StepControl::Continue)
  }

  async fn compensate_completed(&self, completed: &[&str], ctx_data: ContextData<TData>) {
    for step_name in completed.iter().rev() {
      let Some(compensator) = self.compensations.get(*step_name) else {
        continue;
      };
      let comp_span = span!(Level::INFO, "saga_compensation", step_name = *step_name);
      match compensator(ctx_data.clone()).instrument(comp_span).await {
        Ok(()) => event!(Level::INFO, saga = %self.name, %step_name, "Step compensated."),
        Err(e) => event!(
          Level::ERROR,
          saga = %self.name,
          %step_name,
          error = %e,
          "Compensation failed; continuing with remaining compensations."
        ),
      }
    }
  }
}
