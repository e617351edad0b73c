// saga-engine/src/core/context.rs

//! Boxed handler types stored by a `Saga<TData, Err>`.

use crate::core::context_data::ContextData;
use crate::core::control::StepControl;
use std::future::Future;
use std::pin::Pin;

/// A forward handler for a saga step.
///
/// Takes a clone of the shared context and resolves to a `StepControl` or the
/// saga's error type.
///
/// Handlers must drop any `read()`/`write()` guard before reaching an `.await`.
pub type Handler<TData, Err> = Box<
  dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<StepControl, Err>> + Send>>
    + Send
    + Sync,
>;

/// An undo handler for a step that completed before a later step failed.
///
/// Compensations run in reverse step order. A failing compensation is logged
/// and the remaining compensations still run.
pub type Compensator<TData, Err> =
  Box<dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<(), Err>> + Send>> + Send + Sync>;
