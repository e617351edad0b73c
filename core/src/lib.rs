// saga-engine/src/lib.rs

//! An async, type-safe saga engine.
//!
//! A saga is an ordered list of named steps run against one shared context:
//!  - Each step may carry `before`, `on` and `after` handlers.
//!  - A handler may halt the saga early (`StepControl::Halt`).
//!  - Steps can be optional (errors are logged and swallowed) or skipped by a
//!    condition evaluated on the context.
//!  - A step may register a compensation. When a mandatory step fails, the
//!    compensations of every step that already completed run in reverse order
//!    before the original error is returned.
//!  - A type-keyed registry runs the saga registered for a context type.

pub mod core;
pub mod error;
pub mod registry;
pub mod saga;

pub use crate::core::context::{Compensator, Handler};
pub use crate::core::context_data::ContextData;
pub use crate::core::control::{SagaOutcome, StepControl};
pub use crate::core::step::{SkipCondition, StepDef};

pub use crate::saga::Saga;

pub use crate::error::{SagaError, SagaResult};

pub use crate::registry::SagaRegistry;

/*
    Typical use:
    1. Define a context struct `MyCtx` holding the inputs and the values steps produce.
    2. Build a `Saga<MyCtx, MyError>` from `(name, optional, skip_if)` triples.
    3. Attach handlers with `.on()`, `.before()`, `.after()` and undo logic with `.compensate()`.
    4. Register the saga in a `SagaRegistry<MyError>` shared by the application.
    5. Wrap an instance in `ContextData::new(..)` and call `registry.run(ctx.clone()).await`,
       then read the results back out of `ctx`.
*/
