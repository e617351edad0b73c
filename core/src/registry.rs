// saga-engine/src/registry.rs

//! `SagaRegistry<E>`: one saga per context type, dispatched by `TypeId`.

use crate::core::context_data::ContextData;
use crate::core::control::SagaOutcome;
use crate::error::SagaError;
use crate::saga::definition::Saga;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{event, instrument, Level};

#[async_trait]
trait AnySagaRunner<AppErr>: Send + Sync
where
  AppErr: std::error::Error + Send + Sync + 'static,
{
  fn saga_name(&self) -> &str;

  /// `ctx_obj` holds a `ContextData<TData>` for the wrapped saga's `TData`.
  async fn run_erased(&self, ctx_obj: Box<dyn Any + Send>) -> Result<SagaOutcome, AppErr>;
}

struct SagaWrapper<TData, HandlerErr, AppErr>
where
  TData: 'static + Send + Sync,
  HandlerErr: std::error::Error + From<SagaError> + Send + Sync + 'static,
  AppErr: std::error::Error + From<HandlerErr> + From<SagaError> + Send + Sync + 'static,
{
  saga: Arc<Saga<TData, HandlerErr>>,
  _phantom_app_err: PhantomData<fn() -> AppErr>,
}

#[async_trait]
impl<TData, HandlerErr, AppErr> AnySagaRunner<AppErr> for SagaWrapper<TData, HandlerErr, AppErr>
where
  TData: 'static + Send + Sync,
  HandlerErr: std::error::Error + From<SagaError> + Send + Sync + 'static,
  AppErr: std::error::Error + From<HandlerErr> + From<SagaError> + Send + Sync + 'static,
{
  fn saga_name(&self) -> &str {
    self.saga.name()
  }

  async fn run_erased(&self, ctx_obj: Box<dyn Any + Send>) -> Result<SagaOutcome, AppErr> {
    let typed_ctx = match ctx_obj.downcast::<ContextData<TData>>() {
      Ok(boxed) => *boxed,
      Err(_) => {
        let expected_type = std::any::type_name::<ContextData<TData>>();
        event!(Level::ERROR, saga = %self.saga.name(), "Context type mismatch, expected {}.", expected_type);
        return Err(AppErr::from(SagaError::TypeMismatch {
          step_name: "registry_dispatch".to_string(),
          expected_type: expected_type.to_string(),
        }));
      }
    };
    self.saga.run(typed_ctx).await.map_err(AppErr::from)
  }
}

/// Registry of sagas keyed by context type.
///
/// `AppErr` is what `run` returns; it must absorb both the engine's errors and
/// every registered saga's handler error type.
pub struct SagaRegistry<AppErr = SagaError>
where
  AppErr: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  registry: RwLock<HashMap<TypeId, Arc<dyn AnySagaRunner<AppErr>>>>,
}

impl<AppErr> Default for SagaRegistry<AppErr>
where
  AppErr: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<AppErr> SagaRegistry<AppErr>
where
  AppErr: std::error::Error + From<SagaError> + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      registry: RwLock::new(HashMap::new()),
    }
  }

  /// Registers `saga` for its context type, replacing any earlier saga for
  /// the same type.
  pub fn register<TData, HandlerErr>(&self, saga: Saga<TData, HandlerErr>)
  where
    TData: 'static + Send + Sync,
    HandlerErr: std::error::Error + From<SagaError> + Send + Sync + 'static,
    AppErr: From<HandlerErr>,
  {
    event!(
      Level::DEBUG,
      saga = %saga.name(),
      tdata_type = %std::any::type_name::<TData>(),
      "Registering saga."
    );
    let wrapper = SagaWrapper::<TData, HandlerErr, AppErr> {
      saga: Arc::new(saga),
      _phantom_app_err: PhantomData,
    };
    if let Some(previous) = self.registry.write().insert(TypeId::of::<TData>(), Arc::new(wrapper)) {
      event!(Level::WARN, replaced = %previous.saga_name(), "Saga replaced for context type.");
    }
  }

  pub fn is_registered<TData: 'static>(&self) -> bool {
    self.registry.read().contains_key(&TypeId::of::<TData>())
  }

  /// Runs the saga registered for `TData`.
  #[instrument(name = "SagaRegistry::run", skip_all, fields(tdata_type = %std::any::type_name::<TData>()))]
  pub async fn run<TData>(&self, ctx_data: ContextData<TData>) -> Result<SagaOutcome, AppErr>
  where
    TData: 'static + Send + Sync,
  {
    let runner = self
      .registry
      .read()
      .get(&TypeId::of::<TData>())
      .cloned()
      .ok_or_else(|| {
        let type_name = std::any::type_name::<TData>();
        event!(Level::ERROR, "No saga registered for {}.", type_name);
        AppErr::from(SagaError::ConfigurationError {
          step_name: "SagaRegistry::run".to_string(),
          message: format!("No saga registered for context type {}", type_name),
        })
      })?;

    runner.run_erased(Box::new(ctx_data)).await
  }
}
