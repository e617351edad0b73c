// marketplace_orders/src/services/bus/mod.rs

//! At-least-once message transport between this service, the ledger and the
//! notification service.
//!
//! A `Subscription` hands out one `Delivery` at a time. Every delivery must be
//! settled with exactly one of `ack`, `nack` (redeliver later) or
//! `dead_letter` followed by `ack`. A delivery that is never settled is
//! redelivered once its lease lapses or the subscription disconnects.

pub mod memory;
pub mod postgres;

pub use memory::{DeadLetter, MemoryBus};
pub use postgres::PgBus;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
  #[error("bus connection lost")]
  Disconnected,

  #[error("publish to '{topic}' rejected: {reason}")]
  PublishRejected { topic: String, reason: String },

  #[error("delivery {0} is not in flight")]
  UnknownDelivery(i64),

  #[error("payload encoding failed: {0}")]
  Encode(#[from] serde_json::Error),

  #[error("bus storage error: {0}")]
  Storage(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct Delivery {
  pub id: i64,
  pub topic: String,
  pub payload: Vec<u8>,
  /// 1 on first delivery, incremented on each redelivery.
  pub attempt: u32,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
  async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

  async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, BusError>;
}

#[async_trait]
pub trait Subscription: Send {
  /// Waits for the next delivery. `Ok(None)` means the subscription was
  /// disconnected and has to be re-established.
  async fn next(&mut self) -> Result<Option<Delivery>, BusError>;

  async fn ack(&mut self, delivery: &Delivery) -> Result<(), BusError>;

  async fn nack(&mut self, delivery: &Delivery) -> Result<(), BusError>;

  async fn dead_letter(&mut self, delivery: &Delivery, reason: &str) -> Result<(), BusError>;
}

/// Serializes `message` as JSON and publishes it.
pub async fn publish_json<T: Serialize>(bus: &dyn MessageBus, topic: &str, message: &T) -> Result<(), BusError> {
  let payload = serde_json::to_vec(message)?;
  bus.publish(topic, payload).await
}
