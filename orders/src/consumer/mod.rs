// marketplace_orders/src/consumer/mod.rs

//! Supervised consumer of settlement results.
//!
//! Each worker subscribes to the result topic and applies deliveries one at a
//! time. A lost subscription is re-established with exponential backoff;
//! shutdown goes through a `CancellationToken`. Workers publish their state on
//! a `watch` channel so the health endpoint can report it.

pub mod backoff;

pub use backoff::Backoff;

use crate::models::SettlementResult;
use crate::pipelines::settlement_pipeline::apply_settlement_result;
use crate::services::{Delivery, Subscription};
use crate::state::AppState;
use futures_util::future::join_all;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerHealth {
  Starting,
  Running,
  Reconnecting,
  Stopped,
}

pub struct SettlementConsumer {
  state: AppState,
  worker: usize,
  shutdown: CancellationToken,
  health: watch::Sender<ConsumerHealth>,
  backoff: Backoff,
}

impl SettlementConsumer {
  pub fn new(state: AppState, worker: usize, shutdown: CancellationToken) -> (Self, watch::Receiver<ConsumerHealth>) {
    let (health, health_rx) = watch::channel(ConsumerHealth::Starting);
    let backoff = Backoff::new(state.config.consumer_retry_base, state.config.consumer_retry_max);
    (
      Self {
        state,
        worker,
        shutdown,
        health,
        backoff,
      },
      health_rx,
    )
  }

  fn set_health(&self, health: ConsumerHealth) {
    let previous = self.health.send_replace(health);
    if previous != health {
      info!(worker = self.worker, ?health, "Settlement consumer state changed.");
    }
  }

  /// Sleeps for `delay` unless shutdown comes first. Returns `false` on shutdown.
  async fn pause(&self, delay: Duration) -> bool {
    tokio::select! {
      _ = self.shutdown.cancelled() => false,
      _ = tokio::time::sleep(delay) => true,
    }
  }

  pub async fn run(self) {
    let topic = self.state.config.settlement_result_topic.clone();
    let mut reconnects: u32 = 0;

    'supervise: while !self.shutdown.is_cancelled() {
      let subscribed = tokio::select! {
        _ = self.shutdown.cancelled() => break 'supervise,
        subscribed = self.state.bus.subscribe(&topic) => subscribed,
      };
      let mut subscription = match subscribed {
        Ok(subscription) => subscription,
        Err(e) => {
          reconnects += 1;
          self.set_health(ConsumerHealth::Reconnecting);
          warn!(worker = self.worker, error = %e, attempt = reconnects, "Subscribe failed.");
          if !self.pause(self.backoff.delay(reconnects)).await {
            break 'supervise;
          }
          continue;
        }
      };

      reconnects = 0;
      self.set_health(ConsumerHealth::Running);

      loop {
        let next = tokio::select! {
          _ = self.shutdown.cancelled() => break 'supervise,
          next = subscription.next() => next,
        };
        match next {
          Ok(Some(delivery)) => self.handle(subscription.as_mut(), delivery).await,
          Ok(None) => {
            warn!(worker = self.worker, "Subscription disconnected.");
            break;
          }
          Err(e) => {
            warn!(worker = self.worker, error = %e, "Subscription failed.");
            break;
          }
        }
      }

      reconnects += 1;
      self.set_health(ConsumerHealth::Reconnecting);
      if !self.pause(self.backoff.delay(reconnects)).await {
        break 'supervise;
      }
    }

    self.set_health(ConsumerHealth::Stopped);
  }

  #[instrument(
    name = "consumer::handle",
    skip(self, subscription, delivery),
    fields(worker = self.worker, delivery_id = delivery.id, attempt = delivery.attempt)
  )]
  async fn handle(&self, subscription: &mut dyn Subscription, delivery: Delivery) {
    let result: SettlementResult = match serde_json::from_slice(&delivery.payload) {
      Ok(result) => result,
      Err(e) => {
        warn!(error = %e, "Malformed settlement result; dead-lettering.");
        if let Err(bus_err) = subscription.dead_letter(&delivery, &e.to_string()).await {
          let delay = self.backoff.delay(delivery.attempt);
          error!(error = %bus_err, retry_in_ms = delay.as_millis() as u64, "Dead-lettering failed.");
          self.nack_after(subscription, &delivery, delay).await;
          return;
        }
        if let Err(bus_err) = subscription.ack(&delivery).await {
          warn!(error = %bus_err, "Ack of dead-lettered delivery failed.");
        }
        return;
      }
    };

    match apply_settlement_result(&self.state, result).await {
      Ok(disposition) => {
        debug!(?disposition, "Settlement result handled.");
        if let Err(e) = subscription.ack(&delivery).await {
          warn!(error = %e, "Ack failed; the result will be redelivered and replayed.");
        }
      }
      Err(e) => {
        let delay = self.backoff.delay(delivery.attempt);
        error!(error = %e, retry_in_ms = delay.as_millis() as u64, "Settlement result not applied.");
        self.nack_after(subscription, &delivery, delay).await;
      }
    }
  }

  async fn nack_after(&self, subscription: &mut dyn Subscription, delivery: &Delivery, delay: Duration) {
    // On shutdown the nack still goes out so another worker can pick it up.
    self.pause(delay).await;
    if let Err(bus_err) = subscription.nack(delivery).await {
      warn!(error = %bus_err, "Nack failed; the delivery returns when its lease lapses.");
    }
  }
}

/// Running consumer workers.
pub struct ConsumerHandle {
  shutdown: CancellationToken,
  health: Vec<watch::Receiver<ConsumerHealth>>,
  workers: Vec<JoinHandle<()>>,
}

impl ConsumerHandle {
  /// Starts `state.config.consumer_workers` workers on the current runtime.
  pub fn spawn(state: &AppState, shutdown: CancellationToken) -> Self {
    let count = state.config.consumer_workers.max(1);
    let mut health = Vec::with_capacity(count);
    let mut workers = Vec::with_capacity(count);
    for worker in 0..count {
      let (consumer, health_rx) = SettlementConsumer::new(state.clone(), worker, shutdown.child_token());
      health.push(health_rx);
      let span = tracing::info_span!("settlement_consumer", worker);
      workers.push(tokio::spawn(consumer.run().instrument(span)));
    }
    info!(workers = count, "Settlement consumers started.");
    Self {
      shutdown,
      health,
      workers,
    }
  }

  pub fn monitor(&self) -> ConsumerMonitor {
    ConsumerMonitor {
      health: self.health.clone(),
    }
  }

  /// Cancels every worker and waits for them to stop.
  pub async fn shutdown(self) {
    self.shutdown.cancel();
    for joined in join_all(self.workers).await {
      if let Err(e) = joined {
        error!(error = %e, "Settlement consumer task ended abnormally.");
      }
    }
    info!("Settlement consumers stopped.");
  }
}

/// Read side of the workers' health, cheap to clone into request handlers.
#[derive(Clone, Default)]
pub struct ConsumerMonitor {
  health: Vec<watch::Receiver<ConsumerHealth>>,
}

impl ConsumerMonitor {
  pub fn snapshot(&self) -> Vec<ConsumerHealth> {
    self.health.iter().map(|rx| *rx.borrow()).collect()
  }

  /// Healthy when at least one worker is consuming.
  pub fn is_healthy(&self) -> bool {
    self.snapshot().contains(&ConsumerHealth::Running)
  }
}
