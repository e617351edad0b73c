// marketplace_orders/src/services/bus/memory.rs

//! Process-local bus. Competing consumers per topic, redelivery on nack, and
//! knobs for tests: publish and dead-letter faults, forced disconnects, history
//! and dead letter inspection.
//!
//! Nothing here is persisted. Each topic queue is bounded; once a topic with no
//! consumer reaches the limit its oldest messages are dropped.

use super::{BusError, Delivery, MessageBus, Subscription};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct Envelope {
  id: i64,
  topic: String,
  payload: Vec<u8>,
  attempt: u32,
}

#[derive(Debug, Clone)]
pub struct DeadLetter {
  pub topic: String,
  pub payload: Vec<u8>,
  pub reason: String,
}

pub const DEFAULT_QUEUE_LIMIT: usize = 10_000;

struct Inner {
  next_id: i64,
  ready: HashMap<String, VecDeque<Envelope>>,
  in_flight: HashMap<i64, Envelope>,
  /// `None` unless built with `recording`.
  history: Option<Vec<(String, Vec<u8>)>>,
  dead: Vec<DeadLetter>,
  queue_limit: usize,
  failing_publishes: usize,
  failing_dead_letters: usize,
  generation: u64,
}

struct Shared {
  inner: Mutex<Inner>,
  notify: Notify,
}

#[derive(Clone)]
pub struct MemoryBus {
  shared: Arc<Shared>,
}

impl Default for MemoryBus {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryBus {
  pub fn new() -> Self {
    Self::build(None, DEFAULT_QUEUE_LIMIT)
  }

  /// A bus that also keeps every accepted message for `published`.
  pub fn recording() -> Self {
    Self::build(Some(Vec::new()), DEFAULT_QUEUE_LIMIT)
  }

  pub fn with_queue_limit(self, limit: usize) -> Self {
    self.shared.inner.lock().queue_limit = limit.max(1);
    self
  }

  fn build(history: Option<Vec<(String, Vec<u8>)>>, queue_limit: usize) -> Self {
    let inner = Inner {
      next_id: 0,
      ready: HashMap::new(),
      in_flight: HashMap::new(),
      history,
      dead: Vec::new(),
      queue_limit,
      failing_publishes: 0,
      failing_dead_letters: 0,
      generation: 0,
    };
    Self {
      shared: Arc::new(Shared {
        inner: Mutex::new(inner),
        notify: Notify::new(),
      }),
    }
  }

  /// The next `count` publishes fail with `PublishRejected`.
  pub fn fail_next_publishes(&self, count: usize) {
    self.shared.inner.lock().failing_publishes = count;
  }

  /// The next `count` dead-letter calls fail with `Disconnected`.
  pub fn fail_next_dead_letters(&self, count: usize) {
    self.shared.inner.lock().failing_dead_letters = count;
  }

  /// Drops every live subscription. Unsettled deliveries go back to the queue.
  pub fn disconnect_all(&self) {
    {
      let mut inner = self.shared.inner.lock();
      inner.generation += 1;
      let requeued: Vec<Envelope> = inner.in_flight.drain().map(|(_, env)| env).collect();
      for env in requeued {
        inner.ready.entry(env.topic.clone()).or_default().push_front(env);
      }
    }
    self.shared.notify.notify_waiters();
  }

  /// Everything accepted on `topic`, in publish order. Always empty unless
  /// the bus was built with `recording`.
  pub fn published(&self, topic: &str) -> Vec<Vec<u8>> {
    let inner = self.shared.inner.lock();
    let Some(history) = &inner.history else { return Vec::new() };
    history
      .iter()
      .filter(|(t, _)| t == topic)
      .map(|(_, payload)| payload.clone())
      .collect()
  }

  /// `published`, decoded. Payloads that do not decode as `T` are skipped.
  pub fn published_json<T: DeserializeOwned>(&self, topic: &str) -> Vec<T> {
    self
      .published(topic)
      .iter()
      .filter_map(|payload| serde_json::from_slice(payload).ok())
      .collect()
  }

  pub fn dead_letters(&self) -> Vec<DeadLetter> {
    self.shared.inner.lock().dead.clone()
  }

  /// Messages on `topic` that are queued or delivered but not yet settled.
  pub fn unsettled(&self, topic: &str) -> usize {
    let inner = self.shared.inner.lock();
    let queued = inner.ready.get(topic).map_or(0, VecDeque::len);
    let in_flight = inner.in_flight.values().filter(|env| env.topic == topic).count();
    queued + in_flight
  }

  fn settle(&self, generation: u64, delivery: &Delivery) -> Result<Envelope, BusError> {
    let mut inner = self.shared.inner.lock();
    if inner.generation != generation {
      return Err(BusError::Disconnected);
    }
    inner
      .in_flight
      .remove(&delivery.id)
      .ok_or(BusError::UnknownDelivery(delivery.id))
  }
}

#[async_trait]
impl MessageBus for MemoryBus {
  async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
    {
      let mut inner = self.shared.inner.lock();
      if inner.failing_publishes > 0 {
        inner.failing_publishes -= 1;
        warn!(%topic, "Injected publish failure.");
        return Err(BusError::PublishRejected {
          topic: topic.to_string(),
          reason: "injected fault".to_string(),
        });
      }
      inner.next_id += 1;
      let env = Envelope {
        id: inner.next_id,
        topic: topic.to_string(),
        payload: payload.clone(),
        attempt: 0,
      };
      if let Some(history) = inner.history.as_mut() {
        history.push((topic.to_string(), payload));
      }
      let limit = inner.queue_limit;
      let queue = inner.ready.entry(topic.to_string()).or_default();
      if queue.len() >= limit {
        if let Some(dropped) = queue.pop_front() {
          warn!(%topic, message_id = dropped.id, limit, "Topic queue full; dropping its oldest message.");
        }
      }
      queue.push_back(env);
    }
    self.shared.notify.notify_waiters();
    Ok(())
  }

  async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, BusError> {
    let generation = self.shared.inner.lock().generation;
    debug!(%topic, generation, "Memory bus subscription opened.");
    Ok(Box::new(MemorySubscription {
      bus: self.clone(),
      topic: topic.to_string(),
      generation,
    }))
  }
}

struct MemorySubscription {
  bus: MemoryBus,
  topic: String,
  generation: u64,
}

#[async_trait]
impl Subscription for MemorySubscription {
  async fn next(&mut self) -> Result<Option<Delivery>, BusError> {
    loop {
      let notified = self.bus.shared.notify.notified();
      tokio::pin!(notified);
      // Register before checking so a publish between the check and the await
      // still wakes us.
      notified.as_mut().enable();

      {
        let mut inner = self.bus.shared.inner.lock();
        if inner.generation != self.generation {
          return Ok(None);
        }
        if let Some(mut env) = inner.ready.get_mut(&self.topic).and_then(VecDeque::pop_front) {
          env.attempt += 1;
          let delivery = Delivery {
            id: env.id,
            topic: env.topic.clone(),
            payload: env.payload.clone(),
            attempt: env.attempt,
          };
          inner.in_flight.insert(env.id, env);
          return Ok(Some(delivery));
        }
      }

      notified.await;
    }
  }

  async fn ack(&mut self, delivery: &Delivery) -> Result<(), BusError> {
    self.bus.settle(self.generation, delivery).map(|_| ())
  }

  async fn nack(&mut self, delivery: &Delivery) -> Result<(), BusError> {
    let env = self.bus.settle(self.generation, delivery)?;
    self
      .bus
      .shared
      .inner
      .lock()
      .ready
      .entry(env.topic.clone())
      .or_default()
      .push_back(env);
    self.bus.shared.notify.notify_waiters();
    Ok(())
  }

  /// Records the delivery as dead. It stays in flight until acked.
  async fn dead_letter(&mut self, delivery: &Delivery, reason: &str) -> Result<(), BusError> {
    let mut inner = self.bus.shared.inner.lock();
    if !inner.in_flight.contains_key(&delivery.id) {
      return Err(BusError::UnknownDelivery(delivery.id));
    }
    if inner.failing_dead_letters > 0 {
      inner.failing_dead_letters -= 1;
      warn!(topic = %delivery.topic, "Injected dead-letter failure.");
      return Err(BusError::Disconnected);
    }
    inner.dead.push(DeadLetter {
      topic: delivery.topic.clone(),
      payload: delivery.payload.clone(),
      reason: reason.to_string(),
    });
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn nack_redelivers_with_higher_attempt() {
    let bus = MemoryBus::new();
    let mut sub = bus.subscribe("t").await.unwrap();
    bus.publish("t", b"one".to_vec()).await.unwrap();

    let first = sub.next().await.unwrap().unwrap();
    assert_eq!(first.attempt, 1);
    sub.nack(&first).await.unwrap();

    let second = sub.next().await.unwrap().unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.attempt, 2);
    sub.ack(&second).await.unwrap();
    assert_eq!(bus.unsettled("t"), 0);
  }

  #[tokio::test]
  async fn competing_subscribers_share_a_topic() {
    let bus = MemoryBus::new();
    let mut a = bus.subscribe("t").await.unwrap();
    let mut b = bus.subscribe("t").await.unwrap();
    bus.publish("t", b"1".to_vec()).await.unwrap();
    bus.publish("t", b"2".to_vec()).await.unwrap();

    let da = a.next().await.unwrap().unwrap();
    let db = b.next().await.unwrap().unwrap();
    assert_ne!(da.id, db.id);
    assert_eq!(bus.unsettled("t"), 2);
  }

  #[tokio::test]
  async fn waiting_subscriber_wakes_on_publish() {
    let bus = MemoryBus::new();
    let mut sub = bus.subscribe("t").await.unwrap();
    let publisher = bus.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      publisher.publish("t", b"late".to_vec()).await.unwrap();
    });
    let delivery = tokio::time::timeout(Duration::from_secs(2), sub.next())
      .await
      .expect("subscriber never woke")
      .unwrap()
      .unwrap();
    assert_eq!(delivery.payload, b"late".to_vec());
  }

  #[tokio::test]
  async fn disconnect_ends_subscription_and_requeues() {
    let bus = MemoryBus::new();
    let mut sub = bus.subscribe("t").await.unwrap();
    bus.publish("t", b"x".to_vec()).await.unwrap();
    let delivery = sub.next().await.unwrap().unwrap();

    bus.disconnect_all();
    assert!(sub.next().await.unwrap().is_none());
    assert!(matches!(sub.ack(&delivery).await, Err(BusError::Disconnected)));

    let mut fresh = bus.subscribe("t").await.unwrap();
    let again = fresh.next().await.unwrap().unwrap();
    assert_eq!(again.id, delivery.id);
    assert_eq!(again.attempt, 2);
  }

  #[tokio::test]
  async fn injected_faults_reject_publishes() {
    let bus = MemoryBus::recording();
    bus.fail_next_publishes(1);
    assert!(bus.publish("t", b"x".to_vec()).await.is_err());
    assert!(bus.publish("t", b"y".to_vec()).await.is_ok());
    assert_eq!(bus.published("t"), vec![b"y".to_vec()]);
  }

  #[tokio::test]
  async fn plain_bus_keeps_no_history() {
    let bus = MemoryBus::new();
    bus.publish("t", b"x".to_vec()).await.unwrap();
    assert!(bus.published("t").is_empty());
    assert_eq!(bus.unsettled("t"), 1);
  }

  #[tokio::test]
  async fn full_topic_drops_its_oldest_message() {
    let bus = MemoryBus::new().with_queue_limit(2);
    for payload in [b"1", b"2", b"3"] {
      bus.publish("t", payload.to_vec()).await.unwrap();
    }
    assert_eq!(bus.unsettled("t"), 2);

    let mut sub = bus.subscribe("t").await.unwrap();
    let first = sub.next().await.unwrap().unwrap();
    assert_eq!(first.payload, b"2".to_vec());
  }

  #[tokio::test]
  async fn injected_dead_letter_fault_leaves_delivery_in_flight() {
    let bus = MemoryBus::new();
    bus.fail_next_dead_letters(1);
    let mut sub = bus.subscribe("t").await.unwrap();
    bus.publish("t", b"bad".to_vec()).await.unwrap();
    let delivery = sub.next().await.unwrap().unwrap();

    assert!(matches!(sub.dead_letter(&delivery, "bad").await, Err(BusError::Disconnected)));
    assert!(bus.dead_letters().is_empty());
    sub.dead_letter(&delivery, "bad").await.unwrap();
    sub.ack(&delivery).await.unwrap();
    assert_eq!(bus.dead_letters().len(), 1);
    assert_eq!(bus.unsettled("t"), 0);
  }
}
