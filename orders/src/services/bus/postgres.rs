// marketplace_orders/src/services/bus/postgres.rs

//! Bus backed by the `saga_messages` table.
//!
//! A row is `ready`, `leased` (claimed by a subscriber until `lease_until`),
//! `done` or `dead`. A lapsed lease makes the row claimable again, which is
//! how deliveries held by a crashed worker come back.

use super::{BusError, Delivery, MessageBus, Subscription};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct PgBus {
  pool: PgPool,
  poll_interval: Duration,
  lease: Duration,
}

#[derive(FromRow)]
struct ClaimedRow {
  id: i64,
  topic: String,
  payload: Vec<u8>,
  attempts: i32,
}

impl PgBus {
  pub fn new(pool: PgPool, poll_interval: Duration, lease: Duration) -> Self {
    Self {
      pool,
      poll_interval,
      lease,
    }
  }

  async fn claim(&self, topic: &str) -> Result<Option<Delivery>, BusError> {
    let row = sqlx::query_as::<_, ClaimedRow>(
      r#"
      UPDATE saga_messages
      SET status = 'leased',
          attempts = attempts + 1,
          lease_until = now() + make_interval(secs => $2),
          updated_at = now()
      WHERE id = (
        SELECT id FROM saga_messages
        WHERE topic = $1
          AND (status = 'ready' OR (status = 'leased' AND lease_until < now()))
        ORDER BY id
        FOR UPDATE SKIP LOCKED
        LIMIT 1
      )
      RETURNING id, topic, payload, attempts
      "#,
    )
    .bind(topic)
    .bind(self.lease.as_secs_f64())
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(|r| Delivery {
      id: r.id,
      topic: r.topic,
      payload: r.payload,
      attempt: r.attempts.max(1) as u32,
    }))
  }
}

#[async_trait]
impl MessageBus for PgBus {
  #[instrument(name = "PgBus::publish", skip(self, payload), fields(bytes = payload.len()), err)]
  async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
    sqlx::query("INSERT INTO saga_messages (topic, payload) VALUES ($1, $2)")
      .bind(topic)
      .bind(payload)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, BusError> {
    // Surface a dead pool here rather than on the first poll.
    sqlx::query("SELECT 1").execute(&self.pool).await?;
    debug!(%topic, "Postgres bus subscription opened.");
    Ok(Box::new(PgSubscription {
      bus: self.clone(),
      topic: topic.to_string(),
    }))
  }
}

struct PgSubscription {
  bus: PgBus,
  topic: String,
}

impl PgSubscription {
  async fn set_status(&self, delivery: &Delivery, sql: &str, reason: Option<&str>) -> Result<(), BusError> {
    let mut query = sqlx::query(sql).bind(delivery.id);
    if let Some(reason) = reason {
      query = query.bind(reason);
    }
    let done = query.execute(&self.bus.pool).await?;
    if done.rows_affected() == 0 {
      return Err(BusError::UnknownDelivery(delivery.id));
    }
    Ok(())
  }
}

#[async_trait]
impl Subscription for PgSubscription {
  async fn next(&mut self) -> Result<Option<Delivery>, BusError> {
    loop {
      if let Some(delivery) = self.bus.claim(&self.topic).await? {
        return Ok(Some(delivery));
      }
      tokio::time::sleep(self.bus.poll_interval).await;
    }
  }

  async fn ack(&mut self, delivery: &Delivery) -> Result<(), BusError> {
    // A dead-lettered row stays dead; only the lease is released.
    self
      .set_status(
        delivery,
        "UPDATE saga_messages SET status = CASE WHEN status = 'dead' THEN 'dead' ELSE 'done' END, \
         lease_until = NULL, updated_at = now() WHERE id = $1 AND status IN ('leased', 'dead')",
        None,
      )
      .await
  }

  async fn nack(&mut self, delivery: &Delivery) -> Result<(), BusError> {
    self
      .set_status(
        delivery,
        "UPDATE saga_messages SET status = 'ready', lease_until = NULL, updated_at = now() \
         WHERE id = $1 AND status = 'leased'",
        None,
      )
      .await
  }

  async fn dead_letter(&mut self, delivery: &Delivery, reason: &str) -> Result<(), BusError> {
    self
      .set_status(
        delivery,
        "UPDATE saga_messages SET status = 'dead', dead_reason = $2, updated_at = now() \
         WHERE id = $1 AND status = 'leased'",
        Some(reason),
      )
      .await
  }
}
