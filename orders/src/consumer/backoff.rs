// marketplace_orders/src/consumer/backoff.rs

use std::time::Duration;

/// Exponential backoff: `base * 2^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
  base: Duration,
  max: Duration,
}

impl Backoff {
  pub fn new(base: Duration, max: Duration) -> Self {
    Self { base, max }
  }

  /// Delay before retry number `attempt` (1-based).
  pub fn delay(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    self.base.saturating_mul(1u32 << exponent).min(self.max)
  }
}
