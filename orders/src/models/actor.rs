// marketplace_orders/src/models/actor.rs

use uuid::Uuid;

/// The caller as identified by the gateway.
///
/// `permissions` is what the gateway asserted in `X-Permissions`. It is kept for
/// logging; shop-level access is always decided against the shop record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
  pub user_id: Uuid,
  pub permissions: Vec<String>,
}

impl Actor {
  pub fn new(user_id: Uuid) -> Self {
    Self {
      user_id,
      permissions: Vec::new(),
    }
  }
}
