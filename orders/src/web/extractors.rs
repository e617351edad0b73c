// marketplace_orders/src/web/extractors.rs

use crate::errors::AppError;
use crate::models::Actor;
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use tracing::warn;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const PERMISSIONS_HEADER: &str = "X-Permissions";

/// The gateway authenticates callers and forwards their identity in
/// `X-User-Id` (and, informationally, `X-Permissions`).
impl FromRequest for Actor {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let user_id = req
      .headers()
      .get(USER_ID_HEADER)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| Uuid::parse_str(v.trim()).ok());

    let Some(user_id) = user_id else {
      warn!("Request without a valid {} header.", USER_ID_HEADER);
      return ready(Err(AppError::Forbidden(format!(
        "missing or invalid {} header",
        USER_ID_HEADER
      ))));
    };

    let permissions = req
      .headers()
      .get(PERMISSIONS_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(|v| {
        v.split(',')
          .map(str::trim)
          .filter(|p| !p.is_empty())
          .map(str::to_string)
          .collect()
      })
      .unwrap_or_default();

    ready(Ok(Actor { user_id, permissions }))
  }
}
