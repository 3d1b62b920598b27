//! Caller identity supplied by the upstream session layer.
//!
//! The relay does no authentication of its own. A proxy in front of it
//! authenticates the session and forwards the user id in [`USER_ID_HEADER`].

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use murmur_shared::UserId;

use crate::error::ServerError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller. Rejects with 401 when the header is missing or
/// is not a valid identity.
#[derive(Debug, Clone)]
pub struct CallerId(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ServerError::Unauthorized)?;

        let user = UserId::new(raw.trim()).map_err(|e| {
            tracing::debug!(error = %e, "rejected caller identity header");
            ServerError::Unauthorized
        })?;

        tracing::trace!(user = %user, "caller extracted from header");
        Ok(CallerId(user))
    }
}
