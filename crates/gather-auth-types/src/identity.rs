//! Gateway-injected identity headers extractor.

use axum::extract::FromRequestParts;
use http::StatusCode;
use http::request::Parts;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-gather-user-id";
pub const USER_ROLE_HEADER: &str = "x-gather-user-role";

/// User identity injected by the gateway via `x-gather-user-id` and `x-gather-user-role` headers.
///
/// Returns 401 if `x-gather-user-id` is absent or cannot be parsed as UUID.
/// Role enforcement (403) is done by handlers after extraction.
#[derive(Debug, Clone)]
pub struct IdentityHeaders {
    pub user_id: Uuid,
    pub user_role: u8,
}

impl<S> FromRequestParts<S> for IdentityHeaders
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    // axum-core 0.5 defines this as `fn -> impl Future + Send` (not `async fn`).
    // Extract values synchronously, return a 'static async move block.
    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<Uuid>().ok());

        // The gateway omits the role for plain members.
        let user_role = match parts.headers.get(USER_ROLE_HEADER) {
            None => Some(0),
            Some(v) => v.to_str().ok().and_then(|s| s.parse::<u8>().ok()),
        };

        async move {
            let user_id = user_id.ok_or(StatusCode::UNAUTHORIZED)?;
            let user_role = user_role.ok_or(StatusCode::UNAUTHORIZED)?;
            Ok(Self { user_id, user_role })
        }
    }
}
