use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::services::auth::DenyReason;
use crate::state::AppState;

use super::AuthCtx;

/// Extractor for the `AuthCtx` the access middleware stored in extensions.
///
/// Missing means the route is not behind the gate or the request was a
/// bypassed `OPTIONS`; both are answered as an unauthenticated request.
pub struct AuthCtxExtractor(pub AuthCtx);

impl FromRequestParts<AppState> for AuthCtxExtractor
where
    AppState: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthCtx>()
            .cloned()
            .map(AuthCtxExtractor)
            .ok_or(AppError::Unauthenticated(DenyReason::NoToken))
    }
}
