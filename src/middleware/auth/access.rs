//! Applies the authorization gate to every request under a router, then hands
//! the verified claims to handlers through request extensions (`AuthCtx`).
//!
//! Paths are matched as the client sent them (`OriginalUri`), so policy entries
//! include any nesting prefix such as `/api/v1`.

use axum::{
    Router,
    body::Body,
    extract::{OriginalUri, State},
    http::{Request, header},
    middleware::{self, Next},
    response::Response,
};

use crate::api::v1::extractors::AuthCtx;
use crate::error::AppError;
use crate::services::auth::AuthorizationOutcome;
use crate::state::AppState;

/// Guard `/api/v1/*` with the gate.
///
/// ```ignore
/// let v1 = api::v1::routes();
/// let v1 = middleware::auth::access::apply(v1, state.clone());
/// app = app.nest("/api/v1", v1);
/// ```
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    router.layer(middleware::from_fn_with_state(state, access_middleware))
}

async fn access_middleware(
    State(state): State<AppState>,
    OriginalUri(original_uri): OriginalUri,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .gate
        .decide(req.method(), original_uri.path(), authorization);

    match outcome {
        AuthorizationOutcome::Allow(Some(claims)) => {
            req.extensions_mut().insert(AuthCtx::new(claims));
        }
        AuthorizationOutcome::Allow(None) => {}
        AuthorizationOutcome::DenyUnauthenticated(reason) => {
            return Err(AppError::Unauthenticated(reason));
        }
        AuthorizationOutcome::DenyForbidden(_) => {
            return Err(AppError::Forbidden(state.gate.forbidden_status()));
        }
        AuthorizationOutcome::ServiceUnavailable(_) => {
            return Err(AppError::ServiceUnavailable);
        }
    }

    Ok(next.run(req).await)
}
