/*
 * Responsibility
 * - Sample protected endpoints reading the caller's verified claims
 */
use axum::{Json, extract::Path};
use serde_json::{Value, json};

use crate::api::v1::extractors::AuthCtxExtractor;
use crate::services::auth::ClaimSet;

/// GET /api/v1/me
pub async fn me(AuthCtxExtractor(ctx): AuthCtxExtractor) -> Json<ClaimSet> {
    Json(ctx.claims)
}

/// GET /api/v1/users/{user_id}
pub async fn get_user(
    Path(user_id): Path<String>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
) -> Json<Value> {
    Json(json!({
        "user_id": user_id,
        "requested_by": ctx.subject(),
        "scopes": ctx.scopes().to_string(),
    }))
}
