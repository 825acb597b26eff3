/*
 * Responsibility
 * - GET /health (mounted outside the gate)
 * - Reports whether the gate has its signing key yet
 */
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::services::auth::Readiness;
use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.gate.readiness() {
        Readiness::Ready => (
            StatusCode::OK,
            Json(json!({"status": "ok", "auth": "ready"})),
        ),
        Readiness::Pending => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "starting", "auth": "pending"})),
        ),
        Readiness::Degraded(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "degraded", "auth": "unavailable", "reason": reason})),
        ),
    }
}
