/*
 * Responsibility
 * - v1 URL layout; everything here sits behind the gate (see app.rs)
 */
use axum::{Router, routing::get};

use crate::api::v1::handlers::claims::{get_user, me};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .route("/users/{user_id}", get(get_user))
}
