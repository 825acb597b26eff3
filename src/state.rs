/*
 * Responsibility
 * - Shared context bound to the Router (AppState)
 * - Clone is cheap (Arc inside)
 */
use std::sync::Arc;

use crate::services::auth::Gate;

#[derive(Clone, Debug)]
pub struct AppState {
    pub gate: Arc<Gate>,
}

impl AppState {
    pub fn new(gate: Arc<Gate>) -> Self {
        Self { gate }
    }
}
