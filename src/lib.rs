/*
 * Responsibility
 * - IDCS access-token gate: bootstrap against the IDP, compile the path -> scope policy,
 *   decide allow/deny per request
 * - The binary (main.rs) hosts the gate in front of a small axum API
 */
pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;

pub use services::auth::{
    AuthorizationOutcome, ClaimSet, Gate, GateConfig, GateSettings, Readiness, initialize,
};
