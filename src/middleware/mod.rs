/*
 * Responsibility
 * - Public interface of the middleware (re-exports)
 * - auth::access (the gate), cors, http
 */
pub mod auth;
pub mod cors;
pub mod http;
