/*
 * Responsibility
 * - v1 public surface (routes() re-export, extractors, handlers)
 */
pub mod extractors;
pub mod handlers;
mod routes;

pub use routes::routes;
