/*!
 * Authentication context extractor
 *
 * Responsibility:
 * - Hands the verified request context (AuthCtx) to handlers
 * - axum wiring lives in core, the type itself in types
 *
 * Public API:
 * - AuthCtx
 * - AuthCtxExtractor
 */

mod core;
mod types;

pub use core::AuthCtxExtractor;
pub use types::AuthCtx;
