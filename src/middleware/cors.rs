//! CORS policy for browser clients.
//!
//! Note:
//! - CORS is enforced by browsers. Server-to-server calls are not restricted by it.
//! - Preflight `OPTIONS` requests carry no token. They are answered here, and the
//!   gate lets `OPTIONS` through unless `validateOptions` is set.
//!
//! Policy:
//! - Development: permissive (Allow-Origin: *), WITHOUT credentials.
//! - Production: allowlist origins from Config (comma-separated env var), WITHOUT credentials.

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::{AppEnv, Config};

/// Apply CORS policy to the given Router.
///
/// IMPORTANT:
/// - Do not combine wildcard origin (`Any`) with `allow_credentials(true)`.
pub fn apply(router: Router, config: &Config) -> Router {
    router.layer(layer(config.app_env, &config.cors_allowed_origins))
}

pub fn layer(app_env: AppEnv, allowed_origins: &[String]) -> CorsLayer {
    let cors = if app_env.is_production() {
        // An empty allowlist allows no origin at all.
        let allowed: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();

        let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _req| {
            allowed.iter().any(|v| v == origin)
        });

        CorsLayer::new().allow_origin(allow_origin)
    } else {
        CorsLayer::new().allow_origin(Any)
    };

    cors.allow_methods([
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ])
    .allow_headers([
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        HeaderName::from_static("x-request-id"),
    ])
    .expose_headers([header::WWW_AUTHENTICATE])
    .max_age(std::time::Duration::from_secs(60 * 10))
}
