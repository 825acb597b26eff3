/*
 * Responsibility
 * - tracing + panic hook
 * - Config load -> gate initialization (bootstrap runs in the background)
 * - Router assembly: /health outside the gate, /api/v1 behind it, HTTP + CORS layers
 * - axum::serve()
 */
use std::{panic, process};

use anyhow::Result;
use axum::{Router, routing::get};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::{self, v1::handlers::health::health};
use crate::config::Config;
use crate::middleware;
use crate::services::auth;
use crate::state::AppState;

fn init_tracing() {
    // RUST_LOG wins when set, e.g.
    // RUST_LOG=info,idcs_gate=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // Development: crash the whole process so it gets noticed.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting gate in {:?} mode on {} (config: {})",
        config.app_env,
        config.addr,
        config.gate_config_path.display()
    );

    let settings = config.gate_settings()?;
    // The bootstrap task is detached; its outcome is visible through readiness.
    let (gate, _bootstrap) = auth::initialize(Some(settings))?;

    let app = build_router(AppState::new(gate), &config);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let v1 = middleware::auth::access::apply(api::v1::routes(), state.clone());

    let router = Router::new()
        .route("/health", get(health))
        .nest("/api/v1", v1)
        .with_state(state);

    let router = middleware::http::apply(router);
    middleware::cors::apply(router, config)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode, header};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::config::{AppEnv, CredentialOverrides};
    use crate::services::auth::signing_key::SigningKeyCell;
    use crate::services::auth::test_support::{self, bearer, claims, sign};
    use crate::services::auth::{Gate, GateConfig, GateSettings};

    fn config() -> Config {
        Config {
            addr: "127.0.0.1:0".parse().unwrap(),
            app_env: AppEnv::Development,
            cors_allowed_origins: Vec::new(),
            gate_config_path: PathBuf::from("gate.json"),
            credential_overrides: CredentialOverrides::default(),
        }
    }

    fn app() -> (Router, Arc<SigningKeyCell>) {
        let settings = GateSettings::from_json(
            r#"{"idcs_url": "https://idcs.example.com",
                "scopes_by_uri": {"/api/v1/me": "profile"}}"#,
        )
        .unwrap();
        let keys = Arc::new(SigningKeyCell::new());
        let gate = Gate::new(Arc::new(GateConfig::new(settings).unwrap()), keys.clone());
        (build_router(AppState::new(Arc::new(gate)), &config()), keys)
    }

    async fn json_body(res: axum::response::Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_bootstrap_progress_without_a_token() {
        let (app, keys) = app();

        let res = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(res).await["status"], "starting");

        keys.publish(test_support::signing_key()).unwrap();
        let res = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["auth"], "ready");
    }

    #[tokio::test]
    async fn health_reports_degraded_bootstrap() {
        let (app, keys) = app();
        keys.mark_failed("token endpoint returned 401 Unauthorized");

        let res = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(res).await["status"], "degraded");
    }

    #[tokio::test]
    async fn cors_preflight_is_answered_before_the_gate() {
        let (app, keys) = app();
        keys.publish(test_support::signing_key()).unwrap();

        let res = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/v1/me")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn gated_route_works_end_to_end_with_request_id() {
        let (app, keys) = app();
        keys.publish(test_support::signing_key()).unwrap();

        let res = app
            .oneshot(
                Request::get("/api/v1/me")
                    .header(header::AUTHORIZATION, bearer(&sign(&claims("profile", 300))))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-request-id"));
        assert_eq!(json_body(res).await["sub"], "alice@example.com");
    }
}
