//! Outbound calls to the identity provider: the client-credentials token
//! request and the JWK set fetch. Only bootstrap uses these.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::Deserialize;
use tracing::{debug, warn};

use super::bootstrap::BootstrapError;
use super::config::{ClientCredentials, GateConfig, RequestAgentOptions};
use super::signing_key::JwkSet;

/// Form body of the client-credentials grant. `__myscopes__` asks for every
/// scope granted to this client.
pub const TOKEN_REQUEST_BODY: &str = "grant_type=client_credentials&scope=urn:opc:idm:__myscopes__";

#[async_trait]
pub trait IdpClient: Send + Sync {
    /// Client-credentials grant. Returns the non-empty `access_token`.
    async fn fetch_bearer_token(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<String, BootstrapError>;

    /// Fetches the signing key set, authenticating with `bearer` when given.
    async fn fetch_jwks(&self, bearer: Option<&str>) -> Result<JwkSet, BootstrapError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpIdpClient {
    client: Client,
    token_endpoint: String,
    jwk_endpoint: String,
}

impl HttpIdpClient {
    pub fn new(config: &GateConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(&config.request_agent)?,
            token_endpoint: config.token_endpoint.clone(),
            jwk_endpoint: config.jwk_endpoint.clone(),
        })
    }
}

fn build_client(agent: &RequestAgentOptions) -> Result<Client, reqwest::Error> {
    let user_agent = agent
        .user_agent
        .clone()
        .unwrap_or_else(|| concat!("idcs-gate/", env!("CARGO_PKG_VERSION")).to_string());

    let mut builder = Client::builder().user_agent(user_agent);

    // 0 disables the bound
    if agent.timeout_seconds > 0 {
        builder = builder.timeout(Duration::from_secs(agent.timeout_seconds));
    }
    if !agent.reject_unauthorized {
        warn!("IDP certificate validation is disabled (requestAgent.rejectUnauthorized = false)");
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(ca) = &agent.ca {
        builder = builder.add_root_certificate(reqwest::Certificate::from_pem(ca.as_bytes())?);
    }
    if let Some(proxy) = &agent.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }

    builder.build()
}

#[async_trait]
impl IdpClient for HttpIdpClient {
    async fn fetch_bearer_token(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<String, BootstrapError> {
        debug!(endpoint = %self.token_endpoint, client_id = %credentials.client_id, "requesting bearer token");

        let response = self
            .client
            .post(&self.token_endpoint)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(TOKEN_REQUEST_BODY)
            .send()
            .await
            .map_err(BootstrapError::TokenRequest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(BootstrapError::TokenStatus(status));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(BootstrapError::TokenRequest)?;

        body.access_token
            .filter(|token| !token.is_empty())
            .ok_or(BootstrapError::MissingAccessToken)
    }

    async fn fetch_jwks(&self, bearer: Option<&str>) -> Result<JwkSet, BootstrapError> {
        debug!(endpoint = %self.jwk_endpoint, authenticated = bearer.is_some(), "requesting signing keys");

        let mut request = self.client.get(&self.jwk_endpoint);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(BootstrapError::JwksRequest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(BootstrapError::JwksStatus(status));
        }

        response.json().await.map_err(BootstrapError::JwksRequest)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::json;

    use super::*;
    use crate::services::auth::config::GateSettings;
    use crate::services::auth::test_support::{self, FakeIdp, IdpBehavior};

    fn client_for(base_url: &str, timeout_seconds: u64) -> HttpIdpClient {
        let mut settings = GateSettings {
            idcs_url: base_url.to_string(),
            ..Default::default()
        };
        settings.request_agent.timeout_seconds = timeout_seconds;
        HttpIdpClient::new(&GateConfig::new(settings).unwrap()).unwrap()
    }

    fn credentials() -> ClientCredentials {
        ClientCredentials {
            client_id: "svc".into(),
            client_secret: "s3cret".into(),
        }
    }

    #[tokio::test]
    async fn token_request_uses_basic_auth_and_client_credentials_grant() {
        let idp = FakeIdp::start(IdpBehavior::default()).await;
        let client = client_for(&idp.base_url, 5);

        let token = client.fetch_bearer_token(&credentials()).await.unwrap();
        assert_eq!(token, "idp-bearer");

        let seen = idp.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[0].path, "/oauth2/v1/token");
        assert_eq!(
            seen[0].authorization.as_deref(),
            Some(format!("Basic {}", STANDARD.encode("svc:s3cret")).as_str())
        );
        assert_eq!(
            seen[0].content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(seen[0].body, TOKEN_REQUEST_BODY);
    }

    #[tokio::test]
    async fn token_response_without_access_token_fails() {
        for body in [json!({}), json!({ "access_token": "" }), json!({ "error": "invalid_client" })] {
            let idp = FakeIdp::start(IdpBehavior {
                token: (StatusCode::OK, body),
                ..Default::default()
            })
            .await;

            let err = client_for(&idp.base_url, 5)
                .fetch_bearer_token(&credentials())
                .await
                .unwrap_err();
            assert!(matches!(err, BootstrapError::MissingAccessToken), "{err}");
        }
    }

    #[tokio::test]
    async fn token_endpoint_error_status_fails() {
        let idp = FakeIdp::start(IdpBehavior {
            token: (StatusCode::UNAUTHORIZED, json!({ "error": "invalid_client" })),
            ..Default::default()
        })
        .await;

        let err = client_for(&idp.base_url, 5)
            .fetch_bearer_token(&credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::TokenStatus(StatusCode::UNAUTHORIZED)));
    }

    #[tokio::test]
    async fn jwks_request_attaches_bearer_only_when_given() {
        let idp = FakeIdp::start(IdpBehavior::default()).await;
        let client = client_for(&idp.base_url, 5);

        let with = client.fetch_jwks(Some("idp-bearer")).await.unwrap();
        let without = client.fetch_jwks(None).await.unwrap();
        assert_eq!(with.keys.len(), 1);
        assert_eq!(without.keys[0].kid.as_deref(), Some(test_support::IDP_KID));

        let seen = idp.seen();
        assert_eq!(seen[0].method, Method::GET);
        assert_eq!(seen[0].path, "/admin/v1/SigningCert/jwk");
        assert_eq!(seen[0].authorization.as_deref(), Some("Bearer idp-bearer"));
        assert_eq!(seen[1].authorization, None);
    }

    #[tokio::test]
    async fn unparsable_key_set_fails() {
        let idp = FakeIdp::start(IdpBehavior {
            jwks: (StatusCode::OK, "<html>maintenance</html>".into()),
            ..Default::default()
        })
        .await;

        let err = client_for(&idp.base_url, 5).fetch_jwks(None).await.unwrap_err();
        assert!(matches!(err, BootstrapError::JwksRequest(_)));
    }

    #[tokio::test]
    async fn slow_key_set_is_bounded_by_the_timeout() {
        let idp = FakeIdp::start(IdpBehavior {
            jwks_delay: Duration::from_secs(10),
            ..Default::default()
        })
        .await;

        let started = std::time::Instant::now();
        let err = client_for(&idp.base_url, 1).fetch_jwks(None).await.unwrap_err();
        assert!(matches!(err, BootstrapError::JwksRequest(ref e) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn unreachable_idp_fails_the_token_request() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(&format!("http://{addr}"), 5)
            .fetch_bearer_token(&credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::TokenRequest(_)));
    }
}
