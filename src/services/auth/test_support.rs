//! Fixtures shared by the auth tests: an RSA key pair with its certificate
//! (standing in for the IDP's signing key) and a second, unrelated key.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use super::signing_key::{JwkSet, SigningKey};

pub const IDP_KID: &str = "SIGNING_KEY";
pub const IDP_PRIVATE_KEY_PEM: &str = include_str!("testdata/idp-key.pem");
pub const IDP_CERT_PEM: &str = include_str!("testdata/idp-cert.pem");
pub const OTHER_PRIVATE_KEY_PEM: &str = include_str!("testdata/other-key.pem");
const IDP_X5C: &str = include_str!("testdata/idp-x5c.txt");
const IDP_MODULUS: &str = include_str!("testdata/idp-modulus.txt");

pub fn idp_x5c() -> String {
    IDP_X5C.trim().to_string()
}

pub fn idp_modulus() -> String {
    IDP_MODULUS.trim().to_string()
}

/// The IDP signing key as it appears in the published key set.
pub fn idp_jwk() -> Value {
    json!({
        "kty": "RSA",
        "alg": "RS256",
        "kid": IDP_KID,
        "use": "sig",
        "key_ops": ["verify"],
        "x5c": [idp_x5c()],
        "n": idp_modulus(),
        "e": "AQAB"
    })
}

pub fn idp_jwks() -> Value {
    json!({ "keys": [idp_jwk()] })
}

pub fn signing_key() -> SigningKey {
    let set: JwkSet = serde_json::from_value(idp_jwks()).expect("fixture jwks");
    SigningKey::select(&set).expect("fixture key")
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims shaped like an IDCS access token, expiring `ttl_seconds` from now
/// (negative for an already expired token).
pub fn claims(scope: &str, ttl_seconds: i64) -> Value {
    let now = now();
    json!({
        "sub": "alice@example.com",
        "iss": "https://identity.oraclecloud.com/",
        "aud": ["https://api.example.com/"],
        "client_id": "web-app",
        "iat": now,
        "exp": now + ttl_seconds,
        "scope": scope
    })
}

/// Signs with the IDP key, RS256.
pub fn sign(claims: &Value) -> String {
    let key = EncodingKey::from_rsa_pem(IDP_PRIVATE_KEY_PEM.as_bytes()).expect("fixture key");
    sign_with(Algorithm::RS256, &key, claims)
}

pub fn sign_with(alg: Algorithm, key: &EncodingKey, claims: &Value) -> String {
    jsonwebtoken::encode(&Header::new(alg), claims, key).expect("sign fixture token")
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Canned responses for [`FakeIdp`].
#[derive(Clone, Debug)]
pub struct IdpBehavior {
    pub token: (StatusCode, Value),
    pub jwks: (StatusCode, String),
    pub jwks_delay: Duration,
}

impl Default for IdpBehavior {
    fn default() -> Self {
        Self {
            token: (
                StatusCode::OK,
                json!({ "access_token": "idp-bearer", "token_type": "Bearer", "expires_in": 3600 }),
            ),
            jwks: (StatusCode::OK, idp_jwks().to_string()),
            jwks_delay: Duration::ZERO,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SeenRequest {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

struct FakeIdpState {
    behavior: IdpBehavior,
    seen: Mutex<Vec<SeenRequest>>,
}

/// An IDP stand-in serving the default token and JWK endpoints on a local port.
pub struct FakeIdp {
    pub base_url: String,
    state: Arc<FakeIdpState>,
}

impl FakeIdp {
    pub async fn start(behavior: IdpBehavior) -> Self {
        let state = Arc::new(FakeIdpState {
            behavior,
            seen: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .fallback(fake_idp_handler)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake idp");
        let addr = listener.local_addr().expect("fake idp addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.state.seen.lock().expect("seen lock").clone()
    }
}

async fn fake_idp_handler(
    State(state): State<Arc<FakeIdpState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let get = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    state.seen.lock().expect("seen lock").push(SeenRequest {
        method,
        path: uri.path().to_string(),
        authorization: get(header::AUTHORIZATION),
        content_type: get(header::CONTENT_TYPE),
        body,
    });

    match uri.path() {
        "/oauth2/v1/token" => {
            let (status, body) = state.behavior.token.clone();
            (status, Json(body)).into_response()
        }
        "/admin/v1/SigningCert/jwk" => {
            tokio::time::sleep(state.behavior.jwks_delay).await;
            let (status, body) = state.behavior.jwks.clone();
            (status, body).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
