//! Gate configuration.
//!
//! `GateSettings` mirrors the JSON file operators write (field names included).
//! `GateConfig::new` is the only way to get a `GateConfig`: it applies defaults
//! and validates once, and the result is never mutated afterwards.
use std::fmt;
use std::path::Path;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use url::Url;

use super::route_policy::RoutePolicy;
use crate::config::ConfigError;

pub const DEFAULT_JWK_URL: &str = "/admin/v1/SigningCert/jwk";
pub const DEFAULT_TOKEN_URL: &str = "/oauth2/v1/token";
pub const DEFAULT_IDP_TIMEOUT_SECONDS: u64 = 30;

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    pub idcs_url: String,
    pub jwk_url: Option<String>,
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub audience: Option<String>,
    /// Path template -> space-delimited scopes, in file order.
    #[serde(deserialize_with = "ordered_scope_map")]
    pub scopes_by_uri: Vec<(String, String)>,
    pub regex_uris: Vec<RegexUri>,
    pub default_scopes: Option<String>,
    /// When false (the default) `OPTIONS` requests skip validation so CORS
    /// preflights, which carry no token, get through.
    #[serde(rename = "validateOptions")]
    pub validate_options: bool,
    #[serde(rename = "requestAgent")]
    pub request_agent: RequestAgentOptions,
    pub clock_skew_seconds: u64,
    pub forbidden_status: ForbiddenStatus,
}

impl fmt::Debug for GateSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print the client secret
        f.debug_struct("GateSettings")
            .field("idcs_url", &self.idcs_url)
            .field("jwk_url", &self.jwk_url)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("audience", &self.audience)
            .field("scopes_by_uri", &self.scopes_by_uri)
            .field("regex_uris", &self.regex_uris)
            .field("default_scopes", &self.default_scopes)
            .field("validate_options", &self.validate_options)
            .finish_non_exhaustive()
    }
}

impl GateSettings {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_json(&raw).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// A precompiled pattern entry. The pattern is used verbatim (not anchored).
#[derive(Debug, Clone, Deserialize)]
pub struct RegexUri {
    #[serde(alias = "regex")]
    pub pattern: String,
    #[serde(default)]
    pub scopes: String,
}

/// Outbound connection options for IDP calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequestAgentOptions {
    /// false accepts invalid IDP certificates. Development only.
    #[serde(rename = "rejectUnauthorized")]
    pub reject_unauthorized: bool,
    /// Extra PEM root certificate trusted for the IDP.
    pub ca: Option<String>,
    pub proxy: Option<String>,
    pub timeout_seconds: u64,
    pub user_agent: Option<String>,
}

impl Default for RequestAgentOptions {
    fn default() -> Self {
        Self {
            reject_unauthorized: true,
            ca: None,
            proxy: None,
            timeout_seconds: DEFAULT_IDP_TIMEOUT_SECONDS,
            user_agent: None,
        }
    }
}

/// Status used when a valid token lacks the route's scopes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForbiddenStatus {
    /// 401, same as a missing token (legacy clients key off the body text).
    #[default]
    Unauthorized,
    /// 403
    Forbidden,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub idcs_url: Url,
    pub jwk_endpoint: String,
    pub token_endpoint: String,
    /// None means bootstrap fetches keys without authenticating.
    pub credentials: Option<ClientCredentials>,
    pub audience: Option<String>,
    pub scopes_by_uri: Vec<(String, String)>,
    pub regex_uris: Vec<RegexUri>,
    pub default_scopes: String,
    pub validate_options: bool,
    pub request_agent: RequestAgentOptions,
    pub clock_skew_seconds: u64,
    pub forbidden_status: ForbiddenStatus,
}

impl GateConfig {
    pub fn new(settings: GateSettings) -> Result<Self, ConfigError> {
        let idcs_url = settings.idcs_url.trim();
        if idcs_url.is_empty() {
            return Err(ConfigError::Missing("idcs_url"));
        }
        let parsed = Url::parse(idcs_url).map_err(|_| ConfigError::Invalid("idcs_url"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid("idcs_url"));
        }

        let base = idcs_url.trim_end_matches('/');
        let jwk_endpoint = join_endpoint(base, settings.jwk_url.as_deref(), DEFAULT_JWK_URL);
        let token_endpoint =
            join_endpoint(base, settings.token_url.as_deref(), DEFAULT_TOKEN_URL);

        let credentials = credentials(settings.client_id, settings.client_secret);
        let audience = settings.audience.filter(|a| !a.trim().is_empty());

        Ok(Self {
            idcs_url: parsed,
            jwk_endpoint,
            token_endpoint,
            credentials,
            audience,
            scopes_by_uri: settings.scopes_by_uri,
            regex_uris: settings.regex_uris,
            default_scopes: settings.default_scopes.unwrap_or_default(),
            validate_options: settings.validate_options,
            request_agent: settings.request_agent,
            clock_skew_seconds: settings.clock_skew_seconds,
            forbidden_status: settings.forbidden_status,
        })
    }

    pub fn route_policy(&self) -> RoutePolicy {
        RoutePolicy::compile(
            self.scopes_by_uri.iter().cloned(),
            self.regex_uris
                .iter()
                .map(|r| (r.pattern.clone(), r.scopes.clone())),
            &self.default_scopes,
        )
    }
}

fn join_endpoint(base: &str, path: Option<&str>, default: &str) -> String {
    let path = path.map(str::trim).filter(|p| !p.is_empty()).unwrap_or(default);
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

fn credentials(id: Option<String>, secret: Option<String>) -> Option<ClientCredentials> {
    let id = id.filter(|s| !s.is_empty());
    let secret = secret.filter(|s| !s.is_empty());

    match (id, secret) {
        (None, None) => None,
        (id, secret) => {
            if id.is_none() || secret.is_none() {
                tracing::warn!(
                    has_client_id = id.is_some(),
                    has_client_secret = secret.is_some(),
                    "only one of client_id/client_secret is set; the token request will likely fail"
                );
            }
            Some(ClientCredentials {
                client_id: id.unwrap_or_default(),
                client_secret: secret.unwrap_or_default(),
            })
        }
    }
}

/// Deserializes a JSON object into ordered pairs. A repeated key keeps its
/// first position and takes the last value. `null` values become `""`.
fn ordered_scope_map<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedScopeMap;

    impl<'de> Visitor<'de> for OrderedScopeMap {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of path templates to scope strings")
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries: Vec<(String, String)> =
                Vec::with_capacity(access.size_hint().unwrap_or(0));

            while let Some((path, scopes)) = access.next_entry::<String, Option<String>>()? {
                let scopes = scopes.unwrap_or_default();
                match entries.iter_mut().find(|(p, _)| *p == path) {
                    Some(existing) => existing.1 = scopes,
                    None => entries.push((path, scopes)),
                }
            }

            Ok(entries)
        }
    }

    deserializer.deserialize_any(OrderedScopeMap)
}
