use std::{error::Error as StdError, fmt};

use jsonwebtoken::{Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use super::scope::Scopes;
use super::signing_key::{ALGORITHM, SigningKey};

const BEARER_PREFIX: &str = "Bearer ";

// Errors returned by bearer-token validation. Only these two kinds reach the
// caller; the wrapped jsonwebtoken error is kept for logging.
#[derive(Debug)]
pub enum TokenError {
    /// Missing header, wrong scheme, or a token that failed verification
    /// (bad signature, wrong algorithm, malformed, audience mismatch).
    NoToken(Option<jsonwebtoken::errors::Error>),
    /// Signature verified but `exp` has passed.
    Expired,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoToken(None) => write!(f, "no bearer token"),
            Self::NoToken(Some(e)) => write!(f, "token rejected: {}", e),
            Self::Expired => write!(f, "token expired"),
        }
    }
}

impl StdError for TokenError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::NoToken(Some(e)) => Some(e),
            _ => None,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::NoToken(Some(e)),
        }
    }
}

/// Verified token payload.
///
/// `sub`, `exp` and `scope` are lifted out; every other provider claim
/// (`client_id`, `tenant`, `user_displayname`, ...) stays in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default)]
    pub scope: Scopes,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ClaimSet {
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }
}

/// RS256 bearer-token verifier.
///
/// The algorithm list is fixed, so a token's own `alg` header can never
/// select HMAC or `none`.
#[derive(Clone)]
pub struct TokenValidator {
    validation: Validation,
}

impl fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenValidator")
            .field("algorithms", &self.validation.algorithms)
            .field("aud", &self.validation.aud)
            .field("leeway", &self.validation.leeway)
            .finish()
    }
}

impl TokenValidator {
    pub fn new(audience: Option<&str>, leeway_seconds: u64) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            // otherwise any aud claim is accepted
            None => validation.validate_aud = false,
        }
        validation.validate_nbf = true;
        validation.leeway = leeway_seconds;

        Self { validation }
    }

    /// `Authorization` value -> token, requiring the literal `Bearer ` scheme.
    pub fn bearer_token(authorization: Option<&str>) -> Option<&str> {
        authorization?.strip_prefix(BEARER_PREFIX)
    }

    pub fn validate(
        &self,
        authorization: Option<&str>,
        key: &SigningKey,
    ) -> Result<ClaimSet, TokenError> {
        let token = Self::bearer_token(authorization).ok_or(TokenError::NoToken(None))?;

        let data = jsonwebtoken::decode::<ClaimSet>(token, key.decoding_key(), &self.validation)?;

        Ok(data.claims)
    }
}
