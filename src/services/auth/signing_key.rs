//! Signing-key material fetched from the IDP, and the process-wide cell it is
//! published into once bootstrap succeeds.
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// The only algorithm tokens are verified with. The token's own `alg` header
/// is never trusted to pick anything else.
pub const ALGORITHM: Algorithm = Algorithm::RS256;
pub const ALGORITHM_NAME: &str = "RS256";

const PEM_LINE_WIDTH: usize = 64;

/// JWK set as published by the IDP. Fields are lenient so keys this gate
/// does not understand cannot break parsing of the ones it does.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JwkSet {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kty: Option<String>,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default, rename = "use")]
    pub use_: Option<String>,
    /// Certificate chain; the first entry holds the signing key.
    #[serde(default)]
    pub x5c: Vec<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeySelectionError {
    #[error("no signing key for alg {0} found in the IDP key set")]
    NoKeyForAlgorithm(&'static str),
    #[error("signing key {kid:?} has unusable key material: {reason}")]
    InvalidKeyMaterial { kid: Option<String>, reason: String },
}

/// Verification key for the configured algorithm.
///
/// - Key material is intentionally not printable via Debug.
#[derive(Clone)]
pub struct SigningKey {
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    kid: Option<String>,
    // x5t#S256 of the certificate, when the key came from one
    thumbprint: Option<String>,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm)
            .field("kid", &self.kid)
            .field("thumbprint", &self.thumbprint)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Picks the first key whose `alg` is [`ALGORITHM_NAME`].
    pub fn select(jwks: &JwkSet) -> Result<Self, KeySelectionError> {
        let jwk = jwks
            .keys
            .iter()
            .find(|k| k.alg.as_deref() == Some(ALGORITHM_NAME))
            .ok_or(KeySelectionError::NoKeyForAlgorithm(ALGORITHM_NAME))?;

        Self::from_jwk(jwk)
    }

    /// Builds the key from `x5c[0]`, falling back to the RSA `n`/`e`
    /// components when the key carries no certificate.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeySelectionError> {
        let invalid = |reason: String| KeySelectionError::InvalidKeyMaterial {
            kid: jwk.kid.clone(),
            reason,
        };

        let (decoding_key, thumbprint) = if let Some(cert) = jwk.x5c.first() {
            let envelope = CertificateEnvelope::from_x5c(cert)
                .map_err(|e| invalid(format!("x5c is not base64: {e}")))?;
            let key = DecodingKey::from_rsa_pem(envelope.pem.as_bytes())
                .map_err(|e| invalid(format!("x5c certificate rejected: {e}")))?;
            (key, Some(envelope.thumbprint()))
        } else if let (Some(n), Some(e)) = (&jwk.n, &jwk.e) {
            let key = DecodingKey::from_rsa_components(n, e)
                .map_err(|e| invalid(format!("rsa components rejected: {e}")))?;
            (key, None)
        } else {
            return Err(invalid("neither x5c nor n/e present".to_string()));
        };

        Ok(Self {
            decoding_key,
            algorithm: ALGORITHM,
            kid: jwk.kid.clone(),
            thumbprint,
        })
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub fn thumbprint(&self) -> Option<&str> {
        self.thumbprint.as_deref()
    }
}

/// An `x5c` entry re-wrapped as a PEM `CERTIFICATE` block, the form the
/// verifier loads certificates from.
#[derive(Debug, Clone)]
pub struct CertificateEnvelope {
    pub pem: String,
    pub der: Vec<u8>,
}

impl CertificateEnvelope {
    pub fn from_x5c(x5c: &str) -> Result<Self, base64::DecodeError> {
        let compact: String = x5c.chars().filter(|c| !c.is_whitespace()).collect();
        let der = STANDARD.decode(compact)?;

        let body = STANDARD.encode(&der);
        let mut pem = String::with_capacity(body.len() + body.len() / PEM_LINE_WIDTH + 64);
        pem.push_str("-----BEGIN CERTIFICATE-----\n");
        // base64 output is ASCII, so byte chunks are valid str slices
        for line in body.as_bytes().chunks(PEM_LINE_WIDTH) {
            pem.push_str(std::str::from_utf8(line).unwrap_or_default());
            pem.push('\n');
        }
        pem.push_str("-----END CERTIFICATE-----\n");

        Ok(Self { pem, der })
    }

    pub fn thumbprint(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(&self.der))
    }
}

/// The signing key was already published; keys are never replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("signing key already published")]
pub struct AlreadyPublished;

/// Bootstrap readiness as seen by request handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Bootstrap still running.
    Pending,
    Ready,
    /// Bootstrap failed; this process will not become ready.
    Degraded(String),
}

/// Single-assignment holder for the signing key.
///
/// Bootstrap is the only writer and publishes once; request handlers only read,
/// observing either nothing or the complete key.
#[derive(Debug, Default)]
pub struct SigningKeyCell {
    key: OnceCell<SigningKey>,
    failure: OnceCell<String>,
}

impl SigningKeyCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&SigningKey> {
        self.key.get()
    }

    pub fn publish(&self, key: SigningKey) -> Result<(), AlreadyPublished> {
        self.key.set(key).map_err(|_| AlreadyPublished)
    }

    /// Records why bootstrap failed. Only the first reason is kept.
    pub fn mark_failed(&self, reason: impl Into<String>) {
        let _ = self.failure.set(reason.into());
    }

    pub fn readiness(&self) -> Readiness {
        if self.key.get().is_some() {
            Readiness::Ready
        } else if let Some(reason) = self.failure.get() {
            Readiness::Degraded(reason.clone())
        } else {
            Readiness::Pending
        }
    }
}
