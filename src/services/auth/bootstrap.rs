//! One-shot startup sequence: bearer token (optional), then the JWK set, then
//! key selection and publication into the [`SigningKeyCell`].
//!
//! Runs once in the background. There is no retry: a failure is recorded on
//! the cell and the gate stays degraded until the process restarts.
use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::config::ClientCredentials;
use super::idp_client::IdpClient;
use super::signing_key::{AlreadyPublished, KeySelectionError, SigningKey, SigningKeyCell};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("token request failed: {0}")]
    TokenRequest(#[source] reqwest::Error),
    #[error("token endpoint returned {0}")]
    TokenStatus(StatusCode),
    #[error("could not obtain bearer token from the IDP: no access_token in response")]
    MissingAccessToken,
    #[error("signing key request failed: {0}")]
    JwksRequest(#[source] reqwest::Error),
    #[error("signing key endpoint returned {0}")]
    JwksStatus(StatusCode),
    #[error(transparent)]
    KeySelection(#[from] KeySelectionError),
    #[error(transparent)]
    AlreadyInitialized(#[from] AlreadyPublished),
}

/// Step 1. No credentials is not an error: the key set is then fetched
/// without authenticating.
pub async fn acquire_bearer(
    idp: &dyn IdpClient,
    credentials: Option<&ClientCredentials>,
) -> Result<Option<String>, BootstrapError> {
    match credentials {
        Some(credentials) => {
            let token = idp.fetch_bearer_token(credentials).await?;
            info!(client_id = %credentials.client_id, "obtained IDP bearer token");
            Ok(Some(token))
        }
        None => {
            info!("no client credentials configured; fetching signing keys unauthenticated");
            Ok(None)
        }
    }
}

pub async fn run(
    idp: &dyn IdpClient,
    credentials: Option<&ClientCredentials>,
    keys: &SigningKeyCell,
) -> Result<(), BootstrapError> {
    info!("connecting to IDP");
    let bearer = acquire_bearer(idp, credentials).await?;
    let jwks = idp.fetch_jwks(bearer.as_deref()).await?;
    let key = SigningKey::select(&jwks)?;

    info!(
        kid = key.kid().unwrap_or("-"),
        thumbprint = key.thumbprint().unwrap_or("-"),
        available = jwks.keys.len(),
        "obtained IDP signing key"
    );
    keys.publish(key)?;
    Ok(())
}

/// Runs the sequence on the current runtime. On failure the reason is
/// recorded on `keys` so readiness reports it.
pub fn spawn(
    idp: Arc<dyn IdpClient>,
    credentials: Option<ClientCredentials>,
    keys: Arc<SigningKeyCell>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match run(idp.as_ref(), credentials.as_ref(), &keys).await {
            Ok(()) => info!("authorization gate ready"),
            Err(err) => {
                error!(error = %err, "bootstrap failed; protected routes unavailable until restart");
                keys.mark_failed(err.to_string());
            }
        }
    })
}
