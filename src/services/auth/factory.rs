/// Factory: build the shared `Gate` from settings and start bootstrap.
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use super::bootstrap;
use super::config::{GateConfig, GateSettings};
use super::decision::Gate;
use super::idp_client::{HttpIdpClient, IdpClient};
use super::signing_key::SigningKeyCell;
use crate::config::ConfigError;

/// Validates `settings`, builds the gate and spawns the bootstrap sequence on
/// the current tokio runtime.
///
/// Returns immediately: the gate answers `ServiceUnavailable` until the
/// returned task has published the signing key. Only configuration problems
/// are reported here; IDP failures surface through the gate's readiness.
pub fn initialize(
    settings: Option<GateSettings>,
) -> Result<(Arc<Gate>, JoinHandle<()>), ConfigError> {
    let settings = settings.ok_or(ConfigError::Missing("configuration"))?;
    let config = GateConfig::new(settings)?;

    let idp = HttpIdpClient::new(&config).map_err(|e| {
        tracing::error!(error = %e, "cannot build IDP client from requestAgent");
        ConfigError::Invalid("requestAgent")
    })?;

    initialize_with(config, Arc::new(idp))
}

/// Same as [`initialize`] with a caller-supplied IDP client.
pub fn initialize_with(
    config: GateConfig,
    idp: Arc<dyn IdpClient>,
) -> Result<(Arc<Gate>, JoinHandle<()>), ConfigError> {
    let keys = Arc::new(SigningKeyCell::new());
    let credentials = config.credentials.clone();
    let config = Arc::new(config);
    let gate = Arc::new(Gate::new(config.clone(), keys.clone()));

    info!(
        idcs_url = %config.idcs_url,
        routes = gate.policy().routes().len(),
        authenticated_bootstrap = credentials.is_some(),
        "authorization gate configured; bootstrapping"
    );

    let handle = bootstrap::spawn(idp, credentials, keys);
    Ok((gate, handle))
}
