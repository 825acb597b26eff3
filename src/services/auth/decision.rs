//! Per-request authorization decision.
//!
//! Evaluated in order, first terminal state wins:
//! 1. `OPTIONS` with the bypass enabled -> allow, no claims
//! 2. no signing key yet -> service unavailable
//! 3. missing/unverifiable token -> unauthenticated (no token)
//! 4. expired token -> unauthenticated (expired)
//! 5. scopes missing -> forbidden
//! 6. otherwise allow with the claims
use std::sync::Arc;

use axum::http::Method;
use tracing::{debug, warn};

use super::access_jwt::{ClaimSet, TokenError, TokenValidator};
use super::config::{ForbiddenStatus, GateConfig};
use super::route_policy::RoutePolicy;
use super::scope::{self, InsufficientScope};
use super::signing_key::{Readiness, SigningKeyCell};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NoToken,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    /// Bootstrap has not finished yet; retrying later may succeed.
    Starting,
    /// Bootstrap failed; nothing will succeed until restart.
    Degraded(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthorizationOutcome {
    /// `None` only for bypassed `OPTIONS` requests.
    Allow(Option<ClaimSet>),
    DenyUnauthenticated(DenyReason),
    DenyForbidden(InsufficientScope),
    ServiceUnavailable(Unavailable),
}

impl AuthorizationOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }
}

/// Immutable after construction and shared across requests; the only state
/// that changes underneath it is the one-time key publication in `keys`.
#[derive(Debug)]
pub struct Gate {
    config: Arc<GateConfig>,
    policy: RoutePolicy,
    validator: TokenValidator,
    keys: Arc<SigningKeyCell>,
}

impl Gate {
    pub fn new(config: Arc<GateConfig>, keys: Arc<SigningKeyCell>) -> Self {
        let policy = config.route_policy();
        let validator = TokenValidator::new(config.audience.as_deref(), config.clock_skew_seconds);

        Self {
            config,
            policy,
            validator,
            keys,
        }
    }

    pub fn decide(
        &self,
        method: &Method,
        path: &str,
        authorization: Option<&str>,
    ) -> AuthorizationOutcome {
        if *method == Method::OPTIONS && !self.config.validate_options {
            return AuthorizationOutcome::Allow(None);
        }

        let Some(key) = self.keys.get() else {
            let unavailable = match self.keys.readiness() {
                Readiness::Degraded(reason) => Unavailable::Degraded(reason),
                _ => Unavailable::Starting,
            };
            warn!(%method, path, state = ?unavailable, "request arrived before the signing key is available");
            return AuthorizationOutcome::ServiceUnavailable(unavailable);
        };

        let claims = match self.validator.validate(authorization, key) {
            Ok(claims) => claims,
            Err(err) => {
                debug!(%method, path, error = %err, "token rejected");
                let reason = match err {
                    TokenError::Expired => DenyReason::Expired,
                    TokenError::NoToken(_) => DenyReason::NoToken,
                };
                return AuthorizationOutcome::DenyUnauthenticated(reason);
            }
        };

        match scope::authorize(&self.policy, path, &claims.scope) {
            Ok(()) => AuthorizationOutcome::Allow(Some(claims)),
            Err(insufficient) => {
                debug!(
                    %method,
                    path,
                    sub = claims.sub.as_deref().unwrap_or("-"),
                    missing = ?insufficient.missing,
                    "insufficient scope"
                );
                AuthorizationOutcome::DenyForbidden(insufficient)
            }
        }
    }

    pub fn readiness(&self) -> Readiness {
        self.keys.readiness()
    }

    pub fn forbidden_status(&self) -> ForbiddenStatus {
        self.config.forbidden_status
    }

    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }
}
