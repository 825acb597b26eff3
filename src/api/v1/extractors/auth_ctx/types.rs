/*
 * Responsibility
 * - The authenticated context handlers see
 * - The access middleware verifies the token and stores this in request
 *   extensions; handlers only ever receive this type
 */

use crate::services::auth::ClaimSet;
use crate::services::auth::scope::Scopes;

/// Context attached to a request the gate allowed.
#[derive(Debug, Clone)]
pub struct AuthCtx {
    pub claims: ClaimSet,
}

impl AuthCtx {
    pub fn new(claims: ClaimSet) -> Self {
        Self { claims }
    }

    pub fn subject(&self) -> Option<&str> {
        self.claims.sub.as_deref()
    }

    pub fn scopes(&self) -> &Scopes {
        &self.claims.scope
    }
}
