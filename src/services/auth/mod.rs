pub mod access_jwt;
pub mod bootstrap;
pub mod config;
pub mod decision;
pub mod factory;
pub mod idp_client;
pub mod route_policy;
pub mod scope;
pub mod signing_key;

#[cfg(test)]
pub(crate) mod test_support;

pub use access_jwt::{ClaimSet, TokenError, TokenValidator};
pub use config::{GateConfig, GateSettings};
pub use decision::{AuthorizationOutcome, DenyReason, Gate, Unavailable};
pub use factory::initialize;
pub use signing_key::Readiness;
