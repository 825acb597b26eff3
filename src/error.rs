/*
 * Responsibility
 * - AppError: the HTTP side of a denied request
 * - IntoResponse (status, fixed plain-text body, WWW-Authenticate)
 */
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::services::auth::DenyReason;
use crate::services::auth::config::ForbiddenStatus;

pub const ERR_NO_TOKEN: &str = "Invalid or unreadable token provided.";
pub const ERR_EXP_TOKEN: &str = "The supplied token has expired";
pub const ERR_WRONG_SCOPES: &str =
    "The supplied token has insufficent privileges to access this resource.";
pub const ERR_FAILED_TO_OBTAIN_JWK: &str =
    "Could not connect to authorization server, please wait a moment then try again.";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{}", deny_message(.0))]
    Unauthenticated(DenyReason),

    #[error("{}", ERR_WRONG_SCOPES)]
    Forbidden(ForbiddenStatus),

    /// No signing key yet (or bootstrap failed).
    #[error("{}", ERR_FAILED_TO_OBTAIN_JWK)]
    ServiceUnavailable,
}

fn deny_message(reason: &DenyReason) -> &'static str {
    match reason {
        DenyReason::NoToken => ERR_NO_TOKEN,
        DenyReason::Expired => ERR_EXP_TOKEN,
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(ForbiddenStatus::Unauthorized) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(ForbiddenStatus::Forbidden) => StatusCode::FORBIDDEN,
            AppError::ServiceUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn www_authenticate(&self) -> Option<&'static str> {
        match self {
            AppError::Unauthenticated(_) => Some(r#"Bearer error="invalid_token""#),
            AppError::Forbidden(_) => Some(r#"Bearer error="insufficient_scope""#),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let challenge = self.www_authenticate();

        let mut response = (status, self.to_string()).into_response();
        if let Some(challenge) = challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
        }
        response
    }
}
