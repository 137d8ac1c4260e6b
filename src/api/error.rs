//! Typed errors surfaced by the auth handlers.
//!
//! A flat set mirroring the controller's failure modes: missing input,
//! authentication mismatch, authorization, bad params. Anything else is an
//! internal error that only logs its cause.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// User-facing message constants.
pub mod constants {
    pub const INPUT_LOGIN_REQUIRED: &str = "Fill in the login field";
    pub const INPUT_PASS_REQUIRED: &str = "Fill in the password field";
    pub const INPUT_EMAIL_REQUIRED: &str = "Fill in the e-mail field";
    pub const MAIL_WRONG: &str = "Wrong e-mail address";
    pub const INPUT_LOGIN_CONSTRAINT: &str =
        "Login must be 3-15 characters, start with a letter, end with a letter or digit, \
         and contain only letters, digits, dots, dashes or underscores";
    pub const AUTHENTICATION_DOESNT_MATCH: &str = "Login or password doesn't match";
    pub const AUTHENTICATION_MAX_ATTEMPTS: &str =
        "Account is temporarily locked after too many failed login attempts";
    pub const AUTHENTICATION_USER_EXISTS: &str = "User with this login already exists";
    pub const AUTHENTICATION_EMAIL_EXISTS: &str = "User with this e-mail already exists";
    pub const AUTHENTICATION_PASSWORDS_DONT_MATCH: &str = "Passwords don't match";
    pub const AUTHENTICATION_CURRPASS_WRONG: &str = "Current password is wrong";
    pub const AUTHENTICATION_REGISTRATION: &str = "Registration error";
    pub const AUTHENTICATION_PASSCHANGE: &str = "Password change error";
    pub const AUTHENTICATION_KEY_DOESNT_EXISTS: &str =
        "Confirmation key doesn't exist or has expired";
    pub const BAD_PARAMS: &str = "Bad parameters";
    pub const DENY: &str = "Not allowed";
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// A required field is missing or malformed.
    #[error("{0}")]
    Input(&'static str),

    /// Credentials or confirmation state don't match.
    #[error("{0}")]
    Authentication(&'static str),

    /// The caller is not allowed to perform the operation.
    #[error("{0}")]
    Authorization(&'static str),

    /// The payload shape is wrong (e.g. a key of impossible length).
    #[error("{0}")]
    BadParams(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn authorization() -> Self {
        Self::Authorization(constants::DENY)
    }

    #[must_use]
    pub fn bad_params() -> Self {
        Self::BadParams(constants::BAD_PARAMS)
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Input(_) | Self::BadParams(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(err) => {
                error!("Internal error: {err:?}");
                "Internal error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_class() {
        assert_eq!(
            AuthError::Input(constants::INPUT_LOGIN_REQUIRED).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::Authentication(constants::AUTHENTICATION_DOESNT_MATCH).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::authorization().status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::bad_params().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AuthError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_errors_hide_their_cause() {
        let err = AuthError::Internal(anyhow::anyhow!("connection refused"));
        assert_eq!(err.to_string(), "connection refused");
        // The response body is generic; only the log carries the cause.
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
