//! Authentication errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Every way an auth operation can fail.
///
/// Verification failures are terminal for the request and map to 401.
/// Storage and internal failures map to 500.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("missing authorization token")]
    MissingToken,
    #[error("invalid authorization format, use: Bearer <token>")]
    InvalidFormat,
    #[error("token is malformed")]
    TokenMalformed,
    #[error("token signature is invalid")]
    TokenBadSignature,
    #[error("token has expired")]
    TokenExpired,
    #[error("token has been revoked")]
    TokenRevoked,
    #[error("session is no longer active")]
    SessionMismatch,
    #[error("identity no longer exists")]
    IdentityNotFound,
    #[error("storage failure: {0:#}")]
    StorageFailure(anyhow::Error),
    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable kind, used as the `error` field of response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidFormat => "invalid_format",
            AuthError::TokenMalformed => "token_malformed",
            AuthError::TokenBadSignature => "token_bad_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenRevoked => "token_revoked",
            AuthError::SessionMismatch => "session_mismatch",
            AuthError::IdentityNotFound => "identity_not_found",
            AuthError::StorageFailure(_) => "storage_failure",
            AuthError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::StorageFailure(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn is_verification_failure(&self) -> bool {
        self.status() == StatusCode::UNAUTHORIZED
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal detail stays in the logs.
        let message = match &self {
            AuthError::StorageFailure(_) | AuthError::Internal(_) => {
                error!("Auth request failed: {}", self);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": self.kind(),
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

/// Gatekeeper rejection. Always 401, whatever the underlying cause.
#[derive(Debug)]
pub struct Unauthorized(pub AuthError);

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.0.kind(),
            "message": if self.0.is_verification_failure() {
                self.0.to_string()
            } else {
                "Unable to verify token".to_string()
            },
        });

        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_responses() {
        let invalid_creds = AuthError::InvalidCredentials.into_response();
        assert_eq!(invalid_creds.status(), StatusCode::UNAUTHORIZED);

        let mismatch = AuthError::SessionMismatch.into_response();
        assert_eq!(mismatch.status(), StatusCode::UNAUTHORIZED);

        let revoked = AuthError::TokenRevoked.into_response();
        assert_eq!(revoked.status(), StatusCode::UNAUTHORIZED);

        let storage = AuthError::StorageFailure(anyhow::anyhow!("disk full")).into_response();
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unauthorized_is_always_401() {
        let storage = Unauthorized(AuthError::StorageFailure(anyhow::anyhow!("cache down")));
        assert_eq!(storage.into_response().status(), StatusCode::UNAUTHORIZED);

        let expired = Unauthorized(AuthError::TokenExpired);
        assert_eq!(expired.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_storage_detail_is_not_displayed_to_clients() {
        let err = AuthError::StorageFailure(anyhow::anyhow!("password=hunter2"));
        assert_eq!(err.kind(), "storage_failure");
        assert!(err.to_string().contains("hunter2"));
        assert!(!err.is_verification_failure());
    }
}
