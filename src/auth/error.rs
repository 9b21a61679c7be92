//! Auth error taxonomy and its HTTP mapping.
//!
//! Gate and policy failures answer with a `message` key, route failures with an
//! `error` key, matching what the frontend already parses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use utoipa::ToSchema;

use super::token::TokenError;

/// A single failed validation rule.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Never shown as such; clients see `InvalidCredentials`.
    #[error("account is inactive")]
    InactiveAccount,
    #[error("unauthorized")]
    Unauthorized,
    #[error("token has been revoked")]
    TokenRevoked,
    #[error("forbidden")]
    Forbidden,
    #[error("invalid or expired code")]
    InvalidOrExpiredCode,
    #[error("invalid TOTP code")]
    InvalidTotpCode,
    #[error("TOTP not configured")]
    MfaNotConfigured,
    #[error("invalid or expired temporary token")]
    InvalidPendingToken,
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error("user already exists")]
    UserExists,
    #[error("user not found")]
    UserNotFound,
    #[error("current password is incorrect")]
    CurrentPasswordIncorrect,
    #[error("invalid or expired reset token")]
    InvalidResetToken,
    #[error("failed to deliver code: {0}")]
    Delivery(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::InactiveAccount
            | Self::Unauthorized
            | Self::TokenRevoked
            | Self::InvalidOrExpiredCode
            | Self::InvalidTotpCode
            | Self::MfaNotConfigured
            | Self::InvalidPendingToken => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Validation(_)
            | Self::UserExists
            | Self::CurrentPasswordIncorrect
            | Self::InvalidResetToken => StatusCode::BAD_REQUEST,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::Delivery(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(_: TokenError) -> Self {
        Self::Unauthorized
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Unauthorized => json!({ "message": "Unauthorized" }),
            Self::TokenRevoked => json!({ "message": "Token is invalidated. Please log in again." }),
            Self::Forbidden => json!({ "message": "Forbidden" }),
            Self::Validation(details) => json!({
                "message": "Validation Error",
                "details": details,
            }),
            Self::InvalidCredentials | Self::InactiveAccount => {
                json!({ "error": "Invalid credentials" })
            }
            Self::InvalidOrExpiredCode => json!({ "error": "Invalid or expired code" }),
            Self::InvalidTotpCode => json!({ "error": "Invalid TOTP code" }),
            Self::MfaNotConfigured => json!({ "error": "TOTP not configured" }),
            Self::InvalidPendingToken => {
                json!({ "error": "Invalid or expired temporary token" })
            }
            Self::UserExists => json!({ "error": "User already exists" }),
            Self::UserNotFound => json!({ "error": "User not found" }),
            Self::CurrentPasswordIncorrect => {
                json!({ "error": "Current password is incorrect" })
            }
            Self::InvalidResetToken => json!({ "error": "Invalid or expired reset token" }),
            Self::Delivery(reason) => {
                error!("MFA code delivery failed: {reason}");
                json!({ "error": "Failed to send MFA code" })
            }
            Self::Internal(err) => {
                error!("Internal error: {err:#}");
                json!({ "error": "Internal server error" })
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: AuthError) -> anyhow::Result<(StatusCode, serde_json::Value)> {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, serde_json::from_slice(&bytes)?))
    }

    #[tokio::test]
    async fn inactive_account_is_reported_as_invalid_credentials() -> anyhow::Result<()> {
        let (status, body) = body_of(AuthError::InactiveAccount).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Invalid credentials" }));
        Ok(())
    }

    #[tokio::test]
    async fn gate_errors_use_message_key() -> anyhow::Result<()> {
        let (status, body) = body_of(AuthError::Forbidden).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({ "message": "Forbidden" }));

        let (status, body) = body_of(AuthError::TokenRevoked).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body["message"],
            "Token is invalidated. Please log in again."
        );
        Ok(())
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_details() -> anyhow::Result<()> {
        let err = AuthError::Internal(anyhow::anyhow!("connection refused on 10.0.0.3"));
        let (status, body) = body_of(err).await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Internal server error" }));
        Ok(())
    }

    #[tokio::test]
    async fn validation_lists_field_details() -> anyhow::Result<()> {
        let err = AuthError::invalid("email", "Invalid email format");
        let (status, body) = body_of(err).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Validation Error");
        assert_eq!(body["details"][0]["field"], "email");
        Ok(())
    }
}
