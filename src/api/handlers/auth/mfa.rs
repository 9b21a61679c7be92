//! MFA enrollment endpoints. Verification during login lives in `login.rs`.

use axum::{extract::Extension, Json};
use std::sync::Arc;
use tracing::instrument;

use super::{
    require_payload,
    types::{
        EnableMfaRequest, EnableTotpRequest, ErrorResponse, MessageResponse, SetupMfaRequest,
        SetupMfaResponse,
    },
};
use crate::auth::{AuthError, AuthState, Identity, MfaSetup};

/// Code failures during enrollment are client errors, not auth failures.
fn enrollment_error(err: AuthError) -> AuthError {
    match err {
        AuthError::InvalidTotpCode => AuthError::invalid("token", "Invalid TOTP code"),
        AuthError::InvalidOrExpiredCode => AuthError::invalid("token", "Invalid or expired code"),
        AuthError::MfaNotConfigured => AuthError::invalid("method", "TOTP not configured"),
        other => other,
    }
}

#[utoipa::path(
    post,
    path = "/auth/setup-mfa",
    request_body = SetupMfaRequest,
    responses(
        (status = 200, description = "TOTP secret issued or code sent", body = SetupMfaResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Missing or invalid token"),
        (status = 500, description = "Code could not be sent", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "mfa"
)]
#[instrument(skip_all, fields(user_id = identity.user_id()))]
pub async fn setup_mfa(
    identity: Identity,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SetupMfaRequest>>,
) -> Result<Json<SetupMfaResponse>, AuthError> {
    let request = require_payload(payload)?;
    let phone = request
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|phone| !phone.is_empty());

    let response = match auth_state
        .authenticator()
        .setup_mfa(identity.user_id(), request.method, phone)
        .await?
    {
        MfaSetup::Totp(enrollment) => SetupMfaResponse {
            method: request.method,
            message: "Scan the QR code with your authenticator app and verify with a code"
                .to_string(),
            secret: Some(enrollment.secret),
            qr_code: Some(enrollment.qr_code),
            otpauth_url: Some(enrollment.otpauth_url),
        },
        MfaSetup::CodeSent(method) => SetupMfaResponse {
            method,
            message: format!("Verification code sent via {method}. Please verify to enable MFA."),
            secret: None,
            qr_code: None,
            otpauth_url: None,
        },
    };

    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/auth/enable-totp",
    request_body = EnableTotpRequest,
    responses(
        (status = 200, description = "TOTP enabled", body = MessageResponse),
        (status = 400, description = "Validation error or wrong code"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = [])),
    tag = "mfa"
)]
#[instrument(skip_all, fields(user_id = identity.user_id()))]
pub async fn enable_totp(
    identity: Identity,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<EnableTotpRequest>>,
) -> Result<Json<MessageResponse>, AuthError> {
    let request = require_payload(payload)?;
    request.validate()?;

    auth_state
        .authenticator()
        .enable_totp(identity.user_id(), &request.secret, &request.token)
        .await
        .map_err(enrollment_error)?;

    Ok(Json(MessageResponse::new("TOTP MFA enabled successfully")))
}

#[utoipa::path(
    post,
    path = "/auth/enable-mfa",
    request_body = EnableMfaRequest,
    responses(
        (status = 200, description = "MFA enabled", body = MessageResponse),
        (status = 400, description = "Validation error or wrong code"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = [])),
    tag = "mfa"
)]
#[instrument(skip_all, fields(user_id = identity.user_id()))]
pub async fn enable_mfa(
    identity: Identity,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<EnableMfaRequest>>,
) -> Result<Json<MessageResponse>, AuthError> {
    let request = require_payload(payload)?;
    request.validate()?;

    auth_state
        .authenticator()
        .enable_mfa(identity.user_id(), &request.token, request.method)
        .await
        .map_err(enrollment_error)?;

    Ok(Json(MessageResponse::new(format!(
        "{} MFA enabled successfully",
        request.method.as_str().to_uppercase()
    ))))
}

#[utoipa::path(
    post,
    path = "/auth/disable-mfa",
    responses(
        (status = 200, description = "MFA disabled", body = MessageResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = [])),
    tag = "mfa"
)]
pub async fn disable_mfa(
    identity: Identity,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Json<MessageResponse>, AuthError> {
    auth_state
        .authenticator()
        .disable_mfa(identity.user_id())
        .await?;
    Ok(Json(MessageResponse::new("MFA disabled successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrollment_code_errors_become_validation() {
        for err in [
            AuthError::InvalidTotpCode,
            AuthError::InvalidOrExpiredCode,
            AuthError::MfaNotConfigured,
        ] {
            assert!(matches!(enrollment_error(err), AuthError::Validation(_)));
        }
        assert!(matches!(
            enrollment_error(AuthError::UserNotFound),
            AuthError::UserNotFound
        ));
    }
}
