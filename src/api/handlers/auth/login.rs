use axum::{extract::Extension, Json};
use std::sync::Arc;
use tracing::instrument;

use super::{
    require_payload,
    types::{ErrorResponse, LoginRequest, LoginResponse, SessionResponse, VerifyMfaRequest},
};
use crate::auth::{AuthError, AuthState, LoginOutcome};

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued, or an MFA challenge started", body = LoginResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 500, description = "MFA code could not be sent", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<LoginResponse>, AuthError> {
    let request = require_payload(payload)?;
    request.validate()?;

    let response = match auth_state
        .authenticator()
        .login(&request.email, &request.password)
        .await?
    {
        LoginOutcome::Authenticated(session) => LoginResponse::Authenticated {
            token: session.token,
            requires_mfa: false,
            user: session.user,
        },
        LoginOutcome::MfaRequired { temp_token, method } => LoginResponse::MfaRequired {
            requires_mfa: true,
            temp_token,
            mfa_method: method,
        },
    };

    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/auth/verify-mfa",
    request_body = VerifyMfaRequest,
    responses(
        (status = 200, description = "Second factor accepted", body = SessionResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Invalid pending token or code", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn verify_mfa(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyMfaRequest>>,
) -> Result<Json<SessionResponse>, AuthError> {
    let request = require_payload(payload)?;
    request.validate()?;

    let session = auth_state
        .authenticator()
        .complete_mfa(&request.temp_token, &request.token, request.method)
        .await?;

    Ok(Json(SessionResponse {
        token: session.token,
        user: session.user,
    }))
}
