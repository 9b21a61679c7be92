//! Password change and reset.

use axum::{extract::Extension, Json};
use std::sync::Arc;
use tracing::instrument;

use super::{
    require_payload,
    types::{
        ChangePasswordRequest, ErrorResponse, ForgotPasswordRequest, MessageResponse,
        ResetPasswordRequest,
    },
};
use crate::auth::{AuthError, AuthState, Identity};

#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Validation error or wrong current password", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all, fields(user_id = identity.user_id()))]
pub async fn change_password(
    identity: Identity,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Result<Json<MessageResponse>, AuthError> {
    let request = require_payload(payload)?;
    request.validate()?;

    auth_state
        .authenticator()
        .change_password(
            identity.user_id(),
            &request.current_password,
            &request.new_password,
        )
        .await?;

    Ok(Json(MessageResponse::new("Password changed successfully")))
}

/// Always answers 200 so callers cannot probe which emails exist.
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset link sent if the account exists", body = MessageResponse),
        (status = 400, description = "Validation error")
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn forgot_password(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Result<Json<MessageResponse>, AuthError> {
    let request = require_payload(payload)?;
    request.validate()?;

    auth_state
        .authenticator()
        .forgot_password(&request.email)
        .await?;

    Ok(Json(MessageResponse::new(
        "If an account exists for that email, a reset link has been sent",
    )))
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Validation error or invalid token", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn reset_password(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<Json<MessageResponse>, AuthError> {
    let request = require_payload(payload)?;
    request.validate()?;

    auth_state
        .authenticator()
        .reset_password(request.token.trim(), &request.password)
        .await?;

    Ok(Json(MessageResponse::new("Password reset successfully")))
}
