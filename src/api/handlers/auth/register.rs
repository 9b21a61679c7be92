use axum::{extract::Extension, http::StatusCode, Json};
use std::sync::Arc;
use tracing::instrument;

use super::{
    require_payload,
    types::{ErrorResponse, RegisterRequest, RegisterResponse},
};
use crate::auth::{AuthError, AuthState, Identity, Registration};

/// Create a user account. Admin only.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = RegisterResponse),
        (status = 400, description = "Validation error or email already taken", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller is not an admin")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all, fields(admin_id = identity.user_id()))]
pub async fn register(
    identity: Identity,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    let request = require_payload(payload)?;
    request.validate()?;

    let user = auth_state
        .authenticator()
        .register(
            Registration {
                email: request.email,
                password: request.password,
                name: request.name,
                phone: request.phone.filter(|phone| !phone.trim().is_empty()),
                role: request.role,
                organization_id: request.organization_id,
            },
            Some(identity.user_id()),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User created successfully".to_string(),
            user,
        }),
    ))
}
