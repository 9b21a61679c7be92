use axum::{extract::Extension, Json};
use std::sync::Arc;

use super::types::MessageResponse;
use crate::auth::{AuthState, Identity};

/// Revoke the presented token until it would have expired anyway.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Token revoked", body = MessageResponse),
        (status = 401, description = "Missing, invalid or already revoked token")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(identity: Identity, auth_state: Extension<Arc<AuthState>>) -> Json<MessageResponse> {
    auth_state.authenticator().logout(&identity.token);
    Json(MessageResponse::new("Logged out successfully"))
}
