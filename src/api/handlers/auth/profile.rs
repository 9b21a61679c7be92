use axum::{extract::Extension, Json};
use std::sync::Arc;

use super::types::ErrorResponse;
use crate::{
    auth::{AuthError, AuthState, Identity},
    store::UserProfile,
};

#[utoipa::path(
    get,
    path = "/auth/profile",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn profile(
    identity: Identity,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Json<UserProfile>, AuthError> {
    auth_state
        .authenticator()
        .profile(identity.user_id())
        .await
        .map(Json)
}
