//! Request gate and per-route role checks.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    error::AuthError,
    role::{Role, RoleSet},
    state::AuthState,
    token::Claims,
    utils::extract_bearer_token,
};

/// Paths reachable without a token.
pub const PUBLIC_PATHS: [&str; 6] = [
    "/",
    "/health",
    "/auth/login",
    "/auth/verify-mfa",
    "/auth/forgot-password",
    "/auth/reset-password",
];

const DOCS_PREFIX: &str = "/docs";

#[must_use]
pub fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
        || path == DOCS_PREFIX
        || path
            .strip_prefix(DOCS_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Verified caller, attached to the request by [`gate`].
#[derive(Clone, Debug)]
pub struct Identity {
    pub claims: Claims,
    pub token: String,
}

impl Identity {
    #[must_use]
    pub fn user_id(&self) -> i32 {
        self.claims.id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.claims.role
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(AuthError::Unauthorized)
    }
}

fn authenticate(state: &AuthState, headers: &HeaderMap) -> Result<Identity, AuthError> {
    let token = extract_bearer_token(headers).ok_or(AuthError::Unauthorized)?;

    if state.revocations().is_revoked(token) {
        return Err(AuthError::TokenRevoked);
    }

    let claims = state.codec().verify(token).map_err(|err| {
        debug!("token rejected: {err}");
        AuthError::Unauthorized
    })?;

    Ok(Identity {
        claims,
        token: token.to_string(),
    })
}

/// Reject unauthenticated requests outside the public allow-list.
pub async fn gate(
    State(state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if is_public(request.uri().path()) {
        return next.run(request).await;
    }

    match authenticate(&state, request.headers()) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// State for [`check_roles`]: the roles a route accepts.
#[derive(Clone, Debug)]
pub struct RoleGuard {
    state: Arc<AuthState>,
    roles: RoleSet,
}

/// Guard a route so only `roles` may call it.
///
/// ```ignore
/// router.route_layer(middleware::from_fn_with_state(
///     require_roles(state.clone(), RoleSet::of(&[Role::Admin])),
///     check_roles,
/// ))
/// ```
#[must_use]
pub fn require_roles(state: Arc<AuthState>, roles: RoleSet) -> RoleGuard {
    RoleGuard { state, roles }
}

/// Route layer behind [`require_roles`].
///
/// Re-verifies the token, so it is safe on routes outside the gate too.
pub async fn check_roles(
    State(guard): State<RoleGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = match request.extensions().get::<Identity>() {
        Some(identity) => identity.clone(),
        None => match authenticate(&guard.state, request.headers()) {
            Ok(identity) => identity,
            Err(err) => return err.into_response(),
        },
    };

    if !guard.roles.contains(identity.role()) {
        warn!(
            user_id = identity.user_id(),
            role = %identity.role(),
            "role not permitted"
        );
        return AuthError::Forbidden.into_response();
    }

    request.extensions_mut().insert(identity);
    next.run(request).await
}
