//! `/auth/*` endpoints.
//!
//! Handlers validate the body, call into the [`Authenticator`] and turn its
//! [`AuthError`]s into responses. Identity comes from the request gate.
//!
//! [`Authenticator`]: crate::auth::Authenticator

pub mod login;
pub mod logout;
pub mod mfa;
pub mod password;
pub mod profile;
pub mod register;
pub mod types;

use axum::Json;

use crate::auth::AuthError;

/// Unwrap an optional JSON body, answering 400 when it is missing or malformed.
pub(crate) fn require_payload<T>(payload: Option<Json<T>>) -> Result<T, AuthError> {
    payload
        .map(|Json(body)| body)
        .ok_or_else(|| AuthError::invalid("body", "Missing or malformed payload"))
}
