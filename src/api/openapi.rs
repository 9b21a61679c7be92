use super::handlers::{
    auth::{self, login, logout, mfa, password, profile, register},
    health,
};
use crate::{
    auth::{FieldError, Role},
    store::{MfaMethod, UserProfile},
};
use utoipa::{
    openapi::{
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
        Contact, License,
    },
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        login::login,
        login::verify_mfa,
        register::register,
        profile::profile,
        password::change_password,
        password::forgot_password,
        password::reset_password,
        logout::logout,
        mfa::setup_mfa,
        mfa::enable_totp,
        mfa::enable_mfa,
        mfa::disable_mfa,
    ),
    components(schemas(
        health::Health,
        auth::types::LoginRequest,
        auth::types::LoginResponse,
        auth::types::VerifyMfaRequest,
        auth::types::SessionResponse,
        auth::types::RegisterRequest,
        auth::types::RegisterResponse,
        auth::types::ChangePasswordRequest,
        auth::types::ForgotPasswordRequest,
        auth::types::ResetPasswordRequest,
        auth::types::SetupMfaRequest,
        auth::types::SetupMfaResponse,
        auth::types::EnableTotpRequest,
        auth::types::EnableMfaRequest,
        auth::types::MessageResponse,
        auth::types::ErrorResponse,
        UserProfile,
        Role,
        MfaMethod,
        FieldError,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Service health"),
        (name = "auth", description = "Login, registration and password management"),
        (name = "mfa", description = "Second-factor enrollment")
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// OpenAPI document with Cargo metadata as its info block.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
    doc.info.contact = cargo_contact();
    doc.info.license = cargo_license();
    doc
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            spec.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team JIMS"));
            assert_eq!(contact.email.as_deref(), Some("support@jims.com"));
        }

        let license = spec.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
        }
    }

    #[test]
    fn openapi_documents_auth_routes() {
        let spec = openapi();
        for path in [
            "/health",
            "/auth/login",
            "/auth/verify-mfa",
            "/auth/register",
            "/auth/profile",
            "/auth/change-password",
            "/auth/logout",
            "/auth/forgot-password",
            "/auth/reset-password",
            "/auth/setup-mfa",
            "/auth/enable-totp",
            "/auth/enable-mfa",
            "/auth/disable-mfa",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }

        let schemes = spec
            .components
            .map(|components| components.security_schemes)
            .unwrap_or_default();
        assert!(schemes.contains_key("bearer"));
    }

    #[test]
    fn author_parsing() {
        assert_eq!(
            parse_author("Team JIMS <support@jims.com>"),
            (Some("Team JIMS"), Some("support@jims.com"))
        );
        assert_eq!(parse_author("solo"), (Some("solo"), None));
        assert_eq!(parse_author("<a@b.c>"), (None, Some("a@b.c")));
    }
}
