//! # JIMS (Jammer Installation Management System) auth service
//!
//! `jims` authenticates warehouse, operator, and admin users and gates every
//! API request on a signed identity token.
//!
//! ## Tokens
//!
//! Identity tokens are HS256 JWTs carrying `{id, email, role, organizationId}`.
//! They are stateless: a role change only takes effect once older tokens expire
//! or are revoked. Logout records the token in an in-process revocation
//! registry that forgets entries after 24 hours.
//!
//! ## Multi-factor authentication
//!
//! Users with MFA enabled receive a short-lived `mfaPending` token on login and
//! must exchange it, together with a one-time code (email, SMS) or a TOTP code,
//! for a full identity token.
//!
//! ## Authorization
//!
//! Roles are `admin`, `warehouse` and `operator`. Routes declare the set of
//! roles they accept; anything outside the set is answered with `403`.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
