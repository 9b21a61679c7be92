//! User-record and MFA-challenge persistence.
//!
//! The auth core only talks to the [`CredentialStore`] and [`ChallengeStore`]
//! traits. [`PgStore`] backs them with PostgreSQL; [`MemoryStore`] keeps
//! everything in process for tests and local development.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::auth::role::Role;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Second factor configured for an account.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MfaMethod {
    Email,
    Sms,
    Totp,
}

impl MfaMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Totp => "totp",
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Option<Self> {
        match value.trim() {
            "email" => Some(Self::Email),
            "sms" => Some(Self::Sms),
            "totp" => Some(Self::Totp),
            _ => None,
        }
    }
}

impl fmt::Display for MfaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full user row, including secrets. Never serialized to clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i32,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub organization_id: Option<i32>,
    pub organization_name: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub mfa_enabled: bool,
    pub mfa_method: Option<MfaMethod>,
    pub mfa_secret: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    #[must_use]
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            phone: self.phone.clone(),
            role: self.role,
            organization_id: self.organization_id,
            organization_name: self.organization_name.clone(),
            is_active: self.is_active,
            email_verified: self.email_verified,
            phone_verified: self.phone_verified,
            mfa_enabled: self.mfa_enabled,
            mfa_method: self.mfa_method,
            last_login: self.last_login,
            created_at: self.created_at,
        }
    }
}

/// User fields safe to return to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i32,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub organization_id: Option<i32>,
    pub organization_name: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub mfa_enabled: bool,
    pub mfa_method: Option<MfaMethod>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub organization_id: Option<i32>,
    pub created_by: Option<i32>,
}

/// MFA setting written in one update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MfaSettings {
    pub enabled: bool,
    pub method: Option<MfaMethod>,
    pub secret: Option<String>,
}

impl MfaSettings {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            method: None,
            secret: None,
        }
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Check the backend is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Exact, case-sensitive lookup.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    async fn find_user_by_id(&self, id: i32) -> Result<Option<UserRecord>>;

    /// Insert a user. Returns `None` when the email is already taken.
    async fn create_user(&self, user: NewUser) -> Result<Option<UserRecord>>;

    async fn update_password(&self, id: i32, password_hash: &str) -> Result<()>;

    async fn update_last_login(&self, id: i32, at: DateTime<Utc>) -> Result<()>;

    async fn update_phone(&self, id: i32, phone: &str) -> Result<()>;

    async fn update_mfa(&self, id: i32, settings: MfaSettings) -> Result<()>;

    async fn insert_reset_token(
        &self,
        user_id: i32,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Mark an unused, unexpired reset token used and return its owner.
    async fn consume_reset_token(&self, token_hash: &str, now: DateTime<Utc>)
        -> Result<Option<i32>>;
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn insert_challenge(
        &self,
        user_id: i32,
        code: &str,
        method: MfaMethod,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Atomically mark a matching unused, unexpired challenge used.
    ///
    /// Returns `false` when nothing matched.
    async fn consume_challenge(
        &self,
        user_id: i32,
        code: &str,
        method: MfaMethod,
        now: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Convenience bound for a backend that serves both traits.
pub trait Store: CredentialStore + ChallengeStore {}

impl<T: CredentialStore + ChallengeStore> Store for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mfa_method_db_text() {
        for method in [MfaMethod::Email, MfaMethod::Sms, MfaMethod::Totp] {
            assert_eq!(MfaMethod::from_db(method.as_str()), Some(method));
        }
        assert_eq!(MfaMethod::from_db("pigeon"), None);
    }

    #[test]
    fn profile_omits_secrets() -> Result<()> {
        let record = UserRecord {
            id: 1,
            email: "a@x.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            name: "Ann".to_string(),
            phone: None,
            role: Role::Admin,
            organization_id: None,
            organization_name: None,
            is_active: true,
            email_verified: false,
            phone_verified: false,
            mfa_enabled: true,
            mfa_method: Some(MfaMethod::Totp),
            mfa_secret: Some("JBSWY3DPEHPK3PXP".to_string()),
            last_login: None,
            created_at: None,
        };
        let json = serde_json::to_value(record.profile())?;
        assert!(json.get("password").is_none());
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("mfaSecret").is_none());
        assert_eq!(json["mfaMethod"], "totp");
        assert_eq!(json["organizationId"], serde_json::Value::Null);
        Ok(())
    }
}
