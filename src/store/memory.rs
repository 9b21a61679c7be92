use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    ChallengeStore, CredentialStore, MfaMethod, MfaSettings, NewUser, UserRecord,
};

#[derive(Clone, Debug)]
struct Challenge {
    user_id: i32,
    code: String,
    method: MfaMethod,
    expires_at: DateTime<Utc>,
    used: bool,
}

#[derive(Clone, Debug)]
struct ResetToken {
    user_id: i32,
    token_hash: String,
    expires_at: DateTime<Utc>,
    used: bool,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i32,
    users: HashMap<i32, UserRecord>,
    challenges: Vec<Challenge>,
    reset_tokens: Vec<ResetToken>,
}

/// Process-local store for tests and development.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed record, keeping its id.
    pub async fn insert_user(&self, user: UserRecord) {
        let mut inner = self.inner.write().await;
        inner.next_id = inner.next_id.max(user.id);
        inner.users.insert(user.id, user);
    }

    pub async fn set_active(&self, id: i32, active: bool) {
        if let Some(user) = self.inner.write().await.users.get_mut(&id) {
            user.is_active = active;
        }
    }

    /// Latest unused code issued to `user_id`, for driving MFA flows in tests.
    pub async fn latest_code(&self, user_id: i32) -> Option<String> {
        self.inner
            .read()
            .await
            .challenges
            .iter()
            .rev()
            .find(|c| c.user_id == user_id && !c.used)
            .map(|c| c.code.clone())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_user_by_id(&self, id: i32) -> Result<Option<UserRecord>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<Option<UserRecord>> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.email == user.email) {
            return Ok(None);
        }
        inner.next_id += 1;
        let record = UserRecord {
            id: inner.next_id,
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
            phone: user.phone,
            role: user.role,
            organization_id: user.organization_id,
            organization_name: None,
            is_active: true,
            email_verified: false,
            phone_verified: false,
            mfa_enabled: false,
            mfa_method: None,
            mfa_secret: None,
            last_login: None,
            created_at: Some(Utc::now()),
        };
        inner.users.insert(record.id, record.clone());
        Ok(Some(record))
    }

    async fn update_password(&self, id: i32, password_hash: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| anyhow!("user {id} not found"))?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn update_last_login(&self, id: i32, at: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.inner.write().await.users.get_mut(&id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn update_phone(&self, id: i32, phone: &str) -> Result<()> {
        if let Some(user) = self.inner.write().await.users.get_mut(&id) {
            user.phone = Some(phone.to_string());
        }
        Ok(())
    }

    async fn update_mfa(&self, id: i32, settings: MfaSettings) -> Result<()> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| anyhow!("user {id} not found"))?;
        user.mfa_enabled = settings.enabled;
        user.mfa_method = settings.method;
        user.mfa_secret = settings.secret;
        Ok(())
    }

    async fn insert_reset_token(
        &self,
        user_id: i32,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner.write().await.reset_tokens.push(ResetToken {
            user_id,
            token_hash: token_hash.to_string(),
            expires_at,
            used: false,
        });
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i32>> {
        let mut inner = self.inner.write().await;
        let token = inner
            .reset_tokens
            .iter_mut()
            .find(|t| t.token_hash == token_hash && !t.used && t.expires_at > now);
        Ok(token.map(|t| {
            t.used = true;
            t.user_id
        }))
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn insert_challenge(
        &self,
        user_id: i32,
        code: &str,
        method: MfaMethod,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner.write().await.challenges.push(Challenge {
            user_id,
            code: code.to_string(),
            method,
            expires_at,
            used: false,
        });
        Ok(())
    }

    async fn consume_challenge(
        &self,
        user_id: i32,
        code: &str,
        method: MfaMethod,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        // the write lock makes check-and-mark atomic
        let mut inner = self.inner.write().await;
        let challenge = inner.challenges.iter_mut().find(|c| {
            c.user_id == user_id
                && c.code == code
                && c.method == method
                && !c.used
                && c.expires_at > now
        });
        Ok(challenge.map_or(false, |c| {
            c.used = true;
            true
        }))
    }
}
