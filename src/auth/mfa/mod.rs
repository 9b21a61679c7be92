//! MFA challenges over email, SMS and TOTP.
//!
//! Email and SMS codes are six random digits persisted as a challenge row and
//! consumed exactly once. TOTP codes are checked against the user's base32
//! secret with two steps of drift on either side.

pub mod sender;
pub mod totp;

use chrono::{Duration, Utc};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::error::AuthError;
use crate::store::{CredentialStore, MfaMethod, MfaSettings, Store};
use sender::{Channel, CodeSender, Notification};
pub use totp::TotpEnrollment;

pub const DEFAULT_CODE_TTL_SECONDS: i64 = 300;
pub const DEFAULT_ISSUER: &str = "JIMS";

/// Six-digit numeric code, uniform in `100000..=999999`.
#[must_use]
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

/// Where a code for one user goes.
#[derive(Clone, Copy, Debug)]
pub struct Recipient<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: Option<&'a str>,
}

pub struct MfaManager {
    store: Arc<dyn Store>,
    sender: Arc<dyn CodeSender>,
    code_ttl: Duration,
    issuer: String,
    skew: u8,
}

impl std::fmt::Debug for MfaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MfaManager")
            .field("code_ttl", &self.code_ttl)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl MfaManager {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, sender: Arc<dyn CodeSender>) -> Self {
        Self {
            store,
            sender,
            code_ttl: Duration::seconds(DEFAULT_CODE_TTL_SECONDS),
            issuer: DEFAULT_ISSUER.to_string(),
            skew: totp::DEFAULT_SKEW,
        }
    }

    #[must_use]
    pub fn with_code_ttl(mut self, ttl: Duration) -> Self {
        self.code_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn sender(&self) -> &Arc<dyn CodeSender> {
        &self.sender
    }

    /// Persist a fresh challenge and dispatch it.
    ///
    /// # Errors
    /// `Validation` for TOTP or a missing phone number, `Delivery` when the
    /// sender fails, `Internal` on store failures.
    #[instrument(skip(self, recipient))]
    pub async fn send_code(
        &self,
        user_id: i32,
        method: MfaMethod,
        recipient: Recipient<'_>,
    ) -> Result<(), AuthError> {
        let (channel, destination) = match method {
            MfaMethod::Email => (Channel::Email, recipient.email),
            MfaMethod::Sms => {
                let phone = recipient
                    .phone
                    .filter(|p| !p.trim().is_empty())
                    .ok_or_else(|| AuthError::invalid("phone", "Phone number is required"))?;
                (Channel::Sms, phone)
            }
            MfaMethod::Totp => {
                return Err(AuthError::invalid("method", "Unsupported MFA method"));
            }
        };

        let code = generate_code();
        let expires_at = Utc::now() + self.code_ttl;
        self.store
            .insert_challenge(user_id, &code, method, expires_at)
            .await?;

        let notification = Notification::mfa_code(
            channel,
            destination,
            recipient.name,
            &code,
            self.code_ttl.num_minutes().max(1),
        );
        self.sender
            .send(&notification)
            .await
            .map_err(|e| AuthError::Delivery(format!("{e:#}")))?;

        debug!("MFA code dispatched");
        Ok(())
    }

    /// Verify a submitted code for `user_id`.
    ///
    /// # Errors
    /// `InvalidOrExpiredCode` when no email/SMS challenge matches,
    /// `MfaNotConfigured` for TOTP without a secret, `InvalidTotpCode` for a
    /// wrong TOTP code.
    #[instrument(skip(self, code))]
    pub async fn verify_code(
        &self,
        user_id: i32,
        code: &str,
        method: MfaMethod,
    ) -> Result<(), AuthError> {
        match method {
            MfaMethod::Totp => {
                let user = self.store.find_user_by_id(user_id).await?;
                let secret = user
                    .and_then(|u| u.mfa_secret)
                    .ok_or(AuthError::MfaNotConfigured)?;
                if totp::verify(&secret, code, self.skew) {
                    Ok(())
                } else {
                    warn!("TOTP code rejected");
                    Err(AuthError::InvalidTotpCode)
                }
            }
            MfaMethod::Email | MfaMethod::Sms => {
                if self
                    .store
                    .consume_challenge(user_id, code.trim(), method, Utc::now())
                    .await?
                {
                    Ok(())
                } else {
                    warn!("MFA challenge rejected");
                    Err(AuthError::InvalidOrExpiredCode)
                }
            }
        }
    }

    /// New TOTP secret with its `otpauth://` URL and QR code.
    ///
    /// # Errors
    /// Returns `Internal` if the secret or QR image cannot be produced.
    pub fn generate_totp_secret(&self, email: &str) -> Result<TotpEnrollment, AuthError> {
        totp::generate(&self.issuer, email).map_err(AuthError::Internal)
    }

    #[must_use]
    pub fn verify_totp_secret(&self, secret: &str, code: &str) -> bool {
        totp::verify(secret, code, self.skew)
    }

    /// # Errors
    /// Returns `Internal` on store failures.
    pub async fn enable_mfa(
        &self,
        user_id: i32,
        method: MfaMethod,
        secret: Option<String>,
    ) -> Result<(), AuthError> {
        let secret = match method {
            MfaMethod::Totp => secret,
            // keep an existing TOTP secret out of email/SMS accounts
            MfaMethod::Email | MfaMethod::Sms => None,
        };
        self.store
            .update_mfa(
                user_id,
                MfaSettings {
                    enabled: true,
                    method: Some(method),
                    secret,
                },
            )
            .await?;
        Ok(())
    }

    /// Clear the MFA flag, method and secret together.
    ///
    /// # Errors
    /// Returns `Internal` on store failures.
    pub async fn disable_mfa(&self, user_id: i32) -> Result<(), AuthError> {
        self.store
            .update_mfa(user_id, MfaSettings::disabled())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::role::Role;
    use crate::store::{MemoryStore, UserRecord};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox(Mutex<Vec<Notification>>);

    #[async_trait]
    impl CodeSender for Outbox {
        async fn send(&self, notification: &Notification) -> Result<()> {
            self.0
                .lock()
                .map_err(|_| anyhow::anyhow!("poisoned"))?
                .push(notification.clone());
            Ok(())
        }
    }

    struct FailingSender;

    #[async_trait]
    impl CodeSender for FailingSender {
        async fn send(&self, _: &Notification) -> Result<()> {
            anyhow::bail!("gateway down")
        }
    }

    fn user(id: i32) -> UserRecord {
        UserRecord {
            id,
            email: "a@x.com".to_string(),
            password_hash: String::new(),
            name: "Ann".to_string(),
            phone: Some("+15550100".to_string()),
            role: Role::Operator,
            organization_id: None,
            organization_name: None,
            is_active: true,
            email_verified: true,
            phone_verified: false,
            mfa_enabled: false,
            mfa_method: None,
            mfa_secret: None,
            last_login: None,
            created_at: None,
        }
    }

    fn recipient() -> Recipient<'static> {
        Recipient {
            name: "Ann",
            email: "a@x.com",
            phone: Some("+15550100"),
        }
    }

    async fn manager() -> (MfaManager, Arc<MemoryStore>, Arc<Outbox>) {
        let store = Arc::new(MemoryStore::new());
        store.insert_user(user(1)).await;
        let outbox = Arc::new(Outbox::default());
        let manager = MfaManager::new(store.clone(), outbox.clone());
        (manager, store, outbox)
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..1000 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().unwrap_or_default();
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[tokio::test]
    async fn email_code_is_sent_and_verifies_once() -> Result<()> {
        let (manager, store, outbox) = manager().await;
        manager.send_code(1, MfaMethod::Email, recipient()).await?;

        let code = store.latest_code(1).await.unwrap_or_default();
        {
            let sent = outbox.0.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].to, "a@x.com");
            assert!(sent[0].body.contains(&code));
        }

        manager.verify_code(1, &code, MfaMethod::Email).await?;
        assert!(matches!(
            manager.verify_code(1, &code, MfaMethod::Email).await,
            Err(AuthError::InvalidOrExpiredCode)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn code_for_other_method_is_rejected() -> Result<()> {
        let (manager, store, _) = manager().await;
        manager.send_code(1, MfaMethod::Sms, recipient()).await?;
        let code = store.latest_code(1).await.unwrap_or_default();
        assert!(matches!(
            manager.verify_code(1, &code, MfaMethod::Email).await,
            Err(AuthError::InvalidOrExpiredCode)
        ));
        manager.verify_code(1, &code, MfaMethod::Sms).await?;
        Ok(())
    }

    #[tokio::test]
    async fn expired_code_is_rejected() -> Result<()> {
        let (manager, store, _) = manager().await;
        let manager = manager.with_code_ttl(Duration::seconds(-1));
        manager.send_code(1, MfaMethod::Email, recipient()).await?;
        let code = store.latest_code(1).await.unwrap_or_default();
        assert!(matches!(
            manager.verify_code(1, &code, MfaMethod::Email).await,
            Err(AuthError::InvalidOrExpiredCode)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn totp_cannot_be_sent() -> Result<()> {
        let (manager, _, _) = manager().await;
        let result = manager.send_code(1, MfaMethod::Totp, recipient()).await;
        assert!(matches!(result, Err(AuthError::Validation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn sms_without_phone_is_rejected() -> Result<()> {
        let (manager, _, _) = manager().await;
        let mut to = recipient();
        to.phone = None;
        let result = manager.send_code(1, MfaMethod::Sms, to).await;
        assert!(matches!(result, Err(AuthError::Validation(_))));
        Ok(())
    }

    #[tokio::test]
    async fn delivery_failure_is_reported() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let manager = MfaManager::new(store, Arc::new(FailingSender));
        let result = manager.send_code(1, MfaMethod::Email, recipient()).await;
        assert!(matches!(result, Err(AuthError::Delivery(_))));
        Ok(())
    }

    #[tokio::test]
    async fn totp_without_secret_is_not_configured() -> Result<()> {
        let (manager, _, _) = manager().await;
        assert!(matches!(
            manager.verify_code(1, "123456", MfaMethod::Totp).await,
            Err(AuthError::MfaNotConfigured)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn totp_enrollment_then_verification() -> Result<()> {
        let (manager, store, _) = manager().await;
        let enrollment = manager.generate_totp_secret("a@x.com")?;
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        let code = totp::code_at(&enrollment.secret, now).unwrap_or_default();
        assert!(manager.verify_totp_secret(&enrollment.secret, &code));

        manager
            .enable_mfa(1, MfaMethod::Totp, Some(enrollment.secret.clone()))
            .await?;
        manager.verify_code(1, &code, MfaMethod::Totp).await?;

        let wrong = if code == "000000" { "111111" } else { "000000" };
        assert!(matches!(
            manager.verify_code(1, wrong, MfaMethod::Totp).await,
            Err(AuthError::InvalidTotpCode)
        ));

        manager.disable_mfa(1).await?;
        let record = store.find_user_by_id(1).await?;
        let record = record.ok_or_else(|| anyhow::anyhow!("missing user"))?;
        assert!(!record.mfa_enabled);
        assert_eq!(record.mfa_method, None);
        assert_eq!(record.mfa_secret, None);
        Ok(())
    }
}
