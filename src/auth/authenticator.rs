//! Credential checks, login, and account lifecycle.
//!
//! Login moves through these states:
//!
//! ```text
//! AwaitingCredentials -> CredentialsValid -> Authenticated
//!                                         -> MfaRequired -> MfaVerified -> Authenticated
//!                     -> Rejected
//! ```
//!
//! `MfaRequired` is held by the client as a short-lived pending token, so no
//! server-side session exists between the two steps.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{
    error::AuthError,
    mfa::{
        sender::{Channel, Notification},
        MfaManager, Recipient, TotpEnrollment,
    },
    password,
    revocation::RevocationRegistry,
    role::Role,
    state::AuthConfig,
    token::{Subject, TokenCodec},
    utils::{build_reset_url, generate_reset_token, hash_reset_token},
};
use crate::store::{CredentialStore, MfaMethod, NewUser, Store, UserProfile, UserRecord};

/// Result of a successful password check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(Session),
    MfaRequired {
        temp_token: String,
        method: MfaMethod,
    },
}

/// Full identity token plus the user it was issued to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Clone, Debug)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub organization_id: Option<i32>,
}

/// What `setup_mfa` produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MfaSetup {
    Totp(TotpEnrollment),
    CodeSent(MfaMethod),
}

pub struct Authenticator {
    config: AuthConfig,
    store: Arc<dyn Store>,
    codec: Arc<TokenCodec>,
    revocations: Arc<RevocationRegistry>,
    mfa: MfaManager,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("config", &self.config)
            .field("mfa", &self.mfa)
            .finish_non_exhaustive()
    }
}

fn recipient(user: &UserRecord) -> Recipient<'_> {
    Recipient {
        name: &user.name,
        email: &user.email,
        phone: user.phone.as_deref(),
    }
}

/// Method used for the second step. An account flagged for MFA without a
/// usable method still gets a challenge, by email.
fn second_factor(user: &UserRecord) -> MfaMethod {
    user.mfa_method.unwrap_or_else(|| {
        warn!(user_id = user.id, "MFA enabled without a method, falling back to email");
        MfaMethod::Email
    })
}

fn subject(user: &UserRecord) -> Subject {
    Subject {
        id: user.id,
        email: user.email.clone(),
        role: user.role,
        organization_id: user.organization_id,
    }
}

impl Authenticator {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn Store>,
        codec: Arc<TokenCodec>,
        revocations: Arc<RevocationRegistry>,
        mfa: MfaManager,
    ) -> Self {
        Self {
            config,
            store,
            codec,
            revocations,
            mfa,
        }
    }

    #[must_use]
    pub fn mfa(&self) -> &MfaManager {
        &self.mfa
    }

    /// Check credentials and either issue a token or start an MFA challenge.
    ///
    /// Unknown email, inactive account and wrong password are indistinguishable
    /// to the caller.
    ///
    /// # Errors
    /// `InvalidCredentials`, `Delivery` if the MFA code cannot be sent,
    /// `Internal` on store failures.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            debug!("login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !user.is_active {
            debug!(user_id = user.id, "login for inactive account");
            return Err(AuthError::InvalidCredentials);
        }

        if !password::verify_blocking(password.to_string(), user.password_hash.clone()).await? {
            debug!(user_id = user.id, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        if password::needs_rehash(&user.password_hash) {
            self.upgrade_hash(user.id, password).await;
        }

        if user.mfa_enabled && self.config.mfa_login() {
            let method = second_factor(&user);
            if method != MfaMethod::Totp {
                self.mfa.send_code(user.id, method, recipient(&user)).await?;
            }
            let temp_token =
                self.codec
                    .issue_pending(user.id, &user.email, self.config.mfa_pending_ttl())?;
            info!(user_id = user.id, %method, "login awaiting second factor");
            return Ok(LoginOutcome::MfaRequired { temp_token, method });
        }

        let session = self.authenticated(&user).await?;
        info!(user_id = user.id, "login succeeded");
        Ok(LoginOutcome::Authenticated(session))
    }

    /// Exchange a pending token and a second-factor code for a full token.
    ///
    /// # Errors
    /// `InvalidPendingToken` for a bad pending token, code errors from the
    /// MFA manager, `InvalidCredentials` if the account went away or was
    /// deactivated in between.
    #[instrument(skip(self, temp_token, code))]
    pub async fn complete_mfa(
        &self,
        temp_token: &str,
        code: &str,
        method: MfaMethod,
    ) -> Result<Session, AuthError> {
        let pending = self
            .codec
            .verify_pending(temp_token)
            .map_err(|_| AuthError::InvalidPendingToken)?;

        let user = self
            .store
            .find_user_by_id(pending.id)
            .await?
            .filter(|user| user.is_active)
            .ok_or(AuthError::InvalidCredentials)?;

        if second_factor(&user) != method {
            warn!(user_id = user.id, %method, "second factor method mismatch");
            return Err(AuthError::InvalidOrExpiredCode);
        }

        self.mfa.verify_code(user.id, code, method).await?;

        let session = self.authenticated(&user).await?;
        info!(user_id = user.id, "MFA login succeeded");
        Ok(session)
    }

    /// Replace a legacy hash with Argon2id. Failures leave the old hash usable.
    async fn upgrade_hash(&self, user_id: i32, password: &str) {
        let upgraded = match password::hash_blocking(password.to_string()).await {
            Ok(hash) => self.store.update_password(user_id, &hash).await,
            Err(err) => Err(err),
        };
        match upgraded {
            Ok(()) => debug!(user_id, "password hash upgraded to argon2id"),
            Err(err) => warn!(user_id, "failed to upgrade password hash: {err:#}"),
        }
    }

    async fn authenticated(&self, user: &UserRecord) -> Result<Session, AuthError> {
        let now = Utc::now();
        self.store.update_last_login(user.id, now).await?;
        let token = self.codec.issue(&subject(user))?;
        let mut profile = user.profile();
        profile.last_login = Some(now);
        Ok(Session {
            token,
            user: profile,
        })
    }

    /// Create an account and send a best-effort welcome notice.
    ///
    /// # Errors
    /// `UserExists` when the email is taken, `Internal` otherwise.
    #[instrument(skip(self, input), fields(email = %input.email, role = %input.role))]
    pub async fn register(
        &self,
        input: Registration,
        created_by: Option<i32>,
    ) -> Result<UserProfile, AuthError> {
        if self.store.find_user_by_email(&input.email).await?.is_some() {
            return Err(AuthError::UserExists);
        }

        let password_hash = password::hash_blocking(input.password).await?;
        let user = self
            .store
            .create_user(NewUser {
                email: input.email,
                password_hash,
                name: input.name,
                phone: input.phone,
                role: input.role,
                organization_id: input.organization_id,
                created_by,
            })
            .await?
            .ok_or(AuthError::UserExists)?;

        self.welcome(&user).await;
        info!(user_id = user.id, "user registered");
        Ok(user.profile())
    }

    async fn welcome(&self, user: &UserRecord) {
        let sender = self.mfa.sender();
        let email = Notification::welcome(Channel::Email, &user.email, &user.name);
        if let Err(err) = sender.send(&email).await {
            warn!(user_id = user.id, "welcome email failed: {err:#}");
        }
        if let Some(phone) = user.phone.as_deref() {
            let sms = Notification::welcome(Channel::Sms, phone, &user.name);
            if let Err(err) = sender.send(&sms).await {
                warn!(user_id = user.id, "welcome SMS failed: {err:#}");
            }
        }
    }

    /// # Errors
    /// `UserNotFound` if the account no longer exists.
    pub async fn profile(&self, user_id: i32) -> Result<UserProfile, AuthError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .map(|user| user.profile())
            .ok_or(AuthError::UserNotFound)
    }

    /// # Errors
    /// `CurrentPasswordIncorrect` leaves the stored hash unchanged.
    #[instrument(skip(self, current, new))]
    pub async fn change_password(
        &self,
        user_id: i32,
        current: &str,
        new: &str,
    ) -> Result<(), AuthError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !password::verify_blocking(current.to_string(), user.password_hash).await? {
            return Err(AuthError::CurrentPasswordIncorrect);
        }

        let hash = password::hash_blocking(new.to_string()).await?;
        self.store.update_password(user_id, &hash).await?;
        info!(user_id, "password changed");
        Ok(())
    }

    /// Revoke the presented identity token.
    pub fn logout(&self, token: &str) {
        self.revocations.revoke(token);
        debug!("token revoked");
    }

    /// Send a reset link if the email belongs to an active account.
    ///
    /// Unknown addresses and delivery failures look the same to the caller.
    ///
    /// # Errors
    /// `Internal` on store or RNG failures.
    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let Some(user) = self
            .store
            .find_user_by_email(email)
            .await?
            .filter(|user| user.is_active)
        else {
            debug!("password reset requested for unknown or inactive account");
            return Ok(());
        };

        let token = generate_reset_token()?;
        let ttl = self.config.reset_token_ttl();
        self.store
            .insert_reset_token(user.id, &hash_reset_token(&token), Utc::now() + ttl)
            .await?;

        let link = build_reset_url(self.config.frontend_base_url(), &token);
        let notice =
            Notification::password_reset(&user.email, &user.name, &link, ttl.num_minutes());
        if let Err(err) = self.mfa.sender().send(&notice).await {
            warn!(user_id = user.id, "password reset email failed: {err:#}");
        }
        Ok(())
    }

    /// # Errors
    /// `InvalidResetToken` for unknown, used or expired tokens.
    #[instrument(skip(self, token, new_password))]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        let user_id = self
            .store
            .consume_reset_token(&hash_reset_token(token), Utc::now())
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        let hash = password::hash_blocking(new_password.to_string()).await?;
        self.store.update_password(user_id, &hash).await?;
        info!(user_id, "password reset");
        Ok(())
    }

    /// Begin enrolling a second factor.
    ///
    /// TOTP returns fresh enrollment material; email and SMS send a code that
    /// `enable_mfa` later confirms.
    ///
    /// # Errors
    /// `UserNotFound`, `Validation` for SMS without a phone, `Delivery`.
    pub async fn setup_mfa(
        &self,
        user_id: i32,
        method: MfaMethod,
        phone: Option<&str>,
    ) -> Result<MfaSetup, AuthError> {
        let mut user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if method == MfaMethod::Totp {
            return self.mfa.generate_totp_secret(&user.email).map(MfaSetup::Totp);
        }

        if let (MfaMethod::Sms, Some(phone)) = (method, phone) {
            self.store.update_phone(user_id, phone).await?;
            user.phone = Some(phone.to_string());
        }

        self.mfa.send_code(user_id, method, recipient(&user)).await?;
        Ok(MfaSetup::CodeSent(method))
    }

    /// Confirm a TOTP enrollment and store its secret.
    ///
    /// # Errors
    /// `InvalidTotpCode` when the code does not match `secret`.
    pub async fn enable_totp(&self, user_id: i32, secret: &str, code: &str) -> Result<(), AuthError> {
        if !self.mfa.verify_totp_secret(secret, code) {
            return Err(AuthError::InvalidTotpCode);
        }
        self.mfa
            .enable_mfa(user_id, MfaMethod::Totp, Some(secret.trim().to_string()))
            .await?;
        info!(user_id, "TOTP enabled");
        Ok(())
    }

    /// Confirm an email/SMS enrollment code and turn MFA on.
    ///
    /// # Errors
    /// Code errors from the MFA manager.
    pub async fn enable_mfa(&self, user_id: i32, code: &str, method: MfaMethod) -> Result<(), AuthError> {
        self.mfa.verify_code(user_id, code, method).await?;
        let secret = if method == MfaMethod::Totp {
            self.store
                .find_user_by_id(user_id)
                .await?
                .and_then(|user| user.mfa_secret)
        } else {
            None
        };
        self.mfa.enable_mfa(user_id, method, secret).await?;
        info!(user_id, %method, "MFA enabled");
        Ok(())
    }

    /// # Errors
    /// `Internal` on store failures.
    pub async fn disable_mfa(&self, user_id: i32) -> Result<(), AuthError> {
        self.mfa.disable_mfa(user_id).await?;
        info!(user_id, "MFA disabled");
        Ok(())
    }
}
