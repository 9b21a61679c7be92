//! Auth configuration and shared state.

use chrono::Duration;
use std::sync::Arc;

use super::{
    authenticator::Authenticator,
    mfa::{sender::CodeSender, MfaManager},
    revocation::{RevocationRegistry, SweepTask},
    token::TokenCodec,
};
use crate::store::Store;

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_MFA_CODE_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_MFA_PENDING_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 30 * 60;
const DEFAULT_REVOCATION_SWEEP_SECONDS: u64 = 60 * 60;
const DEFAULT_REVOCATION_RETENTION_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_MFA_ISSUER: &str = "JIMS";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    token_ttl_seconds: i64,
    mfa_code_ttl_seconds: i64,
    mfa_pending_ttl_seconds: i64,
    mfa_login: bool,
    mfa_issuer: String,
    reset_token_ttl_seconds: i64,
    revocation_sweep_seconds: u64,
    revocation_retention_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url: frontend_base_url.trim_end_matches('/').to_string(),
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            mfa_code_ttl_seconds: DEFAULT_MFA_CODE_TTL_SECONDS,
            mfa_pending_ttl_seconds: DEFAULT_MFA_PENDING_TTL_SECONDS,
            mfa_login: true,
            mfa_issuer: DEFAULT_MFA_ISSUER.to_string(),
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            revocation_sweep_seconds: DEFAULT_REVOCATION_SWEEP_SECONDS,
            revocation_retention_seconds: DEFAULT_REVOCATION_RETENTION_SECONDS,
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_mfa_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.mfa_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_mfa_pending_ttl_seconds(mut self, seconds: i64) -> Self {
        self.mfa_pending_ttl_seconds = seconds;
        self
    }

    /// Whether accounts with MFA enabled must complete a second factor on login.
    #[must_use]
    pub fn with_mfa_login(mut self, enabled: bool) -> Self {
        self.mfa_login = enabled;
        self
    }

    #[must_use]
    pub fn with_mfa_issuer(mut self, issuer: String) -> Self {
        self.mfa_issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_revocation_sweep_seconds(mut self, seconds: u64) -> Self {
        self.revocation_sweep_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_revocation_retention_seconds(mut self, seconds: i64) -> Self {
        self.revocation_retention_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        Duration::seconds(self.token_ttl_seconds)
    }

    #[must_use]
    pub fn mfa_code_ttl(&self) -> Duration {
        Duration::seconds(self.mfa_code_ttl_seconds)
    }

    #[must_use]
    pub fn mfa_pending_ttl(&self) -> Duration {
        Duration::seconds(self.mfa_pending_ttl_seconds)
    }

    #[must_use]
    pub fn mfa_login(&self) -> bool {
        self.mfa_login
    }

    #[must_use]
    pub fn mfa_issuer(&self) -> &str {
        &self.mfa_issuer
    }

    #[must_use]
    pub fn reset_token_ttl(&self) -> Duration {
        Duration::seconds(self.reset_token_ttl_seconds)
    }

    #[must_use]
    pub fn revocation_sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.revocation_sweep_seconds.max(1))
    }

    #[must_use]
    pub fn revocation_retention(&self) -> Duration {
        Duration::seconds(self.revocation_retention_seconds)
    }
}

/// Everything request handlers and the gate need, shared behind an `Arc`.
pub struct AuthState {
    config: AuthConfig,
    codec: Arc<TokenCodec>,
    revocations: Arc<RevocationRegistry>,
    store: Arc<dyn Store>,
    authenticator: Authenticator,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        codec: TokenCodec,
        store: Arc<dyn Store>,
        sender: Arc<dyn CodeSender>,
    ) -> Self {
        let codec = Arc::new(codec.with_default_ttl(config.token_ttl()));
        let revocations = Arc::new(RevocationRegistry::new(config.revocation_retention()));
        let mfa = MfaManager::new(Arc::clone(&store), sender)
            .with_code_ttl(config.mfa_code_ttl())
            .with_issuer(config.mfa_issuer().to_string());
        let authenticator = Authenticator::new(
            config.clone(),
            Arc::clone(&store),
            Arc::clone(&codec),
            Arc::clone(&revocations),
            mfa,
        );

        Self {
            config,
            codec,
            revocations,
            store,
            authenticator,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    #[must_use]
    pub fn revocations(&self) -> &Arc<RevocationRegistry> {
        &self.revocations
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    #[must_use]
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Start the periodic revocation sweep.
    #[must_use]
    pub fn start_sweeper(&self) -> SweepTask {
        self.revocations
            .start(self.config.revocation_sweep_interval())
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("revocations", &self.revocations.len())
            .finish_non_exhaustive()
    }
}
