use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_NOTIFY_WEBHOOK_URL: &str = "notify-webhook-url";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_mfa_args(command);
    with_account_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("Secret used to sign identity tokens (at least 32 bytes)")
                .env("JIMS_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("token-ttl-seconds")
                .long("token-ttl-seconds")
                .help("Identity token lifetime in seconds")
                .env("JIMS_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("revocation-sweep-seconds")
                .long("revocation-sweep-seconds")
                .help("Interval between sweeps of the revoked-token registry")
                .env("JIMS_REVOCATION_SWEEP_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("revocation-retention-seconds")
                .long("revocation-retention-seconds")
                .help("How long a revoked token is remembered")
                .env("JIMS_REVOCATION_RETENTION_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}

fn with_mfa_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("mfa-login")
                .long("mfa-login")
                .help("Require the second factor on login for accounts with MFA enabled")
                .env("JIMS_MFA_LOGIN")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new("mfa-code-ttl-seconds")
                .long("mfa-code-ttl-seconds")
                .help("Lifetime of email/SMS one-time codes in seconds")
                .env("JIMS_MFA_CODE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("mfa-pending-ttl-seconds")
                .long("mfa-pending-ttl-seconds")
                .help("Lifetime of the temporary token issued while MFA is pending")
                .env("JIMS_MFA_PENDING_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("mfa-issuer")
                .long("mfa-issuer")
                .help("Issuer name shown in authenticator apps")
                .env("JIMS_MFA_ISSUER")
                .default_value("JIMS"),
        )
}

fn with_account_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for CORS and password reset links")
                .env("JIMS_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new("reset-token-ttl-seconds")
                .long("reset-token-ttl-seconds")
                .help("Password reset link lifetime in seconds")
                .env("JIMS_RESET_TOKEN_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_NOTIFY_WEBHOOK_URL)
                .long(ARG_NOTIFY_WEBHOOK_URL)
                .help("Webhook that delivers email/SMS notifications; logged only when unset")
                .env("JIMS_NOTIFY_WEBHOOK_URL"),
        )
}

/// Parsed auth arguments.
#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub revocation_sweep_seconds: u64,
    pub revocation_retention_seconds: i64,
    pub mfa_login: bool,
    pub mfa_code_ttl_seconds: i64,
    pub mfa_pending_ttl_seconds: i64,
    pub mfa_issuer: String,
    pub frontend_base_url: String,
    pub reset_token_ttl_seconds: i64,
    pub notify_webhook_url: Option<Url>,
}

fn required<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> Result<T> {
    matches
        .get_one::<T>(id)
        .cloned()
        .with_context(|| format!("missing required argument: --{id}"))
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing or the webhook URL is invalid.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let notify_webhook_url = matches
            .get_one::<String>(ARG_NOTIFY_WEBHOOK_URL)
            .map(|url| Url::parse(url).with_context(|| format!("invalid --{ARG_NOTIFY_WEBHOOK_URL}: {url}")))
            .transpose()?;

        Ok(Self {
            jwt_secret: SecretString::from(required::<String>(matches, ARG_JWT_SECRET)?),
            token_ttl_seconds: required(matches, "token-ttl-seconds")?,
            revocation_sweep_seconds: required(matches, "revocation-sweep-seconds")?,
            revocation_retention_seconds: required(matches, "revocation-retention-seconds")?,
            mfa_login: required(matches, "mfa-login")?,
            mfa_code_ttl_seconds: required(matches, "mfa-code-ttl-seconds")?,
            mfa_pending_ttl_seconds: required(matches, "mfa-pending-ttl-seconds")?,
            mfa_issuer: required(matches, "mfa-issuer")?,
            frontend_base_url: required(matches, ARG_FRONTEND_BASE_URL)?,
            reset_token_ttl_seconds: required(matches, "reset-token-ttl-seconds")?,
            notify_webhook_url,
        })
    }
}
