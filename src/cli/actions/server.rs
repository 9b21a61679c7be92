use crate::{
    api,
    auth::{
        mfa::sender::{CodeSender, LogCodeSender, WebhookCodeSender},
        AuthConfig, TokenCodec,
    },
    cli::{commands::auth::Options, telemetry},
};
use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub auth: Options,
}

/// A revoked token must stay in the registry until it would have expired.
fn check_lifetimes(options: &Options) -> Result<()> {
    if options.token_ttl_seconds > options.revocation_retention_seconds {
        bail!(
            "--token-ttl-seconds ({}) must not exceed --revocation-retention-seconds ({})",
            options.token_ttl_seconds,
            options.revocation_retention_seconds
        );
    }
    Ok(())
}

/// Build the auth configuration from parsed options.
fn auth_config(options: &Options) -> AuthConfig {
    AuthConfig::new(options.frontend_base_url.clone())
        .with_token_ttl_seconds(options.token_ttl_seconds)
        .with_mfa_code_ttl_seconds(options.mfa_code_ttl_seconds)
        .with_mfa_pending_ttl_seconds(options.mfa_pending_ttl_seconds)
        .with_mfa_login(options.mfa_login)
        .with_mfa_issuer(options.mfa_issuer.clone())
        .with_reset_token_ttl_seconds(options.reset_token_ttl_seconds)
        .with_revocation_sweep_seconds(options.revocation_sweep_seconds)
        .with_revocation_retention_seconds(options.revocation_retention_seconds)
}

fn code_sender(options: &Options) -> Result<Arc<dyn CodeSender>> {
    match &options.notify_webhook_url {
        Some(url) => {
            info!("delivering notifications via {url}");
            Ok(Arc::new(WebhookCodeSender::new(url.clone())?))
        }
        None => {
            warn!("no notification webhook configured, codes will only be logged");
            Ok(Arc::new(LogCodeSender))
        }
    }
}

/// Run the HTTP server until a shutdown signal arrives.
///
/// # Errors
/// Returns an error if the signing secret is unusable or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    check_lifetimes(&args.auth)?;
    let codec = TokenCodec::new(&args.auth.jwt_secret).context("invalid --jwt-secret")?;
    let config = auth_config(&args.auth);
    let sender = code_sender(&args.auth)?;

    let result = api::new(args.port, args.dsn, config, codec, sender).await;

    telemetry::shutdown_tracer();

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(secret: &str) -> Options {
        Options {
            jwt_secret: SecretString::from(secret.to_string()),
            token_ttl_seconds: 120,
            revocation_sweep_seconds: 30,
            revocation_retention_seconds: 600,
            mfa_login: false,
            mfa_code_ttl_seconds: 60,
            mfa_pending_ttl_seconds: 90,
            mfa_issuer: "Acme".to_string(),
            frontend_base_url: "https://app.jims.example/".to_string(),
            reset_token_ttl_seconds: 900,
            notify_webhook_url: None,
        }
    }

    #[test]
    fn config_follows_options() {
        let config = auth_config(&options("0123456789abcdef0123456789abcdef"));
        assert_eq!(config.frontend_base_url(), "https://app.jims.example");
        assert_eq!(config.token_ttl().num_seconds(), 120);
        assert_eq!(config.mfa_code_ttl().num_seconds(), 60);
        assert_eq!(config.mfa_pending_ttl().num_seconds(), 90);
        assert!(!config.mfa_login());
        assert_eq!(config.mfa_issuer(), "Acme");
        assert_eq!(config.reset_token_ttl().num_seconds(), 900);
        assert_eq!(config.revocation_sweep_interval().as_secs(), 30);
        assert_eq!(config.revocation_retention().num_seconds(), 600);
    }

    #[test]
    fn token_outliving_retention_is_rejected() {
        let mut opts = options("0123456789abcdef0123456789abcdef");
        assert!(check_lifetimes(&opts).is_ok());

        opts.token_ttl_seconds = opts.revocation_retention_seconds;
        assert!(check_lifetimes(&opts).is_ok());

        opts.token_ttl_seconds = opts.revocation_retention_seconds + 1;
        assert!(check_lifetimes(&opts)
            .is_err_and(|e| e.to_string().contains("revocation-retention-seconds")));
    }

    #[tokio::test]
    async fn long_token_ttl_fails_before_connecting() {
        let mut auth = options("0123456789abcdef0123456789abcdef");
        auth.token_ttl_seconds = 2 * auth.revocation_retention_seconds;
        let args = Args {
            port: 0,
            dsn: SecretString::from("postgres://unused".to_string()),
            auth,
        };
        assert!(execute(args).await.is_err_and(|e| e.to_string().contains("token-ttl-seconds")));
    }

    #[tokio::test]
    async fn short_secret_fails_before_connecting() {
        let args = Args {
            port: 0,
            dsn: SecretString::from("postgres://unused".to_string()),
            auth: options("short"),
        };
        let result = execute(args).await;
        assert!(result.is_err_and(|e| e.to_string().contains("jwt-secret")));
    }
}
