//! Out-of-band delivery of codes and account notices.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

use crate::APP_USER_AGENT;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    MfaCode,
    Welcome,
    PasswordReset,
}

/// A rendered message ready for delivery.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Notification {
    pub channel: Channel,
    pub to: String,
    pub template: Template,
    pub subject: String,
    pub body: String,
}

impl Notification {
    #[must_use]
    pub fn mfa_code(channel: Channel, to: &str, name: &str, code: &str, ttl_minutes: i64) -> Self {
        Self {
            channel,
            to: to.to_string(),
            template: Template::MfaCode,
            subject: "Your JIMS verification code".to_string(),
            body: format!(
                "Hello {name}, your JIMS verification code is {code}. It expires in {ttl_minutes} minutes."
            ),
        }
    }

    #[must_use]
    pub fn welcome(channel: Channel, to: &str, name: &str) -> Self {
        Self {
            channel,
            to: to.to_string(),
            template: Template::Welcome,
            subject: "Welcome to JIMS".to_string(),
            body: format!(
                "Welcome to JIMS, {name}! Your account has been created successfully."
            ),
        }
    }

    #[must_use]
    pub fn password_reset(to: &str, name: &str, link: &str, ttl_minutes: i64) -> Self {
        Self {
            channel: Channel::Email,
            to: to.to_string(),
            template: Template::PasswordReset,
            subject: "Reset your JIMS password".to_string(),
            body: format!(
                "Hello {name}, use this link to reset your password: {link}\nThe link expires in {ttl_minutes} minutes."
            ),
        }
    }
}

/// Delivery abstraction for email and SMS.
#[async_trait]
pub trait CodeSender: Send + Sync {
    /// Deliver a message or return an error describing why it failed.
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Local dev sender that logs the message instead of delivering it.
#[derive(Clone, Debug, Default)]
pub struct LogCodeSender;

#[async_trait]
impl CodeSender for LogCodeSender {
    async fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            channel = ?notification.channel,
            to = %notification.to,
            template = ?notification.template,
            "notification send stub"
        );
        debug!(body = %notification.body, "notification body");
        Ok(())
    }
}

/// Posts each notification as JSON to a delivery gateway.
#[derive(Clone, Debug)]
pub struct WebhookCodeSender {
    client: Client,
    url: Url,
}

impl WebhookCodeSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build webhook client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl CodeSender for WebhookCodeSender {
    #[instrument(skip(self, notification), fields(channel = ?notification.channel))]
    async fn send(&self, notification: &Notification) -> Result<()> {
        self.client
            .post(self.url.clone())
            .json(notification)
            .send()
            .await
            .context("notification webhook request failed")?
            .error_for_status()
            .context("notification webhook rejected the message")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mfa_code_message_mentions_code_and_expiry() {
        let n = Notification::mfa_code(Channel::Sms, "+15550100", "Ann", "123456", 5);
        assert_eq!(n.channel, Channel::Sms);
        assert!(n.body.contains("123456"));
        assert!(n.body.contains("5 minutes"));
    }

    #[test]
    fn notification_serializes_for_webhook() -> Result<()> {
        let n = Notification::welcome(Channel::Email, "a@x.com", "Ann");
        let json = serde_json::to_value(&n)?;
        assert_eq!(json["channel"], "email");
        assert_eq!(json["template"], "welcome");
        assert_eq!(json["to"], "a@x.com");
        Ok(())
    }

    #[tokio::test]
    async fn log_sender_always_succeeds() -> Result<()> {
        let n = Notification::password_reset("a@x.com", "Ann", "https://x/reset?token=t", 30);
        LogCodeSender.send(&n).await
    }
}
