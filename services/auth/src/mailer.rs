//! Transactional email collaborator
//!
//! The service only builds subjects, bodies, and redemption URLs; delivery
//! goes through the [`Mailer`] trait. The production implementation posts to
//! the Resend HTTP API, and a no-op mailer stands in for tests and mail-less
//! deployments. Raw tokens appear exclusively inside the redemption links.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Mailer configuration
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// Resend API key; when absent mail is logged and dropped
    pub resend_api_key: Option<String>,
    /// From header, e.g. "Nimbus <notifications@nimbus-saas.dev>"
    pub from_address: String,
    /// Product name used in subjects and copy
    pub app_name: String,
    /// Public base URL the redemption links point at
    pub base_url: String,
}

impl MailerConfig {
    /// Create a new MailerConfig from environment variables
    ///
    /// # Environment Variables
    /// - `RESEND_API_KEY`: Resend API key (optional)
    /// - `EMAIL_FROM`: From header (default: "Nimbus <notifications@nimbus-saas.dev>")
    /// - `APP_NAME`: product name (default: "Nimbus")
    /// - `BASE_URL`: public base URL (default: "http://localhost:3000")
    pub fn from_env() -> Self {
        Self {
            resend_api_key: std::env::var("RESEND_API_KEY").ok(),
            from_address: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Nimbus <notifications@nimbus-saas.dev>".to_string()),
            app_name: std::env::var("APP_NAME").unwrap_or_else(|_| "Nimbus".to_string()),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        }
    }
}

/// An email ready for delivery
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Email delivery error
#[derive(Debug, Error)]
pub enum MailerError {
    #[error("Failed to send email: {0}")]
    SendFailed(String),
}

/// Trait for email delivery backends
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a single email
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailerError>;
}

/// Mailer backed by the Resend HTTP API
pub struct ResendMailer {
    api_key: String,
    from_address: String,
    http: reqwest::Client,
}

impl ResendMailer {
    /// Create a new Resend mailer
    pub fn new(api_key: String, from_address: String) -> Self {
        Self {
            api_key,
            from_address,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailerError> {
        let response = self
            .http
            .post(RESEND_API_URL)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from_address,
                "to": [email.to],
                "subject": email.subject,
                "html": email.html,
                "text": email.text,
            }))
            .send()
            .await
            .map_err(|e| MailerError::SendFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MailerError::SendFailed(format!(
                "Resend returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

/// Mailer that logs and drops; used when no API key is configured
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailerError> {
        info!(
            "Mail delivery disabled, dropping email to {} ({})",
            email.to, email.subject
        );
        Ok(())
    }
}

/// Create a mailer from configuration
pub fn create_mailer(config: &MailerConfig) -> std::sync::Arc<dyn Mailer> {
    match &config.resend_api_key {
        Some(api_key) => std::sync::Arc::new(ResendMailer::new(
            api_key.clone(),
            config.from_address.clone(),
        )),
        None => {
            warn!("RESEND_API_KEY not configured, emails will not be sent");
            std::sync::Arc::new(NoopMailer)
        }
    }
}

/// Verification email carrying the redemption link
pub fn verification_email(
    config: &MailerConfig,
    name: &str,
    to: &str,
    raw_token: &str,
) -> OutgoingEmail {
    let subject = format!("{} - Verify your email", config.app_name);
    let link = format!("{}/verify-email?token={}", config.base_url, raw_token);

    OutgoingEmail {
        to: to.to_string(),
        subject: subject.clone(),
        html: format!(
            "<p>Hi {name},</p>\
             <p>Please confirm your email address to finish setting up your {} account.</p>\
             <p><a href=\"{link}\">Verify your email</a></p>\
             <p>This link expires in one hour. If you didn't create an account, you can ignore this email.</p>",
            config.app_name
        ),
        text: format!(
            "Hi {name},\n\nPlease confirm your email address to finish setting up your {} account:\n{link}\n\nThis link expires in one hour. If you didn't create an account, you can ignore this email.\n",
            config.app_name
        ),
    }
}

/// Password-reset email carrying the redemption link
pub fn password_reset_email(
    config: &MailerConfig,
    name: &str,
    to: &str,
    raw_token: &str,
) -> OutgoingEmail {
    let subject = format!("{} - Reset Your Password", config.app_name);
    let link = format!("{}/reset-password?token={}", config.base_url, raw_token);

    OutgoingEmail {
        to: to.to_string(),
        subject,
        html: format!(
            "<p>Hi {name},</p>\
             <p>We received a request to reset your password.</p>\
             <p><a href=\"{link}\">Reset your password</a></p>\
             <p>This link expires in one hour. If you didn't request a reset, you can ignore this email.</p>"
        ),
        text: format!(
            "Hi {name},\n\nWe received a request to reset your password:\n{link}\n\nThis link expires in one hour. If you didn't request a reset, you can ignore this email.\n"
        ),
    }
}

/// Welcome email sent once the address is verified
pub fn welcome_email(config: &MailerConfig, name: &str, to: &str) -> OutgoingEmail {
    let subject = format!("Welcome to {}", config.app_name);

    OutgoingEmail {
        to: to.to_string(),
        subject,
        html: format!(
            "<p>Hi {name},</p>\
             <p>Your email is verified and your {} account is ready.</p>\
             <p><a href=\"{}/dashboard\">Go to your dashboard</a></p>",
            config.app_name, config.base_url
        ),
        text: format!(
            "Hi {name},\n\nYour email is verified and your {} account is ready.\n{}/dashboard\n",
            config.app_name, config.base_url
        ),
    }
}

/// Confirmation email sent after a completed password reset
pub fn password_reset_confirmation_email(
    config: &MailerConfig,
    name: &str,
    to: &str,
) -> OutgoingEmail {
    let subject = format!("Your password has been changed for {}", config.app_name);

    OutgoingEmail {
        to: to.to_string(),
        subject,
        html: format!(
            "<p>Hi {name},</p>\
             <p>Your {} password was just changed. If this was you, no further action is needed.</p>\
             <p>If you did not make this change, please reset your password immediately.</p>",
            config.app_name
        ),
        text: format!(
            "Hi {name},\n\nYour {} password was just changed. If this was you, no further action is needed.\nIf you did not make this change, please reset your password immediately.\n",
            config.app_name
        ),
    }
}
