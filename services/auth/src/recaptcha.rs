//! Bot-verification gate
//!
//! Thin collaborator around Google's reCAPTCHA verification endpoint. The
//! challenge token comes in opaque from the client and is checked before
//! registration or login proceeds; it plays no part in the token lifecycle
//! itself.

use serde::Deserialize;
use tracing::{error, warn};

const SITEVERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

/// reCAPTCHA configuration
#[derive(Debug, Clone)]
pub struct RecaptchaConfig {
    /// Server-side secret; when absent the gate is skipped
    pub secret_key: Option<String>,
}

impl RecaptchaConfig {
    /// Create a new RecaptchaConfig from environment variables
    ///
    /// # Environment Variables
    /// - `RECAPTCHA_SECRET_KEY`: server-side verification secret (optional)
    pub fn from_env() -> Self {
        Self {
            secret_key: std::env::var("RECAPTCHA_SECRET_KEY").ok(),
        }
    }
}

#[derive(Deserialize)]
struct SiteVerifyResponse {
    success: bool,
}

/// Verifier for client-submitted challenge tokens
#[derive(Clone)]
pub struct RecaptchaVerifier {
    secret_key: Option<String>,
    http: reqwest::Client,
}

impl RecaptchaVerifier {
    /// Create a new verifier
    pub fn new(config: RecaptchaConfig) -> Self {
        Self {
            secret_key: config.secret_key,
            http: reqwest::Client::new(),
        }
    }

    /// A verifier with no secret configured; every challenge passes
    pub fn disabled() -> Self {
        Self::new(RecaptchaConfig { secret_key: None })
    }

    /// Check a challenge token with the verification service
    ///
    /// An empty token fails closed. With no secret configured the gate is
    /// skipped so self-hosted deployments keep working, with a warning in
    /// the logs. Network or decode failures count as failed verification.
    pub async fn verify(&self, token: &str) -> bool {
        let Some(secret_key) = &self.secret_key else {
            warn!("RECAPTCHA_SECRET_KEY not configured, skipping bot verification");
            return true;
        };

        if token.is_empty() {
            return false;
        }

        let response = self
            .http
            .post(SITEVERIFY_URL)
            .form(&[("secret", secret_key.as_str()), ("response", token)])
            .send()
            .await;

        match response {
            Ok(response) => match response.json::<SiteVerifyResponse>().await {
                Ok(body) => body.success,
                Err(e) => {
                    error!("Failed to decode reCAPTCHA response: {}", e);
                    false
                }
            },
            Err(e) => {
                error!("reCAPTCHA verification request failed: {}", e);
                false
            }
        }
    }
}
