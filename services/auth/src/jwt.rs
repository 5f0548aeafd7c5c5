//! JWT service for access credentials and session tokens
//!
//! Two token kinds are signed with the same HS256 secret but live on
//! independent clocks: the session token spans weeks, while the access
//! credential it embeds expires within the hour and is regenerated on every
//! session refresh. A stolen credential therefore has a narrow validity
//! window even if the session itself persists.

use anyhow::Result;
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::models::Identity;

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Shared secret for signing and verifying tokens
    pub secret: String,
    /// Access credential expiration time in seconds (default: 1 hour)
    pub access_token_expiry: u64,
    /// Session token expiration time in seconds (default: 30 days)
    pub session_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_SECRET`: Shared signing secret
    /// - `JWT_ACCESS_TOKEN_EXPIRY`: Access credential expiry in seconds (default: 3600)
    /// - `SESSION_MAX_AGE`: Session expiry in seconds (default: 2592000)
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;

        let access_token_expiry = std::env::var("JWT_ACCESS_TOKEN_EXPIRY")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .unwrap_or(3600);

        let session_expiry = std::env::var("SESSION_MAX_AGE")
            .unwrap_or_else(|_| "2592000".to_string()) // 30 days
            .parse()
            .unwrap_or(2_592_000);

        Ok(JwtConfig {
            secret,
            access_token_expiry,
            session_expiry,
        })
    }
}

/// Token type enum
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum TokenType {
    /// Long-lived session token carrying an embedded access credential
    Session,
    /// Short-lived access credential
    Access,
}

/// Claims of the short-lived access credential
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User ID
    pub sub: Uuid,
    /// User display name
    pub name: String,
    /// User email
    pub email: String,
    /// Profile picture URL
    pub picture: Option<String>,
    /// When the email was verified, if it has been
    pub email_verified: Option<DateTime<Utc>>,
    /// Unique identifier of this credential, fresh on every issuance
    pub jti: Uuid,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
    /// Token type (always `Access`)
    pub token_type: TokenType,
}

/// Claims of the long-lived session token
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User ID
    pub sub: Uuid,
    /// User display name
    pub name: String,
    /// User email
    pub email: String,
    /// Profile picture URL
    pub picture: Option<String>,
    /// When the email was verified, if it has been
    pub email_verified: Option<DateTime<Utc>>,
    /// Embedded access credential, replaced on every refresh
    pub act: Option<String>,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
    /// Token type (always `Session`)
    pub token_type: TokenType,
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    config: JwtConfig,
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Result<Self> {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_exp = true;

        Ok(JwtService {
            encoding_key,
            decoding_key,
            validation,
            config,
        })
    }

    /// Generate a fresh access credential for an identity
    pub fn generate_access_token(&self, identity: &Identity) -> Result<String> {
        let now = unix_now()?;

        let claims = AccessClaims {
            sub: identity.id,
            name: identity.name.clone(),
            email: identity.email.clone(),
            picture: identity.image.clone(),
            email_verified: identity.email_verified,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now + self.config.access_token_expiry,
            token_type: TokenType::Access,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Generate a session token embedding the given access credential
    pub fn generate_session_token(
        &self,
        identity: &Identity,
        access_token: &str,
    ) -> Result<String> {
        let now = unix_now()?;

        let claims = SessionClaims {
            sub: identity.id,
            name: identity.name.clone(),
            email: identity.email.clone(),
            picture: identity.image.clone(),
            email_verified: identity.email_verified,
            act: Some(access_token.to_string()),
            iat: now,
            exp: now + self.config.session_expiry,
            token_type: TokenType::Session,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Validate an access credential and return its claims
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims> {
        let token_data = decode::<AccessClaims>(token, &self.decoding_key, &self.validation)?;

        if token_data.claims.token_type != TokenType::Access {
            return Err(anyhow::anyhow!("Token is not an access credential"));
        }

        Ok(token_data.claims)
    }

    /// Validate a session token and return its claims
    pub fn validate_session_token(&self, token: &str) -> Result<SessionClaims> {
        let token_data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)?;

        if token_data.claims.token_type != TokenType::Session {
            return Err(anyhow::anyhow!("Token is not a session token"));
        }

        Ok(token_data.claims)
    }

    /// Get the access credential expiry time
    pub fn access_token_expiry(&self) -> u64 {
        self.config.access_token_expiry
    }

    /// Get the session expiry time
    pub fn session_expiry(&self) -> u64 {
        self.config.session_expiry
    }
}

/// Seconds since the Unix epoch
fn unix_now() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| anyhow::anyhow!("Failed to get current time: {}", e))?
        .as_secs())
}
