use anyhow::Result;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

mod crypto;
mod error;
mod jwt;
mod mailer;
mod middleware;
mod models;
mod password_policy;
mod rate_limiter;
mod recaptcha;
mod routes;
mod session;
mod store;
mod validation;
mod verification;

use std::sync::Arc;

use common::{cache, database};

use crate::jwt::{JwtConfig, JwtService};
use crate::mailer::{Mailer, MailerConfig};
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::recaptcha::{RecaptchaConfig, RecaptchaVerifier};
use crate::session::SessionGuard;
use crate::store::{AuthStore, PgStore};
use crate::verification::{TokenConfig, VerificationTokenManager};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AuthStore>,
    pub session_guard: SessionGuard,
    pub token_manager: VerificationTokenManager,
    pub mailer: Arc<dyn Mailer>,
    pub mailer_config: MailerConfig,
    pub recaptcha: RecaptchaVerifier,
    pub rate_limiter: RateLimiter,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting authentication service");

    // Initialize database connection pool
    let db_config = database::DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;

    database::health_check(&pool).await?;
    info!("Database connection successful");

    sqlx::migrate!("./migrations").run(&pool).await?;

    // Initialize JWT service
    let jwt_config = JwtConfig::from_env()?;
    let jwt_service = JwtService::new(jwt_config)?;

    // Initialize Redis connection pool
    let redis_config = cache::RedisConfig::from_env()?;
    let redis_pool = cache::RedisPool::new(&redis_config).await?;

    let store: Arc<dyn AuthStore> = Arc::new(PgStore::new(pool));
    let token_manager = VerificationTokenManager::new(store.clone(), TokenConfig::from_env());
    let session_guard = SessionGuard::new(store.clone(), jwt_service);

    let mailer_config = MailerConfig::from_env();
    let mailer = mailer::create_mailer(&mailer_config);
    let recaptcha = RecaptchaVerifier::new(RecaptchaConfig::from_env());
    let rate_limiter = RateLimiter::new(redis_pool, RateLimiterConfig::from_env());

    info!("Authentication service initialized successfully");

    let app_state = AppState {
        store,
        session_guard,
        token_manager,
        mailer,
        mailer_config,
        recaptcha,
        rate_limiter,
    };

    // Start the web server
    let app = routes::create_router(app_state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Authentication service listening on 0.0.0.0:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}
