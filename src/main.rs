//! Kenzu webhook ingestion and automation service.
//!
//! Main entry point. Initializes tracing, loads configuration, prepares
//! the database, and serves the HTTP boundary until shutdown.

use std::time::Duration;

use anyhow::{Context, Result};
use kenzu_api::{AppState, Config};
use kenzu_ratelimit::RateLimiter;
use tracing::{info, warn};

/// How often stale rate-limit counters are purged.
const PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log);

    info!("Starting Kenzu ingestion service");
    info!(
        database_url = %config.database_url_masked(),
        host = %config.host,
        port = config.port,
        key_environment = %config.key_environment,
        "Configuration loaded"
    );

    let pool = create_database_pool(&config).await?;
    info!("Database connection pool established");

    kenzu_core::storage::migrate(&pool).await.context("Failed to prepare database schema")?;
    info!("Database schema ready");

    let state = AppState::new(pool.clone(), config.key_environment());

    spawn_counter_purge(RateLimiter::new(pool.clone()));

    let addr = config.parse_server_addr()?;
    let timeout = Duration::from_secs(config.request_timeout);

    kenzu_api::start_server(state, addr, timeout).await.context("HTTP server failed")?;

    pool.close().await;
    info!("Database connections closed, shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Creates the database connection pool with bounded retries.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;
    loop {
        match config.pg_pool_options().connect(&config.database_url).await {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "Database connection failed, retrying..."
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}

/// Periodically deletes expired rate-limit counter rows.
fn spawn_counter_purge(limiter: RateLimiter) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match limiter.purge_expired().await {
                Ok(deleted) if deleted > 0 => {
                    info!(deleted, "purged expired rate limit counters");
                },
                Ok(_) => {},
                Err(e) => warn!(error = %e, "rate limit counter purge failed"),
            }
        }
    });
}
