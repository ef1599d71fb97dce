//! Shared test environment for Kenzu integration tests.
//!
//! Connects to the Postgres instance named by `TEST_DATABASE_URL` (or
//! `DATABASE_URL`), ensures the schema exists, and exposes the production
//! storage layer plus fixture builders. Fixtures use unique suffixes so
//! concurrent tests over the same database do not collide.

#![forbid(unsafe_code)]

pub mod fixtures;

use anyhow::{Context, Result};
use kenzu_core::storage::{migrate, Storage};
use sqlx::{postgres::PgPoolOptions, PgPool};

/// A ready-to-use test environment over a real Postgres database.
pub struct TestEnv {
    pool: PgPool,
    storage: Storage,
}

impl TestEnv {
    /// Connects, ensures the schema, and returns the environment.
    ///
    /// # Errors
    ///
    /// Returns error when the database is unreachable or schema setup
    /// fails.
    pub async fn new() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
            )
            .with_test_writer()
            .try_init();

        let url = std::env::var("TEST_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "postgresql://localhost/kenzu_test".to_string());

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .context("failed to connect to test database")?;

        migrate(&pool).await.context("failed to ensure test schema")?;

        let storage = Storage::new(pool.clone());

        Ok(Self { pool, storage })
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The production storage layer over the test database.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}
