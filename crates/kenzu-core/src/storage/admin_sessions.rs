//! Repository for admin dashboard sessions.
//!
//! Sessions back the cookie auth path at the ingestion boundary. Only
//! lookup by token digest and provisioning are needed here; session
//! creation flows (login, SSO) live in the dashboard, out of scope.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use crate::{error::Result, models::AdminSession};

/// Repository for admin session database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts a session row.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create(&self, session: &AdminSession) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO admin_sessions (
                id, token_hash, user_id, organization_id, role, expires_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(session.id)
        .bind(&session.token_hash)
        .bind(session.user_id)
        .bind(session.organization_id)
        .bind(session.role)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds a live session by its token digest.
    ///
    /// Expired sessions are filtered in SQL so callers never see them.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_valid(&self, token_hash: &str) -> Result<Option<AdminSession>> {
        let session = sqlx::query_as::<_, AdminSession>(
            r"
            SELECT id, token_hash, user_id, organization_id, role, expires_at, created_at
            FROM admin_sessions
            WHERE token_hash = $1 AND expires_at > $2
            ",
        )
        .bind(token_hash)
        .bind(Utc::now())
        .fetch_optional(&*self.pool)
        .await?;

        Ok(session)
    }
}
