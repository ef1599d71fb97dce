//! Repository for append-only audit entries.
//!
//! There are no update or delete paths; rows are written once and read
//! by the dashboard and compliance tooling.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{AuditLog, OrganizationId, UserId},
};

/// Repository for audit log database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Appends one audit row.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails. Callers in the hot path are
    /// expected to swallow this (see `AuditLogger`).
    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        id: Uuid,
        action: &str,
        resource_type: &str,
        resource_id: Option<&str>,
        organization_id: Option<OrganizationId>,
        user_id: Option<UserId>,
        details: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO audit_logs (
                id, action, resource_type, resource_id,
                organization_id, user_id, details, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ",
        )
        .bind(id)
        .bind(action)
        .bind(resource_type)
        .bind(resource_id)
        .bind(organization_id)
        .bind(user_id)
        .bind(sqlx::types::Json(details))
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Returns the most recent entries for an organization.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn recent(
        &self,
        organization_id: OrganizationId,
        limit: i64,
    ) -> Result<Vec<AuditLog>> {
        let entries = sqlx::query_as::<_, AuditLog>(
            r"
            SELECT id, action, resource_type, resource_id,
                   organization_id, user_id, details, created_at
            FROM audit_logs
            WHERE organization_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            ",
        )
        .bind(organization_id)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(entries)
    }
}
