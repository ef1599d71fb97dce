//! Repository for organization records.
//!
//! Organizations are the tenant boundary; everything else in the schema
//! hangs off them. Mutation is limited to provisioning and the active
//! flag, both driven by the (out of scope) dashboard.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{Organization, OrganizationId},
};

/// Repository for organization database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Creates an organization.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` on a duplicate slug.
    pub async fn create(&self, org: &Organization) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO organizations (id, name, slug, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(org.id)
        .bind(&org.name)
        .bind(&org.slug)
        .bind(org.is_active)
        .bind(org.created_at)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Sets the active flag.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the organization does not exist.
    pub async fn set_active(&self, id: OrganizationId, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE organizations SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&*self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound("organization not found".into()));
        }

        Ok(())
    }

    /// True when the organization exists and is active.
    ///
    /// Inactive organizations reject all ingestion at the boundary.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn is_active(&self, id: OrganizationId) -> Result<bool> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT is_active FROM organizations WHERE id = $1")
                .bind(id)
                .fetch_optional(&*self.pool)
                .await?;

        Ok(row.map(|(active,)| active).unwrap_or(false))
    }
}
