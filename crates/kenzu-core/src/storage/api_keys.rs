//! Repository for API key database operations.
//!
//! Stores only the cleartext lookup prefix and the Argon2id hash of the
//! secret portion; the plaintext never reaches this layer. Revocation is
//! a soft delete so rows survive for audit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{ApiKey, ApiKeyId, OrganizationId},
};

/// Repository for API key database operations.
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

    /// Inserts a new API key row.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails or constraints are violated.
    pub async fn create(&self, key: &ApiKey) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO api_keys (
                id, organization_id, name, key_prefix, key_hash,
                created_by, last_used_at, revoked_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(key.id)
        .bind(key.organization_id)
        .bind(&key.name)
        .bind(&key.key_prefix)
        .bind(&key.key_hash)
        .bind(key.created_by)
        .bind(key.last_used_at)
        .bind(key.revoked_at)
        .bind(key.created_at)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds candidate keys by cleartext prefix, revoked rows included.
    ///
    /// Verification inspects `revoked_at` after the hash check so that
    /// revoked and unknown keys take the same code path.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_prefix(&self, key_prefix: &str) -> Result<Vec<ApiKey>> {
        let keys = sqlx::query_as::<_, ApiKey>(
            r"
            SELECT id, organization_id, name, key_prefix, key_hash,
                   created_by, last_used_at, revoked_at, created_at
            FROM api_keys
            WHERE key_prefix = $1
            ",
        )
        .bind(key_prefix)
        .fetch_all(&*self.pool)
        .await?;

        Ok(keys)
    }

    /// Lists keys for an organization, excluding revoked rows unless
    /// `include_revoked` is set.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list(
        &self,
        organization_id: OrganizationId,
        include_revoked: bool,
    ) -> Result<Vec<ApiKey>> {
        let query = if include_revoked {
            r"
            SELECT id, organization_id, name, key_prefix, key_hash,
                   created_by, last_used_at, revoked_at, created_at
            FROM api_keys
            WHERE organization_id = $1
            ORDER BY created_at DESC
            "
        } else {
            r"
            SELECT id, organization_id, name, key_prefix, key_hash,
                   created_by, last_used_at, revoked_at, created_at
            FROM api_keys
            WHERE organization_id = $1 AND revoked_at IS NULL
            ORDER BY created_at DESC
            "
        };

        let keys = sqlx::query_as::<_, ApiKey>(query)
            .bind(organization_id)
            .fetch_all(&*self.pool)
            .await?;

        Ok(keys)
    }

    /// Revokes a key belonging to the given organization.
    ///
    /// Idempotent: revoking an already-revoked key keeps the original
    /// `revoked_at`. The organization filter makes cross-tenant
    /// revocation indistinguishable from a missing key.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key does not exist in this organization.
    pub async fn revoke(&self, id: ApiKeyId, organization_id: OrganizationId) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE api_keys
            SET revoked_at = COALESCE(revoked_at, NOW())
            WHERE id = $1 AND organization_id = $2
            ",
        )
        .bind(id)
        .bind(organization_id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("api key {id} not found")));
        }

        Ok(())
    }

    /// Updates `last_used_at` after a successful verification.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn touch_last_used(&self, id: ApiKeyId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }
}
