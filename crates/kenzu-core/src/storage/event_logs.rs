//! Repository for accepted webhook events.
//!
//! The partial unique index on `(organization_id, idempotency_key)` is
//! enforced here by the database; the loser of a concurrent duplicate
//! insert sees `ConstraintViolation` and must return the winner's row.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{EventId, EventLog, OrganizationId},
};

/// Repository for event log database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts an event row.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` when another request already
    /// persisted an event with the same `(organization, idempotency_key)`.
    pub async fn create(&self, event: &EventLog) -> Result<EventId> {
        let id: EventId = sqlx::query_scalar(
            r"
            INSERT INTO event_logs (
                id, organization_id, api_key_id, event_type,
                payload, source, idempotency_key, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            ",
        )
        .bind(event.id)
        .bind(event.organization_id)
        .bind(event.api_key_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(&event.source)
        .bind(&event.idempotency_key)
        .bind(event.created_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(id)
    }

    /// Finds the event previously stored for this idempotency key.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_idempotency_key(
        &self,
        organization_id: OrganizationId,
        idempotency_key: &str,
    ) -> Result<Option<EventLog>> {
        let event = sqlx::query_as::<_, EventLog>(
            r"
            SELECT id, organization_id, api_key_id, event_type,
                   payload, source, idempotency_key, created_at
            FROM event_logs
            WHERE organization_id = $1 AND idempotency_key = $2
            ",
        )
        .bind(organization_id)
        .bind(idempotency_key)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(event)
    }

    /// Counts events for an organization. Used by tests and quota checks.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count(&self, organization_id: OrganizationId) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM event_logs WHERE organization_id = $1")
                .bind(organization_id)
                .fetch_one(&*self.pool)
                .await?;

        Ok(count.0)
    }
}
