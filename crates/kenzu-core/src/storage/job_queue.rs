//! Repository for the job queue.
//!
//! Jobs are written by fan-out in the run's transaction and consumed by
//! an external worker. No claim or completion paths live here.

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    error::Result,
    models::{EventId, JobId, JobQueueItem, OrganizationId},
};

/// Repository for job queue database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts a job within an open transaction.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        job: &JobQueueItem,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO job_queue_items (
                id, run_id, action_id, organization_id, payload, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(job.id)
        .bind(job.run_id)
        .bind(job.action_id)
        .bind(job.organization_id)
        .bind(&job.payload)
        .bind(job.status)
        .bind(job.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Returns job ids created for an event, joined through the runs.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn ids_for_event(
        &self,
        organization_id: OrganizationId,
        event_log_id: EventId,
    ) -> Result<Vec<JobId>> {
        let ids: Vec<JobId> = sqlx::query_scalar(
            r"
            SELECT j.id
            FROM job_queue_items j
            JOIN automation_runs r ON r.id = j.run_id
            WHERE j.organization_id = $1 AND r.event_log_id = $2
            ORDER BY j.created_at ASC
            ",
        )
        .bind(organization_id)
        .bind(event_log_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(ids)
    }

    /// Fetches all jobs for an organization. Test support.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list(&self, organization_id: OrganizationId) -> Result<Vec<JobQueueItem>> {
        let jobs = sqlx::query_as::<_, JobQueueItem>(
            r"
            SELECT id, run_id, action_id, organization_id, payload, status, created_at
            FROM job_queue_items
            WHERE organization_id = $1
            ORDER BY created_at ASC
            ",
        )
        .bind(organization_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(jobs)
    }
}
