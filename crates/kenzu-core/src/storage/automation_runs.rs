//! Repository for automation runs.
//!
//! Runs are created by the fan-out step inside the same transaction as
//! their jobs; the transactional insert variant exists for that path.

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    error::Result,
    models::{AutomationRun, EventId, OrganizationId, RunId},
};

/// Repository for automation run database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts a run within an open transaction.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        run: &AutomationRun,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO automation_runs (
                id, workflow_id, organization_id, event_log_id,
                trigger_data, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(run.id)
        .bind(run.workflow_id)
        .bind(run.organization_id)
        .bind(run.event_log_id)
        .bind(&run.trigger_data)
        .bind(run.status)
        .bind(run.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Returns run ids created for an event, oldest first.
    ///
    /// Used to rebuild the response for an idempotent replay and by the
    /// reconciliation sweep to detect partial fan-out.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn ids_for_event(
        &self,
        organization_id: OrganizationId,
        event_log_id: EventId,
    ) -> Result<Vec<RunId>> {
        let ids: Vec<RunId> = sqlx::query_scalar(
            r"
            SELECT id FROM automation_runs
            WHERE organization_id = $1 AND event_log_id = $2
            ORDER BY created_at ASC
            ",
        )
        .bind(organization_id)
        .bind(event_log_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(ids)
    }

    /// Fetches all runs for an organization. Test support.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list(&self, organization_id: OrganizationId) -> Result<Vec<AutomationRun>> {
        let runs = sqlx::query_as::<_, AutomationRun>(
            r"
            SELECT id, workflow_id, organization_id, event_log_id,
                   trigger_data, status, created_at
            FROM automation_runs
            WHERE organization_id = $1
            ORDER BY created_at ASC
            ",
        )
        .bind(organization_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(runs)
    }
}
