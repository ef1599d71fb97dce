//! Repository for workflow definitions and their ordered actions.
//!
//! Workflows are created and edited by tenant admins through the
//! dashboard; this layer exposes the read paths the trigger matcher
//! needs plus minimal creation support used by provisioning and tests.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{OrganizationId, Workflow, WorkflowAction, WorkflowId},
};

/// Repository for workflow database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts a workflow definition.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn create(&self, workflow: &Workflow) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO workflows (
                id, organization_id, name, is_active, trigger, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(workflow.id)
        .bind(workflow.organization_id)
        .bind(&workflow.name)
        .bind(workflow.is_active)
        .bind(&workflow.trigger)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Inserts one ordered action for a workflow.
    ///
    /// The typed `ActionConfig` is validated at this point simply by
    /// existing; malformed configs cannot be constructed.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn add_action(&self, action: &WorkflowAction) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO workflow_actions (
                id, workflow_id, organization_id, position, config, delay_seconds, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(action.id)
        .bind(action.workflow_id)
        .bind(action.organization_id)
        .bind(action.position)
        .bind(&action.config)
        .bind(action.delay_seconds)
        .bind(action.created_at)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds active workflows in an organization whose trigger equals the
    /// event type exactly.
    ///
    /// This is the whole matching policy: exact string equality, no
    /// wildcard or condition evaluation.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_active_by_trigger(
        &self,
        organization_id: OrganizationId,
        event_type: &str,
    ) -> Result<Vec<Workflow>> {
        let workflows = sqlx::query_as::<_, Workflow>(
            r"
            SELECT id, organization_id, name, is_active, trigger, created_at, updated_at
            FROM workflows
            WHERE organization_id = $1
              AND is_active
              AND trigger = $2
            ORDER BY created_at ASC
            ",
        )
        .bind(organization_id)
        .bind(event_type)
        .fetch_all(&*self.pool)
        .await?;

        Ok(workflows)
    }

    /// Returns a workflow's actions in execution order.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn actions_for(
        &self,
        workflow_id: WorkflowId,
        organization_id: OrganizationId,
    ) -> Result<Vec<WorkflowAction>> {
        let actions = sqlx::query_as::<_, WorkflowAction>(
            r"
            SELECT id, workflow_id, organization_id, position, config, delay_seconds, created_at
            FROM workflow_actions
            WHERE workflow_id = $1 AND organization_id = $2
            ORDER BY position ASC
            ",
        )
        .bind(workflow_id)
        .bind(organization_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(actions)
    }
}
