//! Trigger matching and run/job fan-out.
//!
//! Matching policy is exact string equality between the event type and
//! the workflow trigger, scoped to the event's organization. Every row
//! created here carries the event's organization id; cross-tenant
//! leakage at this point is the single most safety-critical failure the
//! subsystem can have, so the invariant is asserted in code as well as
//! enforced by the queries.

use chrono::Utc;
use kenzu_core::{
    storage::Storage, AutomationRun, CoreError, EventLog, JobId, JobQueueItem, JobStatus, RunId,
    RunStatus, Workflow,
};
use tracing::{debug, error, instrument, warn};

use crate::ingest::IngestError;

/// Maximum attempts for one workflow's fan-out transaction before the
/// failure is surfaced to the caller.
const MAX_FANOUT_ATTEMPTS: u32 = 3;

/// Rows created by fan-out for one event.
#[derive(Debug, Default, Clone)]
pub struct FanOut {
    /// Run ids, one per matched workflow, in match order.
    pub run_ids: Vec<RunId>,
    /// Job ids, one per (run, action), in creation order.
    pub job_ids: Vec<JobId>,
}

/// Matches events against workflow triggers and creates runs and jobs.
#[derive(Clone)]
pub struct TriggerMatcher {
    storage: Storage,
}

impl TriggerMatcher {
    /// Creates a matcher over the given storage.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Fans a persisted event out into runs and jobs.
    ///
    /// Selects active workflows of the event's organization whose
    /// trigger equals the event type, then creates one `PENDING` run
    /// plus one queued job per ordered action, one transaction per
    /// workflow. Zero matches is a valid outcome.
    ///
    /// Transient store errors are retried up to three times per
    /// workflow; a run can therefore never exist without its jobs.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Storage` if a workflow's fan-out still
    /// fails after retries. Runs already committed for earlier matches
    /// are kept; the caller reports the failure and the event remains
    /// for the reconciliation sweep.
    #[instrument(skip(self, event), fields(org = %event.organization_id, event_id = %event.id))]
    pub async fn fan_out(&self, event: &EventLog) -> Result<FanOut, IngestError> {
        let workflows = self
            .storage
            .workflows
            .find_active_by_trigger(event.organization_id, &event.event_type)
            .await?;

        debug!(matched = workflows.len(), event_type = %event.event_type, "trigger matching done");

        let mut result = FanOut::default();

        for workflow in &workflows {
            // Belt-and-braces check of the scoping the query already did.
            if workflow.organization_id != event.organization_id {
                error!(
                    workflow_id = %workflow.id,
                    workflow_org = %workflow.organization_id,
                    event_org = %event.organization_id,
                    "workflow from foreign organization reached fan-out, skipping"
                );
                continue;
            }

            let (run_id, job_ids) = self.fan_out_workflow(event, workflow).await?;
            result.run_ids.push(run_id);
            result.job_ids.extend(job_ids);
        }

        Ok(result)
    }

    /// Creates the run and jobs for one matched workflow, retrying
    /// transient failures.
    async fn fan_out_workflow(
        &self,
        event: &EventLog,
        workflow: &Workflow,
    ) -> Result<(RunId, Vec<JobId>), IngestError> {
        let actions =
            self.storage.workflows.actions_for(workflow.id, event.organization_id).await?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_create_run(event, workflow, &actions).await {
                Ok(created) => return Ok(created),
                Err(e) if e.is_transient() && attempt < MAX_FANOUT_ATTEMPTS => {
                    warn!(
                        workflow_id = %workflow.id,
                        attempt,
                        error = %e,
                        "fan-out transaction failed, retrying"
                    );
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// One transactional attempt: run plus all of its jobs, or nothing.
    async fn try_create_run(
        &self,
        event: &EventLog,
        workflow: &Workflow,
        actions: &[kenzu_core::WorkflowAction],
    ) -> Result<(RunId, Vec<JobId>), CoreError> {
        let now = Utc::now();

        let run = AutomationRun {
            id: RunId::new(),
            workflow_id: workflow.id,
            organization_id: event.organization_id,
            event_log_id: event.id,
            trigger_data: sqlx_json(event.payload.0.clone()),
            status: RunStatus::Pending,
            created_at: now,
        };

        let jobs: Vec<JobQueueItem> = actions
            .iter()
            .map(|action| JobQueueItem {
                id: kenzu_core::JobId::new(),
                run_id: run.id,
                action_id: action.id,
                organization_id: event.organization_id,
                payload: sqlx_json(serde_json::json!({
                    "action": action.config.0,
                    "delay_seconds": action.delay_seconds,
                    "trigger": {
                        "event_type": event.event_type,
                        "payload": event.payload.0,
                    },
                })),
                status: JobStatus::Pending,
                created_at: now,
            })
            .collect();

        let mut tx = self.storage.pool().begin().await?;
        self.storage.automation_runs.create_in_tx(&mut tx, &run).await?;
        for job in &jobs {
            self.storage.job_queue.create_in_tx(&mut tx, job).await?;
        }
        tx.commit().await?;

        Ok((run.id, jobs.into_iter().map(|j| j.id).collect()))
    }
}

fn sqlx_json(value: serde_json::Value) -> sqlx::types::Json<serde_json::Value> {
    sqlx::types::Json(value)
}
