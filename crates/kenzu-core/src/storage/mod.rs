//! Database access layer implementing the repository pattern.
//!
//! The repository layer is an anti-corruption layer between domain
//! models and the Postgres schema. All database operations MUST go
//! through these repositories; every query over an organization-scoped
//! table takes the `OrganizationId` as a mandatory parameter rather than
//! an optional filter.

use std::sync::Arc;

use sqlx::PgPool;

pub mod admin_sessions;
pub mod api_keys;
pub mod audit_logs;
pub mod automation_runs;
pub mod event_logs;
pub mod job_queue;
pub mod organizations;
pub mod workflows;

use crate::error::Result;

/// Container for all repository instances providing unified database
/// access.
#[derive(Clone)]
pub struct Storage {
    /// Repository for organization records.
    pub organizations: Arc<organizations::Repository>,

    /// Repository for API key lifecycle operations.
    pub api_keys: Arc<api_keys::Repository>,

    /// Repository for admin dashboard sessions.
    pub admin_sessions: Arc<admin_sessions::Repository>,

    /// Repository for workflow definitions and actions.
    pub workflows: Arc<workflows::Repository>,

    /// Repository for accepted webhook events.
    pub event_logs: Arc<event_logs::Repository>,

    /// Repository for automation runs.
    pub automation_runs: Arc<automation_runs::Repository>,

    /// Repository for queued jobs.
    pub job_queue: Arc<job_queue::Repository>,

    /// Repository for append-only audit entries.
    pub audit_logs: Arc<audit_logs::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            organizations: Arc::new(organizations::Repository::new(pool.clone())),
            api_keys: Arc::new(api_keys::Repository::new(pool.clone())),
            admin_sessions: Arc::new(admin_sessions::Repository::new(pool.clone())),
            workflows: Arc::new(workflows::Repository::new(pool.clone())),
            event_logs: Arc::new(event_logs::Repository::new(pool.clone())),
            automation_runs: Arc::new(automation_runs::Repository::new(pool.clone())),
            job_queue: Arc::new(job_queue::Repository::new(pool.clone())),
            audit_logs: Arc::new(audit_logs::Repository::new(pool)),
        }
    }

    /// Returns the shared connection pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.organizations.pool()
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.pool()).await?;
        Ok(())
    }
}

/// Ensures the schema exists, creating tables and indexes as needed.
///
/// Idempotent; run at service startup and by the test harness. The
/// partial unique index on `event_logs` is the deduplication guarantee:
/// concurrent inserts with the same `(organization_id, idempotency_key)`
/// race on it and exactly one wins.
///
/// # Errors
///
/// Returns `CoreError::Database` if any DDL statement fails.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    let statements: &[&str] = &[
        r"
        CREATE TABLE IF NOT EXISTS organizations (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
        r"
        CREATE TABLE IF NOT EXISTS api_keys (
            id UUID PRIMARY KEY,
            organization_id UUID NOT NULL REFERENCES organizations(id),
            name TEXT NOT NULL,
            key_prefix TEXT NOT NULL,
            key_hash TEXT NOT NULL,
            created_by UUID NOT NULL,
            last_used_at TIMESTAMPTZ,
            revoked_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
        r"
        CREATE INDEX IF NOT EXISTS idx_api_keys_prefix
        ON api_keys(key_prefix)
        ",
        r"
        CREATE TABLE IF NOT EXISTS admin_sessions (
            id UUID PRIMARY KEY,
            token_hash TEXT NOT NULL UNIQUE,
            user_id UUID NOT NULL,
            organization_id UUID NOT NULL REFERENCES organizations(id),
            role TEXT NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
        r"
        CREATE TABLE IF NOT EXISTS workflows (
            id UUID PRIMARY KEY,
            organization_id UUID NOT NULL REFERENCES organizations(id),
            name TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            trigger TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
        r"
        CREATE INDEX IF NOT EXISTS idx_workflows_org_trigger
        ON workflows(organization_id, trigger)
        WHERE is_active
        ",
        r"
        CREATE TABLE IF NOT EXISTS workflow_actions (
            id UUID PRIMARY KEY,
            workflow_id UUID NOT NULL REFERENCES workflows(id),
            organization_id UUID NOT NULL REFERENCES organizations(id),
            position INTEGER NOT NULL,
            config JSONB NOT NULL,
            delay_seconds INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE(workflow_id, position)
        )
        ",
        r"
        CREATE TABLE IF NOT EXISTS event_logs (
            id UUID PRIMARY KEY,
            organization_id UUID NOT NULL REFERENCES organizations(id),
            api_key_id UUID REFERENCES api_keys(id),
            event_type TEXT NOT NULL,
            payload JSONB NOT NULL,
            source TEXT,
            idempotency_key TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
        r"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_event_logs_org_idempotency
        ON event_logs(organization_id, idempotency_key)
        WHERE idempotency_key IS NOT NULL
        ",
        r"
        CREATE TABLE IF NOT EXISTS automation_runs (
            id UUID PRIMARY KEY,
            workflow_id UUID NOT NULL REFERENCES workflows(id),
            organization_id UUID NOT NULL REFERENCES organizations(id),
            event_log_id UUID NOT NULL REFERENCES event_logs(id),
            trigger_data JSONB NOT NULL,
            status TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
        r"
        CREATE INDEX IF NOT EXISTS idx_automation_runs_event
        ON automation_runs(organization_id, event_log_id)
        ",
        r"
        CREATE TABLE IF NOT EXISTS job_queue_items (
            id UUID PRIMARY KEY,
            run_id UUID NOT NULL REFERENCES automation_runs(id),
            action_id UUID NOT NULL REFERENCES workflow_actions(id),
            organization_id UUID NOT NULL REFERENCES organizations(id),
            payload JSONB NOT NULL,
            status TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
        r"
        CREATE INDEX IF NOT EXISTS idx_job_queue_pending
        ON job_queue_items(organization_id, status, created_at)
        WHERE status = 'pending'
        ",
        r"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id UUID PRIMARY KEY,
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT,
            organization_id UUID,
            user_id UUID,
            details JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
        r"
        CREATE TABLE IF NOT EXISTS rate_limit_counters (
            bucket TEXT NOT NULL,
            window_start TIMESTAMPTZ NOT NULL,
            count BIGINT NOT NULL DEFAULT 0,
            PRIMARY KEY (bucket, window_start)
        )
        ",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_can_be_created() {
        // Instantiation only; behavior is covered by integration tests.
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _storage = Storage::new(pool);
    }
}
