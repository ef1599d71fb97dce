//! Fixture builders for integration tests.
//!
//! Every fixture carries a unique suffix so tests sharing a database do
//! not collide on unique columns.

use anyhow::Result;
use chrono::{Duration, Utc};
use kenzu_auth::{hash_session_token, ApiKeyManager, IssuedKey, KeyEnvironment};
use kenzu_core::{
    ActionConfig, ActionId, AdminSession, AuditLogger, Organization, OrganizationId,
    SessionRole, UserId, Workflow, WorkflowAction, WorkflowId,
};
use uuid::Uuid;

use crate::TestEnv;

/// Short unique suffix for names and slugs.
fn unique_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

impl TestEnv {
    /// Creates and persists an organization with a unique slug.
    pub async fn create_organization(&self, name: &str) -> Result<Organization> {
        let org = Organization {
            id: OrganizationId::new(),
            name: name.to_string(),
            slug: format!("{}-{}", name.to_lowercase().replace(' ', "-"), unique_suffix()),
            is_active: true,
            created_at: Utc::now(),
        };
        self.storage().organizations.create(&org).await?;
        Ok(org)
    }

    /// Issues a test-environment API key for an organization.
    ///
    /// Returns the full issued key including the plaintext, the way the
    /// creation endpoint would.
    pub async fn create_api_key(
        &self,
        organization_id: OrganizationId,
        name: &str,
    ) -> Result<IssuedKey> {
        let audit = AuditLogger::new(self.storage().audit_logs.clone());
        let manager =
            ApiKeyManager::new(self.storage().api_keys.clone(), audit, KeyEnvironment::Test);
        let issued = manager.create(organization_id, UserId::new(), name).await?;
        Ok(issued)
    }

    /// Creates an active workflow with the given trigger and ordered
    /// actions.
    pub async fn create_workflow(
        &self,
        organization_id: OrganizationId,
        trigger: &str,
        actions: Vec<ActionConfig>,
    ) -> Result<Workflow> {
        let now = Utc::now();
        let workflow = Workflow {
            id: WorkflowId::new(),
            organization_id,
            name: format!("workflow-{}", unique_suffix()),
            is_active: true,
            trigger: trigger.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.storage().workflows.create(&workflow).await?;

        for (position, config) in actions.into_iter().enumerate() {
            let action = WorkflowAction {
                id: ActionId::new(),
                workflow_id: workflow.id,
                organization_id,
                position: i32::try_from(position).unwrap_or(i32::MAX),
                config: sqlx::types::Json(config),
                delay_seconds: 0,
                created_at: now,
            };
            self.storage().workflows.add_action(&action).await?;
        }

        Ok(workflow)
    }

    /// Creates an admin session, returning the record and the plaintext
    /// cookie token.
    pub async fn create_admin_session(
        &self,
        organization_id: OrganizationId,
        role: SessionRole,
    ) -> Result<(AdminSession, String)> {
        let token = format!("sess-{}", Uuid::new_v4().simple());
        let session = AdminSession {
            id: Uuid::new_v4(),
            token_hash: hash_session_token(&token),
            user_id: UserId::new(),
            organization_id,
            role,
            expires_at: Utc::now() + Duration::hours(1),
            created_at: Utc::now(),
        };
        self.storage().admin_sessions.create(&session).await?;
        Ok((session, token))
    }

    /// A simple one-action config useful as a default fixture.
    pub fn email_action() -> ActionConfig {
        ActionConfig::SendEmail {
            template: "welcome".to_string(),
            to_field: "contact".to_string(),
        }
    }
}
