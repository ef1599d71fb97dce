//! Core domain models and storage for the Kenzu automation platform.
//!
//! Provides strongly-typed domain primitives, the error taxonomy, the
//! repository-pattern storage layer, and the audit logger. All other
//! crates depend on these foundational types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod error;
pub mod models;
pub mod storage;

pub use audit::{redact_secrets, AuditAction, AuditLogger};
pub use error::{CoreError, Result};
pub use models::{
    ActionConfig, ActionId, AdminSession, ApiKey, ApiKeyId, AuditLog, AutomationRun, EventId,
    EventLog, JobId, JobQueueItem, JobStatus, Organization, OrganizationId, RunId, RunStatus,
    SessionRole, UserId, Workflow, WorkflowAction, WorkflowId,
};
