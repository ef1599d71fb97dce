//! Domain models and strongly-typed identifiers.
//!
//! Defines organizations, API keys, workflows, event logs, automation
//! runs, and queued jobs, with newtype ID wrappers for compile-time type
//! safety and sqlx codecs for Postgres storage. Every organization-scoped
//! entity carries its `OrganizationId`; repository queries filter on it
//! unconditionally.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Declares a UUID-backed newtype identifier with sqlx codecs.
///
/// Each generated type is a transparent wrapper over [`Uuid`] that cannot
/// be confused with any other ID type at compile time.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random identifier (UUID v4).
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl sqlx::Type<PgDb> for $name {
            fn type_info() -> PgTypeInfo {
                <Uuid as sqlx::Type<PgDb>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, PgDb> for $name {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                Ok(Self(<Uuid as sqlx::Decode<PgDb>>::decode(value)?))
            }
        }

        impl sqlx::Encode<'_, PgDb> for $name {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
                <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

uuid_id! {
    /// Identifier of an organization, the tenant isolation boundary.
    ///
    /// Every scoped read and write in the system is keyed by this type.
    /// A query that compiles without one is almost certainly a tenant
    /// isolation bug.
    OrganizationId
}

uuid_id! {
    /// Identifier of an API key record (not the secret itself).
    ApiKeyId
}

uuid_id! {
    /// Identifier of a persisted webhook event.
    EventId
}

uuid_id! {
    /// Identifier of a workflow definition.
    WorkflowId
}

uuid_id! {
    /// Identifier of a single workflow action.
    ActionId
}

uuid_id! {
    /// Identifier of an automation run.
    RunId
}

uuid_id! {
    /// Identifier of a queued job.
    JobId
}

uuid_id! {
    /// Identifier of a dashboard user.
    UserId
}

/// Declares a string-backed enum with `Display` and sqlx text codecs.
macro_rules! text_enum {
    (
        $(#[$meta:meta])* $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $text)),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(concat!("invalid ", stringify!($name), ": {}"), other)),
                }
            }
        }

        impl sqlx::Type<PgDb> for $name {
            fn type_info() -> PgTypeInfo {
                <&str as sqlx::Type<PgDb>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, PgDb> for $name {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
                s.parse().map_err(Into::into)
            }
        }

        impl sqlx::Encode<'_, PgDb> for $name {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
                <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
            }
        }
    };
}

text_enum! {
    /// Lifecycle status of an automation run.
    ///
    /// Runs are created `Pending` by the fan-out step. All later
    /// transitions belong to the external job worker.
    RunStatus {
        /// Created, jobs enqueued, awaiting the worker.
        Pending => "pending",
        /// Worker is executing the run's jobs.
        Running => "running",
        /// All jobs finished successfully.
        Completed => "completed",
        /// At least one job failed terminally.
        Failed => "failed",
    }
}

text_enum! {
    /// Lifecycle status of a queued job.
    JobStatus {
        /// Waiting to be claimed by the worker.
        Pending => "pending",
        /// Claimed and executing.
        Processing => "processing",
        /// Finished successfully.
        Completed => "completed",
        /// Failed terminally.
        Failed => "failed",
    }
}

text_enum! {
    /// Role carried by an admin dashboard session.
    ///
    /// `Admin` is required for API key management; `Viewer` sessions may
    /// still ingest events on behalf of their organization.
    SessionRole {
        /// Full management rights within the organization.
        Admin => "admin",
        /// Read-mostly dashboard access.
        Viewer => "viewer",
    }
}

/// An organization: the tenant boundary all core data is partitioned by.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Organization {
    /// Unique identifier.
    pub id: OrganizationId,
    /// Display name.
    pub name: String,
    /// URL-safe slug, unique across the platform.
    pub slug: String,
    /// Inactive organizations reject all ingestion.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A stored API key: cleartext prefix plus a one-way hash of the secret.
///
/// The plaintext secret is returned exactly once at creation and never
/// persisted. Revocation is a soft delete: the row is kept for audit but
/// is never again verifiable or listed.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    /// Unique identifier.
    pub id: ApiKeyId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Human-readable name chosen at creation.
    pub name: String,
    /// Cleartext lookup prefix, e.g. `kz_live_a1b2c3d4`.
    pub key_prefix: String,
    /// Argon2id hash of the secret portion. Never serialized.
    pub key_hash: String,
    /// User who issued the key.
    pub created_by: UserId,
    /// Last successful verification, updated asynchronously.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Soft-delete timestamp; set once, never cleared.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// True when the key has been revoked.
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// A workflow definition, consumed read-only by the trigger matcher.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workflow {
    /// Unique identifier.
    pub id: WorkflowId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Display name.
    pub name: String,
    /// Inactive workflows are never matched.
    pub is_active: bool,
    /// Event-type string this workflow reacts to. Matching is exact
    /// string equality; no wildcard or pattern evaluation.
    pub trigger: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Closed set of action kinds with per-variant structured config.
///
/// Validated at workflow creation time by virtue of being a tagged enum;
/// the fan-out step copies the config verbatim into the queued job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionConfig {
    /// Send a templated email to an address taken from the event payload.
    SendEmail {
        /// Template identifier known to the mail subsystem.
        template: String,
        /// JSON field of the event payload holding the recipient.
        to_field: String,
    },
    /// Post a message to a Slack channel.
    SlackPost {
        /// Target channel, e.g. `#alerts`.
        channel: String,
        /// Message template with payload interpolation.
        message_template: String,
    },
    /// Call an external HTTP endpoint.
    HttpCall {
        /// Target URL.
        url: String,
        /// HTTP method, uppercase.
        method: String,
    },
}

/// A single ordered action within a workflow.
///
/// Immutable once referenced by a run; the organization id is
/// denormalized so job rows can be scoped without a join.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkflowAction {
    /// Unique identifier.
    pub id: ActionId,
    /// Parent workflow.
    pub workflow_id: WorkflowId,
    /// Owning organization (denormalized from the workflow).
    pub organization_id: OrganizationId,
    /// Zero-based execution order within the workflow.
    pub position: i32,
    /// Typed action configuration.
    pub config: sqlx::types::Json<ActionConfig>,
    /// Seconds to wait before executing this action.
    pub delay_seconds: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One accepted webhook event.
///
/// `(organization_id, idempotency_key)` is unique when the key is
/// present; that constraint is the deduplication guarantee.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventLog {
    /// Unique identifier.
    pub id: EventId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Key that authenticated the request; NULL for admin-session
    /// ingestion.
    pub api_key_id: Option<ApiKeyId>,
    /// Sanitized event type string.
    pub event_type: String,
    /// Arbitrary structured payload.
    pub payload: sqlx::types::Json<serde_json::Value>,
    /// Optional caller-supplied source label.
    pub source: Option<String>,
    /// Optional caller-supplied deduplication token.
    pub idempotency_key: Option<String>,
    /// Ingestion timestamp.
    pub created_at: DateTime<Utc>,
}

/// One instantiation of a workflow in response to a matched event.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AutomationRun {
    /// Unique identifier.
    pub id: RunId,
    /// Workflow that was matched.
    pub workflow_id: WorkflowId,
    /// Owning organization; always equals the event's organization.
    pub organization_id: OrganizationId,
    /// Event that triggered this run.
    pub event_log_id: EventId,
    /// Snapshot of the event payload at trigger time.
    pub trigger_data: sqlx::types::Json<serde_json::Value>,
    /// Current status.
    pub status: RunStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One queued unit of work for a single workflow action within a run.
///
/// Consumed by the external job worker; this crate only guarantees the
/// row is durably enqueued with correct payload and organization scope.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobQueueItem {
    /// Unique identifier.
    pub id: JobId,
    /// Parent run.
    pub run_id: RunId,
    /// Action this job executes.
    pub action_id: ActionId,
    /// Owning organization; always equals the run's organization.
    pub organization_id: OrganizationId,
    /// Action config plus trigger data, ready for the worker.
    pub payload: sqlx::types::Json<serde_json::Value>,
    /// Current status.
    pub status: JobStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Append-only audit record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditLog {
    /// Unique identifier.
    pub id: Uuid,
    /// Action name, e.g. `API_KEY_CREATED`.
    pub action: String,
    /// Resource type the action applies to.
    pub resource_type: String,
    /// Resource identifier when one exists.
    pub resource_id: Option<String>,
    /// Organization scope; NULL for system-wide entries.
    pub organization_id: Option<OrganizationId>,
    /// Acting user when known.
    pub user_id: Option<UserId>,
    /// Structured details, scrubbed of secrets before writing.
    pub details: sqlx::types::Json<serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// An admin dashboard session backing the cookie auth path.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdminSession {
    /// Unique identifier, doubles as the rate-limit subject.
    pub id: Uuid,
    /// Hex-encoded SHA-256 digest of the session token. The token itself
    /// is high-entropy and random, so an unsalted digest supports direct
    /// lookup.
    pub token_hash: String,
    /// Authenticated dashboard user.
    pub user_id: UserId,
    /// Organization the session is bound to.
    pub organization_id: OrganizationId,
    /// Role granted to this session.
    pub role: SessionRole,
    /// Expiry; sessions past this instant never authenticate.
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl AdminSession {
    /// True when the session is still within its validity window.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_round_trips_through_text() {
        for status in [RunStatus::Pending, RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            let text = status.to_string();
            assert_eq!(text.parse::<RunStatus>().unwrap(), status);
        }
    }

    #[test]
    fn job_status_rejects_unknown_text() {
        assert!("queued".parse::<JobStatus>().is_err());
    }

    #[test]
    fn action_config_uses_tagged_representation() {
        let config = ActionConfig::SlackPost {
            channel: "#alerts".into(),
            message_template: "{{event_type}} received".into(),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "slack_post");
        assert_eq!(json["channel"], "#alerts");

        let back: ActionConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn ids_are_distinct_types_with_display() {
        let org = OrganizationId::new();
        assert_eq!(org.to_string(), org.0.to_string());
    }

    #[test]
    fn expired_session_is_invalid() {
        let now = Utc::now();
        let session = AdminSession {
            id: Uuid::new_v4(),
            token_hash: "x".into(),
            user_id: UserId::new(),
            organization_id: OrganizationId::new(),
            role: SessionRole::Admin,
            expires_at: now - chrono::Duration::seconds(1),
            created_at: now - chrono::Duration::hours(1),
        };
        assert!(!session.is_valid_at(now));
    }
}
