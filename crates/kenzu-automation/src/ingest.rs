//! Webhook ingestion: validation, idempotency, persistence, fan-out.
//!
//! The service sits behind the HTTP boundary and owns everything between
//! "authenticated request" and "response payload". Field validation is
//! strict and itemized; strings are stripped of control characters and
//! bounded before they reach storage.

use chrono::Utc;
use kenzu_core::{
    audit::AuditEntry,
    storage::Storage,
    ApiKeyId, AuditAction, AuditLogger, CoreError, EventId, EventLog, JobId, OrganizationId,
    RunId, UserId,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::matcher::TriggerMatcher;

/// Maximum length of `event_type`, `source`, and `idempotency_key`
/// after sanitization.
const MAX_BOUNDED_STRING: usize = 255;

/// The credential that authenticated an ingestion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// Server-to-server request authenticated by an API key.
    ApiKey(ApiKeyId),
    /// Dashboard request authenticated by an admin session.
    AdminUser(UserId),
}

impl Actor {
    /// API key id when this actor is a key, for tagging the event row.
    pub fn api_key_id(self) -> Option<ApiKeyId> {
        match self {
            Self::ApiKey(id) => Some(id),
            Self::AdminUser(_) => None,
        }
    }

    /// User id when this actor is an admin session.
    pub fn user_id(self) -> Option<UserId> {
        match self {
            Self::ApiKey(_) => None,
            Self::AdminUser(id) => Some(id),
        }
    }
}

/// Parsed ingestion request body.
///
/// The boundary parses JSON into this shape; validation beyond basic
/// typing happens in [`validate`] so errors can be itemized per field.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    /// Event type string, required.
    pub event_type: Option<String>,
    /// Arbitrary structured payload, required, must be an object.
    pub payload: Option<Value>,
    /// Optional source label.
    pub source: Option<String>,
    /// Optional deduplication token.
    pub idempotency_key: Option<String>,
}

/// One itemized validation failure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    /// Offending field, in request naming (`eventType`, ...).
    pub field: &'static str,
    /// Human-readable description.
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

/// Errors surfaced by the ingestion service.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The request body violated the schema; itemized per field.
    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),

    /// Underlying storage failure.
    #[error(transparent)]
    Storage(#[from] CoreError),
}

/// Result of an accepted ingestion call.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Persisted (or replayed) event id.
    pub event_id: EventId,
    /// Sanitized event type.
    pub event_type: String,
    /// Number of workflows that matched.
    pub triggered: usize,
    /// Created run ids.
    pub run_ids: Vec<RunId>,
    /// Created job ids.
    pub job_ids: Vec<JobId>,
    /// True when this request replayed a previous idempotent result.
    pub replayed: bool,
}

/// Strips control characters (including NUL) from a string.
fn sanitize(input: &str) -> String {
    input.chars().filter(|c| !c.is_control()).collect()
}

/// A sanitized, validated event ready for persistence.
#[derive(Debug, Clone)]
struct ValidatedEvent {
    event_type: String,
    payload: Value,
    source: Option<String>,
    idempotency_key: Option<String>,
}

/// Validates an ingestion request, returning all field errors at once.
fn validate(request: &IngestRequest) -> Result<ValidatedEvent, Vec<FieldError>> {
    let mut errors = Vec::new();

    let event_type = match &request.event_type {
        None => {
            errors.push(FieldError::new("eventType", "is required"));
            String::new()
        },
        Some(raw) => {
            let cleaned = sanitize(raw);
            if cleaned.is_empty() {
                errors.push(FieldError::new("eventType", "must not be empty"));
            } else if cleaned.len() > MAX_BOUNDED_STRING {
                errors.push(FieldError::new(
                    "eventType",
                    format!("must be at most {MAX_BOUNDED_STRING} characters"),
                ));
            }
            cleaned
        },
    };

    let payload = match &request.payload {
        None => {
            errors.push(FieldError::new("payload", "is required"));
            Value::Null
        },
        Some(value) if !value.is_object() => {
            errors.push(FieldError::new("payload", "must be an object"));
            Value::Null
        },
        Some(value) => value.clone(),
    };

    let source = match &request.source {
        None => None,
        Some(raw) => {
            let cleaned = sanitize(raw);
            if cleaned.len() > MAX_BOUNDED_STRING {
                errors.push(FieldError::new(
                    "source",
                    format!("must be at most {MAX_BOUNDED_STRING} characters"),
                ));
            }
            if cleaned.is_empty() { None } else { Some(cleaned) }
        },
    };

    let idempotency_key = match &request.idempotency_key {
        None => None,
        Some(raw) => {
            let cleaned = sanitize(raw);
            if cleaned.is_empty() {
                errors.push(FieldError::new("idempotencyKey", "must not be empty when present"));
                None
            } else if cleaned.len() > MAX_BOUNDED_STRING {
                errors.push(FieldError::new(
                    "idempotencyKey",
                    format!("must be at most {MAX_BOUNDED_STRING} characters"),
                ));
                None
            } else {
                Some(cleaned)
            }
        },
    };

    if errors.is_empty() {
        Ok(ValidatedEvent { event_type, payload, source, idempotency_key })
    } else {
        Err(errors)
    }
}

/// Ingestion service: the validate -> dedup -> persist -> fan-out
/// sequence behind `POST /hooks/ingest`.
#[derive(Clone)]
pub struct IngestService {
    storage: Storage,
    matcher: TriggerMatcher,
    audit: AuditLogger,
}

impl IngestService {
    /// Creates the service over shared storage.
    pub fn new(storage: Storage, audit: AuditLogger) -> Self {
        let matcher = TriggerMatcher::new(storage.clone());
        Self { storage, matcher, audit }
    }

    /// Ingests one webhook event for an organization.
    ///
    /// Re-ingestion under an already-seen idempotency key is a no-op
    /// that replays the first call's result; it never re-triggers
    /// workflows. A concurrent duplicate race is resolved by the unique
    /// constraint: the loser detects the violation and returns the
    /// winner's result.
    ///
    /// # Errors
    ///
    /// `Validation` with itemized field errors, or `Storage` when the
    /// datastore fails after bounded retries.
    #[instrument(skip(self, request), fields(org = %organization_id))]
    pub async fn ingest(
        &self,
        organization_id: OrganizationId,
        actor: Actor,
        request: IngestRequest,
    ) -> Result<IngestOutcome, IngestError> {
        let validated = validate(&request).map_err(IngestError::Validation)?;

        if let Some(key) = &validated.idempotency_key {
            if let Some(existing) = self
                .storage
                .event_logs
                .find_by_idempotency_key(organization_id, key)
                .await?
            {
                debug!(event_id = %existing.id, "idempotent replay, returning stored result");
                return self.replay(organization_id, existing.id, &existing.event_type).await;
            }
        }

        let event = EventLog {
            id: EventId::new(),
            organization_id,
            api_key_id: actor.api_key_id(),
            event_type: validated.event_type.clone(),
            payload: sqlx::types::Json(validated.payload),
            source: validated.source,
            idempotency_key: validated.idempotency_key.clone(),
            created_at: Utc::now(),
        };

        match self.storage.event_logs.create(&event).await {
            Ok(_) => {},
            Err(e) if e.is_unique_violation() => {
                // Lost the duplicate-key race; the winner's row is
                // committed, so serve its result. Only committed run
                // and job linkage is visible here: if the winner's
                // fan-out is still in flight this replay can report a
                // lower `triggered` than the winner's own response.
                // The rows themselves are never duplicated, and a
                // later replay of the same key sees the full linkage.
                let key = validated.idempotency_key.as_deref().unwrap_or_default();
                warn!(idempotency_key = key, "duplicate-key race lost, replaying winner");
                let winner = self
                    .storage
                    .event_logs
                    .find_by_idempotency_key(organization_id, key)
                    .await?
                    .ok_or(e)?;
                return self.replay(organization_id, winner.id, &winner.event_type).await;
            },
            Err(e) => return Err(e.into()),
        }

        let fan_out = self.matcher.fan_out(&event).await?;

        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            triggered = fan_out.run_ids.len(),
            "webhook ingested"
        );

        self.audit
            .record(AuditEntry {
                action: AuditAction::WebhookIngested,
                resource_type: "event_log",
                resource_id: Some(event.id.to_string()),
                organization_id: Some(organization_id),
                user_id: actor.user_id(),
                details: serde_json::json!({
                    "event_type": event.event_type,
                    "triggered": fan_out.run_ids.len(),
                    "jobs_created": fan_out.job_ids.len(),
                    "has_idempotency_key": event.idempotency_key.is_some(),
                }),
            })
            .await;

        Ok(IngestOutcome {
            event_id: event.id,
            event_type: event.event_type,
            triggered: fan_out.run_ids.len(),
            run_ids: fan_out.run_ids,
            job_ids: fan_out.job_ids,
            replayed: false,
        })
    }

    /// Rebuilds the response for a previously ingested event.
    async fn replay(
        &self,
        organization_id: OrganizationId,
        event_id: EventId,
        event_type: &str,
    ) -> Result<IngestOutcome, IngestError> {
        let run_ids = self.storage.automation_runs.ids_for_event(organization_id, event_id).await?;
        let job_ids = self.storage.job_queue.ids_for_event(organization_id, event_id).await?;

        Ok(IngestOutcome {
            event_id,
            event_type: event_type.to_string(),
            triggered: run_ids.len(),
            run_ids,
            job_ids,
            replayed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(body: Value) -> IngestRequest {
        serde_json::from_value(body).expect("parse request")
    }

    #[test]
    fn valid_request_passes_with_sanitized_fields() {
        let req = request(json!({
            "eventType": "demo.event",
            "payload": {"contact": "ada@example.com"},
            "source": "crm",
            "idempotencyKey": "evt-123",
        }));

        let validated = validate(&req).unwrap();
        assert_eq!(validated.event_type, "demo.event");
        assert_eq!(validated.idempotency_key.as_deref(), Some("evt-123"));
        assert_eq!(validated.source.as_deref(), Some("crm"));
    }

    #[test]
    fn missing_event_type_and_payload_are_both_reported() {
        let req = request(json!({"source": "crm"}));
        let errors = validate(&req).unwrap_err();

        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"eventType"));
        assert!(fields.contains(&"payload"));
    }

    #[test]
    fn control_characters_are_stripped() {
        let req = request(json!({
            "eventType": "demo\u{0000}.ev\u{0007}ent\n",
            "payload": {},
        }));

        let validated = validate(&req).unwrap();
        assert_eq!(validated.event_type, "demo.event");
    }

    #[test]
    fn event_type_of_only_control_characters_is_empty() {
        let req = request(json!({
            "eventType": "\u{0000}\u{0001}",
            "payload": {},
        }));

        let errors = validate(&req).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "eventType");
    }

    #[test]
    fn overlong_strings_are_rejected_not_truncated() {
        let long = "x".repeat(MAX_BOUNDED_STRING + 1);
        let req = request(json!({
            "eventType": long.clone(),
            "payload": {},
            "idempotencyKey": long,
        }));

        let errors = validate(&req).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"eventType"));
        assert!(fields.contains(&"idempotencyKey"));
    }

    #[test]
    fn payload_must_be_an_object() {
        let req = request(json!({
            "eventType": "demo.event",
            "payload": [1, 2, 3],
        }));

        let errors = validate(&req).unwrap_err();
        assert_eq!(errors[0].field, "payload");
    }

    #[test]
    fn empty_source_becomes_none() {
        let req = request(json!({
            "eventType": "demo.event",
            "payload": {},
            "source": "",
        }));

        let validated = validate(&req).unwrap();
        assert!(validated.source.is_none());
    }

    #[test]
    fn actor_tags_events_correctly() {
        let key_id = ApiKeyId::new();
        assert_eq!(Actor::ApiKey(key_id).api_key_id(), Some(key_id));
        assert_eq!(Actor::ApiKey(key_id).user_id(), None);

        let user = UserId::new();
        assert_eq!(Actor::AdminUser(user).api_key_id(), None);
        assert_eq!(Actor::AdminUser(user).user_id(), Some(user));
    }
}
