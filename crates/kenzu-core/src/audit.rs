//! Append-only audit logging with secret redaction.
//!
//! Every authentication outcome and ingestion decision is recorded here.
//! Audit writes never abort the primary operation: failures are logged
//! and swallowed so a broken audit table cannot take down ingestion.

use std::sync::Arc;

use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use crate::{
    models::{OrganizationId, UserId},
    storage::audit_logs,
};

/// Field names whose values are replaced before an audit row is written.
const SECRET_FIELD_MARKERS: &[&str] =
    &["secret", "token", "password", "api_key", "apikey", "authorization", "cookie", "key_hash"];

/// Well-known audit actions emitted by the core pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// A new API key was issued.
    ApiKeyCreated,
    /// An API key was revoked.
    ApiKeyRevoked,
    /// A webhook event was accepted and persisted.
    WebhookIngested,
    /// A request presented missing or invalid credentials.
    AuthFailed,
    /// An API key arrived with browser-only headers attached.
    SuspiciousApiKeyUse,
    /// A request was rejected by the rate limiter.
    RateLimited,
}

impl AuditAction {
    /// Stable string form stored in the `action` column.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiKeyCreated => "API_KEY_CREATED",
            Self::ApiKeyRevoked => "API_KEY_REVOKED",
            Self::WebhookIngested => "WEBHOOK_INGESTED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::SuspiciousApiKeyUse => "SUSPICIOUS_API_KEY_USE",
            Self::RateLimited => "RATE_LIMITED",
        }
    }
}

/// One audit entry before persistence.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    /// Action being recorded.
    pub action: AuditAction,
    /// Resource type, e.g. `api_key` or `event_log`.
    pub resource_type: &'static str,
    /// Resource identifier when one exists.
    pub resource_id: Option<String>,
    /// Organization scope when known.
    pub organization_id: Option<OrganizationId>,
    /// Acting user when known.
    pub user_id: Option<UserId>,
    /// Structured details; scrubbed before writing.
    pub details: Value,
}

/// Audit logger backed by the `audit_logs` repository.
#[derive(Clone)]
pub struct AuditLogger {
    repo: Arc<audit_logs::Repository>,
}

impl AuditLogger {
    /// Creates an audit logger over the given repository.
    pub fn new(repo: Arc<audit_logs::Repository>) -> Self {
        Self { repo }
    }

    /// Records an audit entry, redacting secret-like fields first.
    ///
    /// Failures are reported through tracing and otherwise swallowed;
    /// the primary operation must not observe them.
    pub async fn record(&self, entry: AuditEntry) {
        let details = redact_secrets(entry.details);

        let result = self
            .repo
            .append(
                Uuid::new_v4(),
                entry.action.as_str(),
                entry.resource_type,
                entry.resource_id.as_deref(),
                entry.organization_id,
                entry.user_id,
                &details,
            )
            .await;

        if let Err(e) = result {
            error!(
                action = entry.action.as_str(),
                error = %e,
                "audit write failed, entry dropped"
            );
        }
    }
}

/// Recursively replaces values of secret-like fields with `"[REDACTED]"`.
///
/// Matching is case-insensitive on field-name substrings, so
/// `stripeApiKey`, `session_token`, and `Authorization` are all caught.
pub fn redact_secrets(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let redacted = map
                .into_iter()
                .map(|(key, val)| {
                    let lowered = key.to_ascii_lowercase();
                    let is_secret =
                        SECRET_FIELD_MARKERS.iter().any(|marker| lowered.contains(marker));
                    let val = if is_secret {
                        Value::String("[REDACTED]".to_string())
                    } else {
                        redact_secrets(val)
                    };
                    (key, val)
                })
                .collect();
            Value::Object(redacted)
        },
        Value::Array(items) => Value::Array(items.into_iter().map(redact_secrets).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn redacts_secret_fields_at_any_depth() {
        let input = json!({
            "event_type": "demo.event",
            "api_key": "kz_live_abc123",
            "nested": {
                "sessionToken": "tok_456",
                "count": 3,
            },
            "items": [{"password": "hunter2"}],
        });

        let out = redact_secrets(input);

        assert_eq!(out["event_type"], "demo.event");
        assert_eq!(out["api_key"], "[REDACTED]");
        assert_eq!(out["nested"]["sessionToken"], "[REDACTED]");
        assert_eq!(out["nested"]["count"], 3);
        assert_eq!(out["items"][0]["password"], "[REDACTED]");
    }

    #[test]
    fn leaves_non_secret_values_untouched() {
        let input = json!({"triggered": 2, "run_ids": ["a", "b"]});
        assert_eq!(redact_secrets(input.clone()), input);
    }

    #[test]
    fn action_names_are_stable() {
        assert_eq!(AuditAction::ApiKeyCreated.as_str(), "API_KEY_CREATED");
        assert_eq!(AuditAction::WebhookIngested.as_str(), "WEBHOOK_INGESTED");
        assert_eq!(AuditAction::RateLimited.as_str(), "RATE_LIMITED");
    }
}
