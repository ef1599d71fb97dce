//! Rate-limit middleware over the shared counter store.
//!
//! Policy selection follows the credential class: API keys get the
//! per-key policy, admin sessions the tighter per-session policy. The
//! subject string is the credential's id, so limits follow the caller
//! across service instances.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use kenzu_core::{audit::AuditEntry, AuditAction};
use kenzu_ratelimit::Policy;
use serde_json::json;

use crate::{error::ApiError, state::{AppState, AuthContext}};

/// Checks the caller's rate limit and either forwards the request or
/// answers 429 with retry headers.
///
/// Runs after authentication; a request without [`AuthContext`] is a
/// wiring bug and is treated as an internal error rather than allowed
/// through unlimited.
pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(context) = req.extensions().get::<AuthContext>().cloned() else {
        return Err(ApiError::Internal("rate limit middleware ran without auth context".into()));
    };

    let (policy, subject) = match &context {
        AuthContext::ApiKey(key) => (Policy::api_key(), key.api_key_id.to_string()),
        AuthContext::Session(session) => (Policy::admin(), session.session_id.to_string()),
    };

    let decision = state.limiter.check(&policy, &subject).await;

    if !decision.allowed {
        state
            .audit
            .record(AuditEntry {
                action: AuditAction::RateLimited,
                resource_type: "request",
                resource_id: None,
                organization_id: Some(context.organization_id()),
                user_id: context.session().map(|s| s.user_id),
                details: json!({
                    "policy": policy.name,
                    "limit": policy.limit,
                    "retry_after_seconds": decision.retry_after_seconds,
                }),
            })
            .await;
        return Err(ApiError::RateLimited(decision));
    }

    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", v);
    }

    Ok(response)
}
