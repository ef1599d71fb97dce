//! Authentication middleware: API key XOR admin session cookie.
//!
//! The same boundary accepts either an `x-api-key` header (server to
//! server) or a `kz_session` cookie (browser dashboard). Presenting both
//! is ambiguous and rejected outright. An API key arriving together with
//! browser-only headers is rejected as suspicious; this heuristic is
//! best-effort hardening on top of the real credential check, not a
//! security boundary on its own.

use axum::{
    body::Body,
    extract::State,
    http::{header::COOKIE, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use kenzu_auth::hash_session_token;
use kenzu_core::{audit::AuditEntry, AuditAction, OrganizationId};
use serde_json::json;
use tracing::warn;

use crate::{error::ApiError, state::{AppState, AuthContext, SessionContext}};

/// Name of the admin session cookie.
pub const SESSION_COOKIE: &str = "kz_session";

/// Header carrying the API key on server-to-server requests.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Headers browsers attach that server-to-server clients do not.
const BROWSER_HEADERS: &[&str] = &["origin", "sec-fetch-site", "sec-fetch-mode"];

/// Extracts the API key header value, if present.
fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()).map(str::trim).map(String::from)
}

/// Extracts the session cookie value from the Cookie header, if present.
fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

/// The first browser-only header present on the request, if any.
fn browser_marker(headers: &HeaderMap) -> Option<&'static str> {
    BROWSER_HEADERS.iter().copied().find(|name| headers.contains_key(*name))
}

/// Authenticates the request and injects [`AuthContext`].
///
/// A valid credential is not enough on its own: the owning organization
/// must still be active, so deactivating a tenant cuts off its keys and
/// sessions without revoking them one by one. Denials are audited before
/// the error is returned so that probing patterns stay discoverable.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = req.headers();
    let api_key = extract_api_key(headers);
    let session_token = extract_session_cookie(headers);
    let browser = browser_marker(headers);

    let context = match (api_key, session_token) {
        (Some(_), Some(_)) => {
            audit_denial(
                &state,
                AuditAction::AuthFailed,
                None,
                json!({"reason": "ambiguous_credentials"}),
            )
            .await;
            return Err(ApiError::Forbidden);
        },
        (Some(key), None) => {
            if let Some(header) = browser {
                warn!(header, "api key presented with browser headers, rejecting");
                audit_denial(
                    &state,
                    AuditAction::SuspiciousApiKeyUse,
                    None,
                    json!({"reason": "browser_headers_present", "header": header}),
                )
                .await;
                return Err(ApiError::Forbidden);
            }

            match state.keys.verify(&key).await? {
                Some(verified) => AuthContext::ApiKey(verified),
                None => {
                    audit_denial(
                        &state,
                        AuditAction::AuthFailed,
                        None,
                        json!({"reason": "invalid_api_key"}),
                    )
                    .await;
                    return Err(ApiError::Unauthorized);
                },
            }
        },
        (None, Some(token)) => {
            let digest = hash_session_token(&token);
            match state.storage.admin_sessions.find_valid(&digest).await? {
                Some(session) => AuthContext::Session(SessionContext {
                    session_id: session.id,
                    user_id: session.user_id,
                    organization_id: session.organization_id,
                    role: session.role,
                }),
                None => {
                    audit_denial(
                        &state,
                        AuditAction::AuthFailed,
                        None,
                        json!({"reason": "invalid_session"}),
                    )
                    .await;
                    return Err(ApiError::Unauthorized);
                },
            }
        },
        (None, None) => {
            audit_denial(
                &state,
                AuditAction::AuthFailed,
                None,
                json!({"reason": "no_credentials"}),
            )
            .await;
            return Err(ApiError::Unauthorized);
        },
    };

    let organization_id = context.organization_id();
    if !state.storage.organizations.is_active(organization_id).await? {
        warn!(%organization_id, "credential for inactive organization, rejecting");
        audit_denial(
            &state,
            AuditAction::AuthFailed,
            Some(organization_id),
            json!({"reason": "organization_inactive"}),
        )
        .await;
        return Err(ApiError::Forbidden);
    }

    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}

async fn audit_denial(
    state: &AppState,
    action: AuditAction,
    organization_id: Option<OrganizationId>,
    details: serde_json::Value,
) {
    state
        .audit
        .record(AuditEntry {
            action,
            resource_type: "request",
            resource_id: None,
            organization_id,
            user_id: None,
            details,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn extracts_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("kz_live_abc"));
        assert_eq!(extract_api_key(&headers), Some("kz_live_abc".to_string()));
    }

    #[test]
    fn missing_api_key_header_is_none() {
        assert_eq!(extract_api_key(&HeaderMap::new()), None);
    }

    #[test]
    fn extracts_session_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; kz_session=tok123; lang=en"),
        );
        assert_eq!(extract_session_cookie(&headers), Some("tok123".to_string()));
    }

    #[test]
    fn empty_session_cookie_is_none() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("kz_session="));
        assert_eq!(extract_session_cookie(&headers), None);
    }

    #[test]
    fn detects_browser_only_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(browser_marker(&headers), None);

        headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
        assert_eq!(browser_marker(&headers), Some("sec-fetch-mode"));

        let mut headers = HeaderMap::new();
        headers.insert("origin", HeaderValue::from_static("https://app.example.com"));
        assert_eq!(browser_marker(&headers), Some("origin"));
    }
}
