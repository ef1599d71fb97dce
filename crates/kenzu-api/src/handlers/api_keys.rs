//! API key management handlers.
//!
//! All three routes require an admin-role session within the owning
//! organization; API-key auth cannot manage keys. The stored hash never
//! leaves this module in any response, and the plaintext appears exactly
//! once in the creation response.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use kenzu_automation::FieldError;
use kenzu_core::{ApiKey, ApiKeyId};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use crate::{error::ApiError, state::{AppState, AuthContext, SessionContext}};

/// Request body for key creation.
#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    /// Human-readable name for the new key.
    pub name: String,
}

/// Requires an admin-role session, rejecting everything else.
///
/// API-key callers get 403 rather than 401: they are authenticated, just
/// not allowed here.
fn require_admin(auth: &AuthContext) -> Result<&SessionContext, ApiError> {
    match auth.session() {
        Some(session) if auth.is_admin_session() => Ok(session),
        _ => Err(ApiError::Forbidden),
    }
}

/// Serializes a key record for API responses. The hash stays out.
fn key_json(key: &ApiKey) -> Value {
    json!({
        "id": key.id,
        "name": key.name,
        "keyPrefix": key.key_prefix,
        "lastUsedAt": key.last_used_at,
        "createdAt": key.created_at,
    })
}

/// `POST /admin/api-keys`: issues a new key, returning the plaintext once.
#[instrument(skip(state, auth, request))]
pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_admin(&auth)?;

    let name = request.name.trim();
    if name.is_empty() || name.len() > 255 {
        return Err(ApiError::Validation(vec![FieldError {
            field: "name",
            message: "must be between 1 and 255 characters".into(),
        }]));
    }

    let issued = state.keys.create(session.organization_id, session.user_id, name).await?;

    Ok(Json(json!({
        "success": true,
        "apiKey": key_json(&issued.record),
        "plaintextKey": issued.plaintext,
    })))
}

/// `GET /admin/api-keys`: lists the organization's active keys.
#[instrument(skip(state, auth))]
pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_admin(&auth)?;

    let keys = state.keys.list(session.organization_id).await?;
    let keys: Vec<Value> = keys.iter().map(key_json).collect();

    Ok(Json(json!({"success": true, "apiKeys": keys})))
}

/// `DELETE /admin/api-keys/{id}`: revokes a key.
///
/// A key belonging to another organization answers 404, identical to a
/// key that never existed.
#[instrument(skip(state, auth))]
pub async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_admin(&auth)?;

    state
        .keys
        .revoke(ApiKeyId::from(key_id), session.organization_id, session.user_id)
        .await?;

    Ok(Json(json!({"success": true})))
}
