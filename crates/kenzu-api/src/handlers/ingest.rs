//! Webhook ingestion handler.
//!
//! The body is read raw and size-checked before JSON parsing so the
//! caller gets a proper 413 instead of a parse error on oversized input.

use axum::{extract::State, response::IntoResponse, Extension, Json};
use bytes::Bytes;
use kenzu_automation::{FieldError, IngestRequest};
use serde_json::json;
use tracing::instrument;

use crate::{config::MAX_BODY_BYTES, error::ApiError, state::{AppState, AuthContext}};

/// Ingests one webhook event for the authenticated organization.
///
/// # Errors
///
/// 400 on validation failure, 413 when the body exceeds 1 MiB, 429 from
/// the rate limiter upstream, 500 on storage failure.
#[instrument(skip(state, body), fields(body_bytes = body.len()))]
pub async fn ingest_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if body.len() > MAX_BODY_BYTES {
        return Err(ApiError::PayloadTooLarge);
    }

    let request: IngestRequest = serde_json::from_slice(&body).map_err(|e| {
        ApiError::Validation(vec![FieldError {
            field: "body",
            message: format!("invalid JSON: {e}"),
        }])
    })?;

    let outcome = state.ingest.ingest(auth.organization_id(), auth.actor(), request).await?;

    Ok(Json(json!({
        "success": true,
        "eventId": outcome.event_id,
        "eventType": outcome.event_type,
        "triggered": outcome.triggered,
        "runIds": outcome.run_ids,
        "jobIds": outcome.job_ids,
    })))
}
