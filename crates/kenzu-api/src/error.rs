//! Error-to-HTTP mapping with stable machine-readable codes.
//!
//! Credential failures are deliberately generic: the caller can never
//! tell a missing key from a revoked one from a wrong secret. Internal
//! errors are logged with full detail and answered with a generic body.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use kenzu_automation::{FieldError, IngestError};
use kenzu_core::CoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors surfaced by the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body failed validation; field errors included.
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    /// Missing or invalid credentials. Always the same generic message.
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated but not allowed: wrong role, ambiguous credentials,
    /// or browser-heuristic rejection.
    #[error("forbidden")]
    Forbidden,

    /// Resource does not exist within the caller's organization.
    #[error("not found")]
    NotFound,

    /// Request body exceeded the size cap.
    #[error("payload too large")]
    PayloadTooLarge,

    /// Rejected by the rate limiter.
    #[error("rate limited")]
    RateLimited(kenzu_ratelimit::Decision),

    /// Anything unexpected. Detail is logged, not returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable code returned in the body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "request validation failed",
            Self::Unauthorized => "invalid or missing credentials",
            Self::Forbidden => "access denied",
            Self::NotFound => "resource not found",
            Self::PayloadTooLarge => "request body exceeds the 1 MiB limit",
            Self::RateLimited(_) => "rate limit exceeded",
            Self::Internal(_) => "internal server error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!(detail = %detail, "request failed with internal error");
        }

        let mut body = json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.message(),
            },
        });

        match &self {
            Self::Validation(fields) => {
                body["error"]["fields"] = json!(fields);
            },
            Self::RateLimited(decision) => {
                body["error"]["retryAfterSeconds"] = json!(decision.retry_after_seconds);
            },
            _ => {},
        }

        let mut response = (self.status(), Json(body)).into_response();

        if let Self::RateLimited(decision) = &self {
            let headers = response.headers_mut();
            if let Ok(v) = HeaderValue::from_str(&decision.retry_after_seconds.to_string()) {
                headers.insert(RETRY_AFTER, v);
            }
            if let Ok(v) = HeaderValue::from_str(&decision.limit.to_string()) {
                headers.insert("x-ratelimit-limit", v);
            }
            if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
                headers.insert("x-ratelimit-remaining", v);
            }
            if let Ok(v) = HeaderValue::from_str(&decision.reset_at.timestamp().to_string()) {
                headers.insert("x-ratelimit-reset", v);
            }
        }

        response
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(_) => Self::NotFound,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(fields) => Self::Validation(fields),
            IngestError::Storage(e) => e.into(),
        }
    }
}

impl From<kenzu_auth::AuthError> for ApiError {
    fn from(err: kenzu_auth::AuthError) -> Self {
        match err {
            kenzu_auth::AuthError::Storage(CoreError::NotFound(_)) => Self::NotFound,
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_classes() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::PayloadTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            ApiError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn core_not_found_maps_to_404() {
        let err: ApiError = CoreError::NotFound("api key not found".into()).into();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn storage_failure_maps_to_internal() {
        let err: ApiError = CoreError::Database("connection reset".into()).into();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn validation_keeps_field_detail() {
        let err: ApiError = IngestError::Validation(vec![FieldError {
            field: "eventType",
            message: "is required".into(),
        }])
        .into();

        match err {
            ApiError::Validation(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "eventType");
            },
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
