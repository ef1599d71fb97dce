//! Shared helpers for the end-to-end suites.

#![allow(dead_code)]

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use kenzu_api::{create_router, AppState};
use kenzu_auth::KeyEnvironment;
use kenzu_testing::TestEnv;
use serde_json::Value;
use tower::util::ServiceExt;

/// Builds the production router over the test database.
pub fn router(env: &TestEnv) -> Router {
    let state = AppState::new(env.pool().clone(), KeyEnvironment::Test);
    create_router(state, Duration::from_secs(10))
}

/// Sends one request through the router.
pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.expect("request should complete")
}

/// Builds an ingestion request authenticated with an API key.
pub fn ingest_with_key(key: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/hooks/ingest")
        .header("content-type", "application/json")
        .header("x-api-key", key)
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

/// Builds an ingestion request authenticated with a session cookie.
pub fn ingest_with_session(token: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/hooks/ingest")
        .header("content-type", "application/json")
        .header("cookie", format!("kz_session={token}"))
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

/// Reads and parses a JSON response body.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}
