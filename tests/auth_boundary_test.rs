//! Authentication and authorization tests at the HTTP boundary.
//!
//! Exercises the API-key path, the admin-session cookie path, their
//! mutual exclusion, the browser heuristic, and role enforcement on the
//! key management routes.

mod common;

use axum::{body::Body, http::Request};
use kenzu_core::SessionRole;
use kenzu_testing::TestEnv;
use serde_json::json;
use uuid::Uuid;

use crate::common::{body_json, ingest_with_key, ingest_with_session, router, send};

fn ingest_body() -> serde_json::Value {
    json!({"eventType": "demo.event", "payload": {}})
}

#[tokio::test]
async fn missing_credentials_are_rejected_with_401() {
    let env = TestEnv::new().await.expect("test env");
    let app = router(&env);

    let request = Request::builder()
        .method("POST")
        .uri("/hooks/ingest")
        .header("content-type", "application/json")
        .body(Body::from(ingest_body().to_string()))
        .expect("request builds");

    let response = send(&app, request).await;
    assert_eq!(response.status(), 401);
    assert_eq!(body_json(response).await["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn unknown_api_key_is_rejected_with_401() {
    let env = TestEnv::new().await.expect("test env");
    let app = router(&env);

    let response = send(
        &app,
        ingest_with_key("kz_test_aaaaaaaabbbbbbbbccccccccdddddddd", &ingest_body()),
    )
    .await;
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn revoked_api_key_is_rejected_with_401() {
    let env = TestEnv::new().await.expect("test env");
    let org = env.create_organization("org").await.expect("org");
    let key = env.create_api_key(org.id, "ingest").await.expect("api key");

    let app = router(&env);

    // The key works before revocation.
    let before = send(&app, ingest_with_key(&key.plaintext, &ingest_body())).await;
    assert_eq!(before.status(), 200);

    env.storage().api_keys.revoke(key.record.id, org.id).await.expect("revoke");

    let after = send(&app, ingest_with_key(&key.plaintext, &ingest_body())).await;
    assert_eq!(after.status(), 401);
}

#[tokio::test]
async fn presenting_both_credentials_is_forbidden() {
    let env = TestEnv::new().await.expect("test env");
    let org = env.create_organization("org").await.expect("org");
    let key = env.create_api_key(org.id, "ingest").await.expect("api key");
    let (_, token) =
        env.create_admin_session(org.id, SessionRole::Admin).await.expect("session");

    let app = router(&env);
    let request = Request::builder()
        .method("POST")
        .uri("/hooks/ingest")
        .header("content-type", "application/json")
        .header("x-api-key", &key.plaintext)
        .header("cookie", format!("kz_session={token}"))
        .body(Body::from(ingest_body().to_string()))
        .expect("request builds");

    let response = send(&app, request).await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn api_key_with_browser_headers_is_rejected_as_suspicious() {
    let env = TestEnv::new().await.expect("test env");
    let org = env.create_organization("org").await.expect("org");
    let key = env.create_api_key(org.id, "ingest").await.expect("api key");

    let app = router(&env);
    let request = Request::builder()
        .method("POST")
        .uri("/hooks/ingest")
        .header("content-type", "application/json")
        .header("x-api-key", &key.plaintext)
        .header("origin", "https://app.example.com")
        .header("sec-fetch-mode", "cors")
        .body(Body::from(ingest_body().to_string()))
        .expect("request builds");

    let response = send(&app, request).await;
    assert_eq!(response.status(), 403);

    // A valid key was rejected on the heuristic, not the credential.
    let clean = send(&app, ingest_with_key(&key.plaintext, &ingest_body())).await;
    assert_eq!(clean.status(), 200);
}

#[tokio::test]
async fn admin_session_can_ingest_events() {
    let env = TestEnv::new().await.expect("test env");
    let org = env.create_organization("org").await.expect("org");
    let (_, token) =
        env.create_admin_session(org.id, SessionRole::Admin).await.expect("session");

    let app = router(&env);
    let response = send(&app, ingest_with_session(&token, &ingest_body())).await;

    assert_eq!(response.status(), 200);
    assert_eq!(body_json(response).await["success"], true);

    // Session-ingested events carry no API key id.
    let count = env.storage().event_logs.count(org.id).await.expect("count");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn expired_session_cookie_is_rejected() {
    let env = TestEnv::new().await.expect("test env");
    let app = router(&env);

    let response =
        send(&app, ingest_with_session("sess-never-issued", &ingest_body())).await;
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn key_management_requires_an_admin_session() {
    let env = TestEnv::new().await.expect("test env");
    let org = env.create_organization("org").await.expect("org");
    let key = env.create_api_key(org.id, "ingest").await.expect("api key");
    let (_, viewer_token) =
        env.create_admin_session(org.id, SessionRole::Viewer).await.expect("viewer");
    let (_, admin_token) =
        env.create_admin_session(org.id, SessionRole::Admin).await.expect("admin");

    let app = router(&env);

    // API keys cannot mint more API keys.
    let request = Request::builder()
        .method("POST")
        .uri("/admin/api-keys")
        .header("content-type", "application/json")
        .header("x-api-key", &key.plaintext)
        .body(Body::from(json!({"name": "sneaky"}).to_string()))
        .expect("request builds");
    assert_eq!(send(&app, request).await.status(), 403);

    // Viewer sessions cannot either.
    let request = Request::builder()
        .method("POST")
        .uri("/admin/api-keys")
        .header("content-type", "application/json")
        .header("cookie", format!("kz_session={viewer_token}"))
        .body(Body::from(json!({"name": "viewer-key"}).to_string()))
        .expect("request builds");
    assert_eq!(send(&app, request).await.status(), 403);

    // Admin sessions can; the plaintext appears once and the hash never.
    let request = Request::builder()
        .method("POST")
        .uri("/admin/api-keys")
        .header("content-type", "application/json")
        .header("cookie", format!("kz_session={admin_token}"))
        .body(Body::from(json!({"name": "integration"}).to_string()))
        .expect("request builds");
    let response = send(&app, request).await;
    assert_eq!(response.status(), 200);

    let body = body_json(response).await;
    assert!(body["plaintextKey"].as_str().unwrap().starts_with("kz_test_"));
    assert!(body["apiKey"]["keyPrefix"].as_str().unwrap().starts_with("kz_test_"));
    assert!(body["apiKey"].get("keyHash").is_none());
}

#[tokio::test]
async fn cross_organization_key_revocation_answers_404() {
    let env = TestEnv::new().await.expect("test env");
    let org_a = env.create_organization("org-a").await.expect("org a");
    let org_b = env.create_organization("org-b").await.expect("org b");
    let foreign_key = env.create_api_key(org_b.id, "foreign").await.expect("key b");
    let (_, admin_token) =
        env.create_admin_session(org_a.id, SessionRole::Admin).await.expect("admin a");

    let app = router(&env);
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/admin/api-keys/{}", foreign_key.record.id))
        .header("cookie", format!("kz_session={admin_token}"))
        .body(Body::empty())
        .expect("request builds");

    let response = send(&app, request).await;
    assert_eq!(response.status(), 404);

    // The foreign key still works.
    let retry = send(&app, ingest_with_key(&foreign_key.plaintext, &ingest_body())).await;
    assert_eq!(retry.status(), 200);
}

#[tokio::test]
async fn deactivated_organization_is_cut_off_entirely() {
    let env = TestEnv::new().await.expect("test env");
    let org = env.create_organization("org").await.expect("org");
    let key = env.create_api_key(org.id, "ingest").await.expect("api key");
    let (_, token) =
        env.create_admin_session(org.id, SessionRole::Admin).await.expect("session");

    let app = router(&env);

    // Both credential classes work while the organization is active.
    let before = send(&app, ingest_with_key(&key.plaintext, &ingest_body())).await;
    assert_eq!(before.status(), 200);

    env.storage().organizations.set_active(org.id, false).await.expect("deactivate");

    // Neither revocation nor logout happened, yet everything is refused.
    let via_key = send(&app, ingest_with_key(&key.plaintext, &ingest_body())).await;
    assert_eq!(via_key.status(), 403);

    let via_session = send(&app, ingest_with_session(&token, &ingest_body())).await;
    assert_eq!(via_session.status(), 403);

    // No new events or workflow activity for the dead tenant.
    let count = env.storage().event_logs.count(org.id).await.expect("count");
    assert_eq!(count, 1);

    // The denial lands in the org's audit trail.
    let entries = env.storage().audit_logs.recent(org.id, 10).await.expect("audit");
    let denial = entries
        .iter()
        .find(|e| e.action == "AUTH_FAILED")
        .expect("denial should be audited");
    assert_eq!(denial.details.0["reason"], "organization_inactive");

    // Reactivation restores access without reissuing anything.
    env.storage().organizations.set_active(org.id, true).await.expect("reactivate");
    let restored = send(&app, ingest_with_key(&key.plaintext, &ingest_body())).await;
    assert_eq!(restored.status(), 200);
}

#[tokio::test]
async fn revoking_a_nonexistent_key_answers_404() {
    let env = TestEnv::new().await.expect("test env");
    let org = env.create_organization("org").await.expect("org");
    let (_, admin_token) =
        env.create_admin_session(org.id, SessionRole::Admin).await.expect("admin");

    let app = router(&env);
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/admin/api-keys/{}", Uuid::new_v4()))
        .header("cookie", format!("kz_session={admin_token}"))
        .body(Body::empty())
        .expect("request builds");

    assert_eq!(send(&app, request).await.status(), 404);
}
