//! Rate limiting against the shared counter store.
//!
//! The decision math has unit coverage in `kenzu-ratelimit`; these tests
//! exercise the Postgres-backed counter increments and the HTTP 429
//! surface.

mod common;

use kenzu_core::SessionRole;
use kenzu_ratelimit::{Policy, RateLimiter};
use kenzu_testing::TestEnv;
use serde_json::json;
use uuid::Uuid;

use crate::common::{ingest_with_session, router, send};

#[tokio::test]
async fn limiter_denies_after_the_window_is_exhausted() {
    let env = TestEnv::new().await.expect("test env");
    let limiter = RateLimiter::new(env.pool().clone());
    let policy = Policy::strict();
    let subject = format!("test-{}", Uuid::new_v4().simple());

    for i in 1..=policy.limit {
        let decision = limiter.check(&policy, &subject).await;
        assert!(decision.allowed, "request {i} within the limit should pass");
    }

    let denied = limiter.check(&policy, &subject).await;
    assert!(!denied.allowed);
    assert!(denied.retry_after_seconds >= 1);
    assert!(denied.retry_after_seconds <= policy.window.as_secs());
    assert_eq!(denied.remaining, 0);
}

#[tokio::test]
async fn limits_are_tracked_per_subject() {
    let env = TestEnv::new().await.expect("test env");
    let limiter = RateLimiter::new(env.pool().clone());
    let policy = Policy::strict();

    let exhausted = format!("subj-{}", Uuid::new_v4().simple());
    for _ in 0..=policy.limit {
        limiter.check(&policy, &exhausted).await;
    }
    assert!(!limiter.check(&policy, &exhausted).await.allowed);

    // A different subject is unaffected.
    let fresh = format!("subj-{}", Uuid::new_v4().simple());
    assert!(limiter.check(&policy, &fresh).await.allowed);
}

#[tokio::test]
async fn admin_session_gets_429_with_retry_headers_past_its_limit() {
    let env = TestEnv::new().await.expect("test env");
    let org = env.create_organization("org").await.expect("org");
    let (_, token) =
        env.create_admin_session(org.id, SessionRole::Admin).await.expect("session");

    let app = router(&env);
    let body = json!({"eventType": "demo.event", "payload": {}});
    let limit = Policy::admin().limit;

    let mut last_status = 0;
    for _ in 0..limit {
        last_status = send(&app, ingest_with_session(&token, &body)).await.status().as_u16();
    }
    assert_eq!(last_status, 200, "requests within the limit should pass");

    let denied = send(&app, ingest_with_session(&token, &body)).await;
    assert_eq!(denied.status(), 429);
    assert!(denied.headers().contains_key("retry-after"));
    assert!(denied.headers().contains_key("x-ratelimit-limit"));
    assert_eq!(
        denied.headers().get("x-ratelimit-remaining").and_then(|v| v.to_str().ok()),
        Some("0")
    );
}
