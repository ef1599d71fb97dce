//! Sliding-window rate limiting backed by a shared counter store.
//!
//! Counters live in the `rate_limit_counters` Postgres table rather than
//! process memory, so limits hold across horizontally scaled service
//! instances. Each check performs one atomic upsert increment on the
//! current fixed window and reads the previous window; the sliding count
//! is the current window plus the previous window weighted by overlap.
//!
//! If the counter store is unreachable the limiter fails OPEN: the
//! request is allowed and the failure is logged. Availability is
//! preferred over strict enforcement at this boundary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::PgPool;
use tracing::warn;

/// A named rate-limit policy: at most `limit` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Policy name, part of the counter bucket key.
    pub name: &'static str,
    /// Maximum requests per window.
    pub limit: u64,
    /// Window length.
    pub window: Duration,
}

impl Policy {
    /// Strict credential class: 10 requests per minute.
    pub const fn strict() -> Self {
        Self { name: "strict", limit: 10, window: Duration::from_secs(60) }
    }

    /// Moderate credential class: 100 requests per minute.
    pub const fn moderate() -> Self {
        Self { name: "moderate", limit: 100, window: Duration::from_secs(60) }
    }

    /// Lenient credential class: 1000 requests per minute.
    pub const fn lenient() -> Self {
        Self { name: "lenient", limit: 1000, window: Duration::from_secs(60) }
    }

    /// Boundary policy for API keys: 60 requests per minute, keyed by
    /// API key id.
    pub const fn api_key() -> Self {
        Self { name: "api_key", limit: 60, window: Duration::from_secs(60) }
    }

    /// Boundary policy for admin sessions: 50 requests per 5 minutes,
    /// keyed by session id.
    pub const fn admin() -> Self {
        Self { name: "admin", limit: 50, window: Duration::from_secs(300) }
    }

    /// Every named policy. New policies must be added here so that
    /// counter purging keeps covering their windows.
    pub const ALL: [Policy; 5] =
        [Self::strict(), Self::moderate(), Self::lenient(), Self::api_key(), Self::admin()];

    /// The longest window among the named policies.
    pub fn longest_window() -> Duration {
        Self::ALL.iter().map(|p| p.window).max().unwrap_or(Duration::from_secs(60))
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Seconds the caller should wait before retrying. Zero when
    /// allowed.
    pub retry_after_seconds: u64,
    /// The policy limit.
    pub limit: u64,
    /// Requests remaining in the window after this one.
    pub remaining: u64,
    /// When the current window resets.
    pub reset_at: DateTime<Utc>,
}

impl Decision {
    /// An unconditional allow, used on counter-store failure (fail-open)
    /// and for unauthenticated probes that are limited elsewhere.
    pub fn fail_open(policy: &Policy) -> Self {
        Self {
            allowed: true,
            retry_after_seconds: 0,
            limit: policy.limit,
            remaining: policy.limit,
            reset_at: Utc::now(),
        }
    }
}

/// Computes the sliding-window decision from raw counts.
///
/// `current` includes the request being decided. The previous window
/// contributes proportionally to how much of it still overlaps the
/// sliding window ending now.
fn decide(
    policy: &Policy,
    current: u64,
    previous: u64,
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Decision {
    let window_secs = policy.window.as_secs_f64();
    let elapsed = (now - window_start).num_milliseconds().max(0) as f64 / 1000.0;
    let overlap = (1.0 - elapsed / window_secs).clamp(0.0, 1.0);

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let effective = (previous as f64 * overlap).floor() as u64 + current;

    let reset_at = window_start
        + chrono::Duration::from_std(policy.window).unwrap_or_else(|_| chrono::Duration::zero());

    if effective > policy.limit {
        let retry_after = (reset_at - now).num_seconds().max(1) as u64;
        Decision {
            allowed: false,
            retry_after_seconds: retry_after,
            limit: policy.limit,
            remaining: 0,
            reset_at,
        }
    } else {
        Decision {
            allowed: true,
            retry_after_seconds: 0,
            limit: policy.limit,
            remaining: policy.limit.saturating_sub(effective),
            reset_at,
        }
    }
}

/// Rate limiter over the shared Postgres counter store.
#[derive(Clone)]
pub struct RateLimiter {
    pool: PgPool,
}

impl RateLimiter {
    /// Creates a limiter over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Checks (and counts) one request for `subject` under `policy`.
    ///
    /// The increment happens before the decision, so rejected requests
    /// are counted too; a client hammering past its limit does not get
    /// fresh quota by being rejected.
    ///
    /// Never returns an error: counter-store failures degrade to a
    /// logged fail-open allow.
    pub async fn check(&self, policy: &Policy, subject: &str) -> Decision {
        let now = Utc::now();
        let bucket = format!("{}:{}", policy.name, subject);

        match self.increment_and_fetch(&bucket, policy, now).await {
            Ok((current, previous, window_start)) => {
                decide(policy, current, previous, window_start, now)
            },
            Err(e) => {
                warn!(
                    bucket = %bucket,
                    error = %e,
                    "rate limit store unavailable, failing open"
                );
                Decision::fail_open(policy)
            },
        }
    }

    /// Atomically increments the current window counter and reads the
    /// previous window's count.
    async fn increment_and_fetch(
        &self,
        bucket: &str,
        policy: &Policy,
        now: DateTime<Utc>,
    ) -> Result<(u64, u64, DateTime<Utc>), sqlx::Error> {
        let window_secs = policy.window.as_secs() as i64;
        let epoch_secs = now.timestamp();
        let window_start_secs = epoch_secs - epoch_secs.rem_euclid(window_secs);
        let window_start = Utc
            .timestamp_opt(window_start_secs, 0)
            .single()
            .unwrap_or(now);
        let previous_start = Utc
            .timestamp_opt(window_start_secs - window_secs, 0)
            .single()
            .unwrap_or(window_start);

        let current: i64 = sqlx::query_scalar(
            r"
            INSERT INTO rate_limit_counters (bucket, window_start, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (bucket, window_start)
            DO UPDATE SET count = rate_limit_counters.count + 1
            RETURNING count
            ",
        )
        .bind(bucket)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await?;

        let previous: Option<i64> = sqlx::query_scalar(
            r"
            SELECT count FROM rate_limit_counters
            WHERE bucket = $1 AND window_start = $2
            ",
        )
        .bind(bucket)
        .bind(previous_start)
        .fetch_optional(&self.pool)
        .await?;

        Ok((
            current.max(0) as u64,
            previous.unwrap_or(0).max(0) as u64,
            window_start,
        ))
    }

    /// Deletes counters older than two windows of the longest policy.
    ///
    /// Run periodically from the service main loop; counter rows are
    /// tiny but unbounded growth is still unbounded growth.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn purge_expired(&self) -> Result<u64, sqlx::Error> {
        let horizon = 2 * Policy::longest_window().as_secs() as i64;
        let cutoff = Utc::now() - chrono::Duration::seconds(horizon);
        let result = sqlx::query("DELETE FROM rate_limit_counters WHERE window_start < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> Policy {
        Policy { name: "test", limit: 10, window: Duration::from_secs(60) }
    }

    #[test]
    fn named_policies_match_configured_limits() {
        assert_eq!(Policy::strict().limit, 10);
        assert_eq!(Policy::moderate().limit, 100);
        assert_eq!(Policy::lenient().limit, 1000);
        assert_eq!(Policy::api_key().limit, 60);
        assert_eq!(Policy::admin().limit, 50);
        assert_eq!(Policy::admin().window, Duration::from_secs(300));
    }

    #[test]
    fn purge_horizon_covers_every_named_policy() {
        let longest = Policy::longest_window();
        for policy in Policy::ALL {
            assert!(
                policy.window <= longest,
                "policy {} has a window longer than the purge horizon",
                policy.name
            );
        }
        assert_eq!(longest, Duration::from_secs(300));
    }

    #[test]
    fn allows_up_to_limit_within_one_window() {
        let p = policy();
        let start = Utc::now();

        let d = decide(&p, 10, 0, start, start);
        assert!(d.allowed);
        assert_eq!(d.remaining, 0);

        let d = decide(&p, 11, 0, start, start);
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert!(d.retry_after_seconds >= 1);
    }

    #[test]
    fn previous_window_counts_decay_with_elapsed_time() {
        let p = policy();
        let start = Utc::now();

        // At the very start of the window the previous window counts in
        // full: 8 previous + 3 current exceeds 10.
        let d = decide(&p, 3, 8, start, start);
        assert!(!d.allowed);

        // 45s into a 60s window only a quarter of the previous window
        // overlaps: floor(8 * 0.25) = 2, plus 3 current = 5.
        let later = start + chrono::Duration::seconds(45);
        let d = decide(&p, 3, 8, start, later);
        assert!(d.allowed);
        assert_eq!(d.remaining, 5);
    }

    #[test]
    fn retry_after_is_bounded_by_window() {
        let p = policy();
        let start = Utc::now();
        let d = decide(&p, 99, 0, start, start);
        assert!(!d.allowed);
        assert!(d.retry_after_seconds <= p.window.as_secs());
        assert_eq!(d.reset_at, start + chrono::Duration::seconds(60));
    }

    #[test]
    fn fail_open_always_allows() {
        let p = policy();
        let d = Decision::fail_open(&p);
        assert!(d.allowed);
        assert_eq!(d.limit, p.limit);
        assert_eq!(d.retry_after_seconds, 0);
    }
}
