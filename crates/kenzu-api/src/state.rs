//! Shared application state and the authenticated request context.

use kenzu_auth::{ApiKeyManager, VerifiedKey};
use kenzu_automation::{Actor, IngestService};
use kenzu_core::{
    storage::Storage, AuditLogger, OrganizationId, SessionRole, UserId,
};
use kenzu_ratelimit::RateLimiter;
use uuid::Uuid;

/// State shared by every handler and middleware layer.
#[derive(Clone)]
pub struct AppState {
    /// Repository container.
    pub storage: Storage,
    /// API key issuance and verification.
    pub keys: ApiKeyManager,
    /// Webhook ingestion pipeline.
    pub ingest: IngestService,
    /// Shared-store rate limiter.
    pub limiter: RateLimiter,
    /// Append-only audit logger.
    pub audit: AuditLogger,
}

impl AppState {
    /// Wires the full service graph over one connection pool.
    pub fn new(pool: sqlx::PgPool, environment: kenzu_auth::KeyEnvironment) -> Self {
        let storage = Storage::new(pool.clone());
        let audit = AuditLogger::new(storage.audit_logs.clone());
        let keys = ApiKeyManager::new(storage.api_keys.clone(), audit.clone(), environment);
        let ingest = IngestService::new(storage.clone(), audit.clone());
        let limiter = RateLimiter::new(pool);

        Self { storage, keys, ingest, limiter, audit }
    }
}

/// Context of an authenticated admin session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Session row id; doubles as the rate-limit subject.
    pub session_id: Uuid,
    /// Authenticated dashboard user.
    pub user_id: UserId,
    /// Organization the session is bound to.
    pub organization_id: OrganizationId,
    /// Role granted to this session.
    pub role: SessionRole,
}

/// The credential that authenticated the current request.
///
/// Inserted into request extensions by the auth middleware; handlers read
/// it back to scope every query to the caller's organization.
#[derive(Debug, Clone)]
pub enum AuthContext {
    /// Server-to-server request with a verified API key.
    ApiKey(VerifiedKey),
    /// Browser request with a valid admin session cookie.
    Session(SessionContext),
}

impl AuthContext {
    /// Organization every query of this request must be scoped to.
    pub fn organization_id(&self) -> OrganizationId {
        match self {
            Self::ApiKey(key) => key.organization_id,
            Self::Session(session) => session.organization_id,
        }
    }

    /// The ingestion actor used to tag persisted events.
    pub fn actor(&self) -> Actor {
        match self {
            Self::ApiKey(key) => Actor::ApiKey(key.api_key_id),
            Self::Session(session) => Actor::AdminUser(session.user_id),
        }
    }

    /// True when this request carries an `admin` role session.
    pub fn is_admin_session(&self) -> bool {
        matches!(self, Self::Session(s) if s.role == SessionRole::Admin)
    }

    /// The session context, when cookie-authenticated.
    pub fn session(&self) -> Option<&SessionContext> {
        match self {
            Self::ApiKey(_) => None,
            Self::Session(session) => Some(session),
        }
    }
}
