//! API key issuance, verification, and revocation.
//!
//! Keys look like `kz_live_<secret>` (or `kz_test_` outside production).
//! The first sixteen characters form the cleartext lookup prefix; the
//! secret portion is stored only as a salted Argon2id hash. Verification
//! takes the same code path for unknown, revoked, and wrong-hash keys so
//! none of the three is distinguishable by response or timing.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::{Arc, OnceLock};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use chrono::Utc;
use kenzu_core::{
    audit::AuditEntry,
    storage::api_keys,
    ApiKey, ApiKeyId, AuditAction, AuditLogger, CoreError, OrganizationId, UserId,
};
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

/// Length of the random secret portion of a key.
const SECRET_LEN: usize = 32;

/// Characters of the secret included in the stored cleartext prefix.
const PREFIX_SECRET_CHARS: usize = 8;

/// Result type for key operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors from key management operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Underlying storage failure.
    #[error(transparent)]
    Storage(#[from] CoreError),

    /// Password hashing or hash parsing failed.
    #[error("credential hashing failed: {0}")]
    Hashing(String),
}

/// Which key environment this deployment issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEnvironment {
    /// Production keys, prefixed `kz_live_`.
    Live,
    /// Test keys, prefixed `kz_test_`.
    Test,
}

impl KeyEnvironment {
    /// The cleartext environment prefix for this environment.
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Live => "kz_live_",
            Self::Test => "kz_test_",
        }
    }
}

/// Successful verification outcome.
///
/// Deliberately omits the hash and timestamps: this is what the
/// boundary needs to scope the request, nothing more.
#[derive(Debug, Clone)]
pub struct VerifiedKey {
    /// Organization the key belongs to.
    pub organization_id: OrganizationId,
    /// Identifier of the verified key.
    pub api_key_id: ApiKeyId,
    /// Human-readable key name.
    pub name: String,
}

/// A freshly issued key: the stored record plus the plaintext.
///
/// The plaintext exists only in this value and is never persisted;
/// callers must surface it to the user exactly once.
#[derive(Debug)]
pub struct IssuedKey {
    /// The persisted record (hash included, for internal use only).
    pub record: ApiKey,
    /// Full plaintext key, shown once.
    pub plaintext: String,
}

/// Splits a plaintext key into its lookup prefix and secret portion.
///
/// Returns `None` for strings that cannot be a Kenzu key, without
/// touching storage.
fn split_key(plaintext: &str) -> Option<(&str, &str)> {
    let env_prefix_len = KeyEnvironment::Live.prefix().len();
    let lookup_len = env_prefix_len + PREFIX_SECRET_CHARS;

    if !plaintext.starts_with(KeyEnvironment::Live.prefix())
        && !plaintext.starts_with(KeyEnvironment::Test.prefix())
    {
        return None;
    }
    if plaintext.len() < lookup_len + 1 || !plaintext.is_ascii() {
        return None;
    }

    let lookup_prefix = &plaintext[..lookup_len];
    let secret = &plaintext[env_prefix_len..];
    Some((lookup_prefix, secret))
}

/// Hashes a secret with Argon2id and a fresh random salt.
fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| AuthError::Hashing(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verifies a secret against a stored Argon2 hash. Constant-time by
/// construction of the Argon2 verifier.
fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default().verify_password(secret.as_bytes(), &parsed).is_ok()
}

/// A hash verified against when no candidate rows exist, so the
/// not-found path costs the same as a real verification.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| {
        hash_secret("kenzu-dummy-comparison-secret").unwrap_or_else(|_| String::new())
    })
}

/// Hex SHA-256 digest of an admin session token.
///
/// Session tokens are high-entropy random strings, so an unsalted
/// digest is sufficient and allows direct index lookup.
pub fn hash_session_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Issues, verifies, lists, and revokes API keys for organizations.
#[derive(Clone)]
pub struct ApiKeyManager {
    repo: Arc<api_keys::Repository>,
    audit: AuditLogger,
    environment: KeyEnvironment,
}

impl ApiKeyManager {
    /// Creates a manager issuing keys for the given environment.
    pub fn new(
        repo: Arc<api_keys::Repository>,
        audit: AuditLogger,
        environment: KeyEnvironment,
    ) -> Self {
        Self { repo, audit, environment }
    }

    /// Issues a new key for an organization.
    ///
    /// Generates a cryptographically random secret, persists only the
    /// prefix and Argon2id hash, writes an `API_KEY_CREATED` audit
    /// entry, and returns the plaintext exactly once.
    ///
    /// # Errors
    ///
    /// Returns error on storage or hashing failure.
    pub async fn create(
        &self,
        organization_id: OrganizationId,
        issuer: UserId,
        name: &str,
    ) -> Result<IssuedKey> {
        let secret: String =
            rand::thread_rng().sample_iter(&Alphanumeric).take(SECRET_LEN).map(char::from).collect();
        let plaintext = format!("{}{}", self.environment.prefix(), secret);
        let key_prefix =
            plaintext[..self.environment.prefix().len() + PREFIX_SECRET_CHARS].to_string();

        let record = ApiKey {
            id: ApiKeyId::new(),
            organization_id,
            name: name.to_string(),
            key_prefix,
            key_hash: hash_secret(&secret)?,
            created_by: issuer,
            last_used_at: None,
            revoked_at: None,
            created_at: Utc::now(),
        };

        self.repo.create(&record).await?;

        self.audit
            .record(AuditEntry {
                action: AuditAction::ApiKeyCreated,
                resource_type: "api_key",
                resource_id: Some(record.id.to_string()),
                organization_id: Some(organization_id),
                user_id: Some(issuer),
                details: serde_json::json!({
                    "name": record.name,
                    "key_prefix": record.key_prefix,
                }),
            })
            .await;

        debug!(api_key_id = %record.id, org = %organization_id, "api key issued");

        Ok(IssuedKey { record, plaintext })
    }

    /// Verifies a plaintext key.
    ///
    /// Returns `None` uniformly for malformed, unknown, revoked, and
    /// wrong-secret keys. On success, `last_used_at` is updated on a
    /// background task so verification latency stays flat.
    ///
    /// # Errors
    ///
    /// Returns error only on storage failure; a bad credential is `None`.
    pub async fn verify(&self, plaintext: &str) -> Result<Option<VerifiedKey>> {
        let Some((lookup_prefix, secret)) = split_key(plaintext) else {
            // Malformed input never reaches storage; burn the same
            // hashing cost anyway.
            let _ = verify_secret("malformed", dummy_hash());
            return Ok(None);
        };

        let candidates = self.repo.find_by_prefix(lookup_prefix).await?;

        if candidates.is_empty() {
            let _ = verify_secret(secret, dummy_hash());
            return Ok(None);
        }

        for key in candidates {
            if !verify_secret(secret, &key.key_hash) {
                continue;
            }
            // Revocation is checked after the hash work so revoked and
            // wrong-secret outcomes cost the same.
            if key.is_revoked() {
                return Ok(None);
            }

            let repo = self.repo.clone();
            let key_id = key.id;
            tokio::spawn(async move {
                if let Err(e) = repo.touch_last_used(key_id, Utc::now()).await {
                    warn!(api_key_id = %key_id, error = %e, "failed to update last_used_at");
                }
            });

            return Ok(Some(VerifiedKey {
                organization_id: key.organization_id,
                api_key_id: key.id,
                name: key.name,
            }));
        }

        Ok(None)
    }

    /// Lists active (non-revoked) keys for an organization.
    ///
    /// # Errors
    ///
    /// Returns error on storage failure.
    pub async fn list(&self, organization_id: OrganizationId) -> Result<Vec<ApiKey>> {
        Ok(self.repo.list(organization_id, false).await?)
    }

    /// Revokes a key within the caller's organization.
    ///
    /// Idempotent; revoking twice is not an error. A key in another
    /// organization surfaces as `NotFound`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` (wrapped) if the key does not exist
    /// in this organization.
    pub async fn revoke(
        &self,
        api_key_id: ApiKeyId,
        organization_id: OrganizationId,
        actor: UserId,
    ) -> Result<()> {
        self.repo.revoke(api_key_id, organization_id).await?;

        self.audit
            .record(AuditEntry {
                action: AuditAction::ApiKeyRevoked,
                resource_type: "api_key",
                resource_id: Some(api_key_id.to_string()),
                organization_id: Some(organization_id),
                user_id: Some(actor),
                details: serde_json::json!({}),
            })
            .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_keys_have_environment_prefix() {
        assert_eq!(KeyEnvironment::Live.prefix(), "kz_live_");
        assert_eq!(KeyEnvironment::Test.prefix(), "kz_test_");
    }

    #[test]
    fn split_key_extracts_lookup_prefix_and_secret() {
        let plaintext = "kz_live_abcdefgh0123456789abcdefgh012345";
        let (prefix, secret) = split_key(plaintext).unwrap();
        assert_eq!(prefix, "kz_live_abcdefgh");
        assert_eq!(secret, "abcdefgh0123456789abcdefgh012345");
    }

    #[test]
    fn split_key_rejects_foreign_formats() {
        assert!(split_key("sk_live_abcdefgh0123").is_none());
        assert!(split_key("kz_live_short").is_none());
        assert!(split_key("").is_none());
        assert!(split_key("kz_test_\u{1F512}aaaaaaaaaaaaaaaa").is_none());
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_secret("topsecret").unwrap();
        assert!(verify_secret("topsecret", &hash));
        assert!(!verify_secret("wrong", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_secret("same-input").unwrap();
        let b = hash_secret("same-input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn corrupt_stored_hash_fails_closed() {
        assert!(!verify_secret("anything", "not-a-phc-string"));
    }

    #[test]
    fn session_token_digest_is_stable_hex() {
        let digest = hash_session_token("session-token");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_session_token("session-token"));
        assert_ne!(digest, hash_session_token("other-token"));
    }
}
