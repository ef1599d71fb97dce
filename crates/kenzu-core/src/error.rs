//! Error types and result handling for core operations.
//!
//! Translates database failures into a small structured taxonomy so
//! callers can distinguish missing rows from constraint races without
//! inspecting driver error strings.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for storage and domain operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Entity not found within the caller's organization scope.
    #[error("not found: {0}")]
    NotFound(String),

    /// Constraint violation (unique, foreign key, or check).
    ///
    /// The ingestion path relies on this variant to detect the loser of
    /// a concurrent idempotency-key race.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid input rejected before touching the database.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// True when the error is a unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation(msg) if msg.starts_with("unique"))
    }

    /// True when the underlying failure is likely transient and a
    /// bounded retry is reasonable (connection loss, pool timeout).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::ConstraintViolation(format!("unique constraint violation: {db_err}"))
            },
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                Self::ConstraintViolation(format!("foreign key constraint violation: {db_err}"))
            },
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                Self::ConstraintViolation(format!("check constraint violation: {db_err}"))
            },
            _ => Self::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = CoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn unique_violation_is_detectable() {
        let err = CoreError::ConstraintViolation("unique constraint violation: dup".into());
        assert!(err.is_unique_violation());

        let err = CoreError::ConstraintViolation("foreign key constraint violation: x".into());
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn database_errors_are_transient() {
        assert!(CoreError::Database("connection reset".into()).is_transient());
        assert!(!CoreError::NotFound("gone".into()).is_transient());
    }
}
