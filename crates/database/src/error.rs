//! Database error types.

use thiserror::Error;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// SQLx error (connection, query, etc.)
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Record not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A write would violate a schema or domain invariant.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Malformed input from a caller (bad step name, empty party, etc.)
    #[error("validation error: {0}")]
    Validation(String),
}

impl DatabaseError {
    /// Map a unique-index violation to a domain-specific constraint error,
    /// passing everything else through as a plain sqlx error.
    pub(crate) fn from_unique(e: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DatabaseError::ConstraintViolation(what.to_string());
            }
        }
        DatabaseError::Sqlx(e)
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
