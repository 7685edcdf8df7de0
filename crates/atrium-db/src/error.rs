//! Error types for the persistence layer.

use thiserror::Error;
use uuid::Uuid;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// A database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(#[from] sqlx::migrate::MigrateError),

    /// A stored row holds a value the domain types cannot represent.
    #[error("Corrupted row in {table}: {message}")]
    Corrupted {
        /// Table the row came from.
        table: &'static str,
        /// What failed to decode.
        message: String,
    },

    /// A document failed structural validation at the authoring surface.
    #[error("Invalid document: {0}")]
    Validation(String),

    /// A system record may not be modified or deleted.
    #[error("Record {0} is a system record and cannot be modified")]
    SystemRecordImmutable(Uuid),

    /// The record was not found.
    #[error("Record not found: {0}")]
    NotFound(Uuid),
}

/// Convenience Result type for the persistence layer.
pub type Result<T> = std::result::Result<T, DbError>;
