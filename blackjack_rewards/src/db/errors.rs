//! Storage error types.

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A unique value (user e-mail, code string) already exists
    #[error("Duplicate value: {0}")]
    Conflict(String),

    /// Crediting would push a balance past the column range
    #[error("Balance overflow for {0}")]
    BalanceOverflow(String),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
