//! Error types for migrations and schema synchronization.

use querykit_core::{QueryError, SchemaError};

/// Errors that can occur while migrating or synchronizing a schema.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Database error reported by the driver.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A statement could not be compiled.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// DDL could not be generated.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (reading configuration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A migration named by `to` does not exist.
    #[error("Migration '{0}' not found")]
    NotFound(String),

    /// A SQL operation was requested on a document-store querier.
    #[error("This operation requires a SQL-based querier")]
    RequiresSqlQuerier,

    /// The querier was released while its transaction was still open.
    #[error("Cannot release a querier with a pending transaction")]
    PendingTransaction,

    /// Commit or rollback without an open transaction.
    #[error("There is no active transaction")]
    NoActiveTransaction,

    /// The querier was used after being released.
    #[error("Querier has already been released")]
    ReleasedQuerier,

    /// A document-store command did not name its collection.
    #[error("Command '{0}' has no target collection")]
    MissingCollection(String),

    /// The querier cannot interpret the command.
    #[error("Unsupported command '{0}'")]
    UnsupportedCommand(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
