//! Error types for query compilation and schema handling.

/// Errors raised while compiling a query into SQL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// A `$`-prefixed key that is not a known operator.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// An operator received a value of the wrong shape.
    #[error("invalid filter for '{key}': {message}")]
    InvalidFilter {
        /// The filter key (field or operator).
        key: String,
        /// What was wrong with it.
        message: String,
    },

    /// Soft delete was requested on an entity without a soft-delete field.
    #[error("'{0}' has not enabled 'softDelete'")]
    SoftDeleteNotEnabled(String),

    /// An entity name that is not registered.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// A relation key that the entity does not declare.
    #[error("unknown relation '{relation}' on entity '{entity}'")]
    UnknownRelation {
        /// The entity that was inspected.
        entity: String,
        /// The missing relation key.
        relation: String,
    },

    /// Insert/update called without anything to persist.
    #[error("nothing to persist for '{0}'")]
    EmptyPayload(String),
}

/// Errors raised while building, diffing or rendering schemas.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The dialect cannot express the requested change.
    #[error("{dialect} does not support {operation} on column '{column}' of table '{table}'; recreate the table instead")]
    Unsupported {
        /// Dialect name.
        dialect: String,
        /// The unsupported operation.
        operation: String,
        /// Affected table.
        table: String,
        /// Affected column.
        column: String,
    },

    /// A table referenced by name does not exist in the schema.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// A type or action name that cannot be parsed.
    #[error("invalid schema value: {0}")]
    InvalidType(String),

    /// A relationship points at an entity the registry does not know.
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Result alias for query compilation.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Result alias for schema operations.
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;
