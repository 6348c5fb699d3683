//! Connection abstraction used by the migrator.
//!
//! A [`Querier`] wraps exactly one connection. It runs statements, tracks
//! whether it holds an open transaction and refuses to be released while
//! one is pending. Queriers are handed out by a [`QuerierPool`].

use async_trait::async_trait;
use indexmap::IndexMap;
use querykit_core::dialect::{DialectKind, SqlDialect};
use querykit_core::schema::DocumentCommand;
use querykit_core::Value;
use tracing::error;

use crate::error::{MigrateError, Result};

/// A result row, column names mapped to values.
pub type Row = IndexMap<String, Value>;

/// Outcome of a statement run for its side effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOutcome {
    /// Number of rows changed.
    pub rows_affected: u64,
    /// Identifier generated by an insert, when the backend reports one.
    pub last_insert_id: Option<i64>,
}

/// What kind of statements a querier understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerierKind {
    /// SQL text for the given backend.
    Sql(DialectKind),
    /// Structured document-store commands.
    Document,
}

/// A single connection.
#[async_trait]
pub trait Querier: Send {
    /// Statement language of this querier.
    fn kind(&self) -> QuerierKind;

    /// Whether a transaction is open on this connection.
    fn has_open_transaction(&self) -> bool;

    /// Runs a query and returns its rows.
    async fn all(&mut self, sql: &str) -> Result<Vec<Row>>;

    /// Runs a statement for its side effects.
    async fn run(&mut self, sql: &str) -> Result<QueryOutcome>;

    /// Opens a transaction.
    async fn begin_transaction(&mut self) -> Result<()>;

    /// Commits the open transaction.
    async fn commit_transaction(&mut self) -> Result<()>;

    /// Rolls back the open transaction.
    async fn rollback_transaction(&mut self) -> Result<()>;

    /// Returns the connection to its pool.
    ///
    /// # Errors
    ///
    /// Fails with [`MigrateError::PendingTransaction`] while a transaction
    /// is open.
    async fn release(&mut self) -> Result<()>;

    /// Closes the connection instead of returning it to its pool. Called
    /// when [`Querier::release`] refused, so that a connection with a
    /// pending transaction is never reused.
    async fn discard(&mut self) -> Result<()> {
        Ok(())
    }

    /// Executes a document-store schema command.
    async fn run_command(&mut self, command: &DocumentCommand) -> Result<()> {
        Err(MigrateError::UnsupportedCommand(command.action().to_string()))
    }

    /// The SQL compiler of this querier, `None` for document stores.
    fn dialect(&self) -> Option<&'static dyn SqlDialect> {
        match self.kind() {
            QuerierKind::Sql(kind) => Some(kind.dialect()),
            QuerierKind::Document => None,
        }
    }
}

/// Hands out queriers.
#[async_trait]
pub trait QuerierPool: Send + Sync {
    /// Acquires a querier; the caller must release it.
    async fn get_querier(&self) -> Result<Box<dyn Querier>>;

    /// Statement language of the queriers of this pool.
    fn kind(&self) -> QuerierKind;
}

/// Releases `querier` and returns `result`, preferring the first error.
/// A querier that cannot be released is discarded.
pub(crate) async fn release_with<T>(querier: &mut dyn Querier, result: Result<T>) -> Result<T> {
    match querier.release().await {
        Ok(()) => result,
        Err(released) => {
            error!(error = %released, "Releasing querier failed, discarding its connection");
            if let Err(discarded) = querier.discard().await {
                error!(error = %discarded, "Discarding connection failed");
            }
            result.and(Err(released))
        }
    }
}
