//! Transaction propagation.
//!
//! Operations that may be nested take the caller's querier instead of
//! opening their own connection. [`Propagation::Required`] opens a
//! transaction when none is active, [`Propagation::Supported`] never does.
//! Only the scope that opened a transaction commits or rolls it back.

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::error::Result;
use crate::querier::Querier;

/// How a unit of work joins the caller's transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Propagation {
    /// Reuse the open transaction, or open one.
    #[default]
    Required,
    /// Reuse the open transaction, never open one.
    Supported,
}

/// Records whether this scope owns the transaction it runs in.
#[derive(Debug)]
#[must_use = "a scope must be committed or rolled back"]
pub struct TransactionScope {
    owned: bool,
}

impl TransactionScope {
    /// Joins or opens a transaction on `querier` according to `propagation`.
    pub async fn begin<Q>(querier: &mut Q, propagation: Propagation) -> Result<Self>
    where
        Q: Querier + ?Sized,
    {
        let owned = propagation == Propagation::Required && !querier.has_open_transaction();
        if owned {
            debug!("Opening transaction");
            querier.begin_transaction().await?;
        }
        Ok(Self { owned })
    }

    /// Whether this scope opened the transaction.
    #[must_use]
    pub const fn is_owned(&self) -> bool {
        self.owned
    }

    /// Commits if this scope owns the transaction.
    pub async fn commit<Q>(self, querier: &mut Q) -> Result<()>
    where
        Q: Querier + ?Sized,
    {
        if self.owned {
            querier.commit_transaction().await?;
        }
        Ok(())
    }

    /// Rolls back if this scope owns the transaction.
    pub async fn rollback<Q>(self, querier: &mut Q) -> Result<()>
    where
        Q: Querier + ?Sized,
    {
        if self.owned && querier.has_open_transaction() {
            debug!("Rolling back transaction");
            querier.rollback_transaction().await?;
        }
        Ok(())
    }

    /// Commits on `Ok`, rolls back on `Err` and hands `result` back.
    ///
    /// A failed rollback is logged; the error of `result` wins.
    pub async fn finish<Q, T>(self, querier: &mut Q, result: Result<T>) -> Result<T>
    where
        Q: Querier + ?Sized,
        T: Send,
    {
        match result {
            Ok(value) => {
                self.commit(querier).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback(querier).await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

/// Runs `work` inside a transaction scope on `querier`.
///
/// An owned transaction is committed when `work` succeeds and rolled back
/// when it fails. The closure's future may only borrow the querier, so
/// anything else it needs must be moved in.
///
/// ```rust,ignore
/// transactional(querier, Propagation::Required, |q| {
///     Box::pin(async move {
///         q.run("DELETE FROM tag").await?;
///         Ok(())
///     })
/// })
/// .await?;
/// ```
pub async fn transactional<Q, T, F>(querier: &mut Q, propagation: Propagation, work: F) -> Result<T>
where
    Q: Querier + ?Sized,
    F: for<'q> FnOnce(&'q mut Q) -> BoxFuture<'q, Result<T>> + Send,
    T: Send,
{
    let scope = TransactionScope::begin(querier, propagation).await?;
    let result = work(querier).await;
    scope.finish(querier, result).await
}
