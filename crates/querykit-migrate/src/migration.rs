//! Migration definitions and their outcomes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::querier::Querier;

/// An async migration action running on the migrator's querier.
pub type MigrationFn = Arc<dyn for<'q> Fn(&'q mut dyn Querier) -> BoxFuture<'q, Result<()>> + Send + Sync>;

/// A named pair of up/down actions.
///
/// Migrations are applied in ascending name order, so names usually
/// start with a sortable prefix such as `0001_` or a timestamp.
#[derive(Clone)]
pub struct Migration {
    name: String,
    up: MigrationFn,
    down: MigrationFn,
}

impl Migration {
    /// Creates a migration from two actions.
    ///
    /// ```rust,ignore
    /// Migration::new(
    ///     "0002_seed_tags",
    ///     |q| Box::pin(async move { q.run("INSERT INTO tag (name) VALUES ('new')").await.map(|_| ()) }),
    ///     |q| Box::pin(async move { q.run("DELETE FROM tag").await.map(|_| ()) }),
    /// )
    /// ```
    pub fn new<U, D>(name: impl Into<String>, up: U, down: D) -> Self
    where
        U: for<'q> Fn(&'q mut dyn Querier) -> BoxFuture<'q, Result<()>> + Send + Sync + 'static,
        D: for<'q> Fn(&'q mut dyn Querier) -> BoxFuture<'q, Result<()>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            up: Arc::new(up),
            down: Arc::new(down),
        }
    }

    /// A migration running fixed SQL statements in order.
    pub fn sql<U, D, S, T>(name: impl Into<String>, up: U, down: D) -> Self
    where
        U: IntoIterator<Item = S>,
        S: Into<String>,
        D: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let up: Arc<[String]> = up.into_iter().map(Into::into).collect();
        let down: Arc<[String]> = down.into_iter().map(Into::into).collect();
        Self::new(
            name,
            move |q| run_statements(q, Arc::clone(&up)),
            move |q| run_statements(q, Arc::clone(&down)),
        )
    }

    /// Migration name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the up action.
    pub async fn up(&self, querier: &mut dyn Querier) -> Result<()> {
        (self.up)(querier).await
    }

    /// Runs the down action.
    pub async fn down(&self, querier: &mut dyn Querier) -> Result<()> {
        (self.down)(querier).await
    }

    pub(crate) async fn run(&self, direction: Direction, querier: &mut dyn Querier) -> Result<()> {
        match direction {
            Direction::Up => self.up(querier).await,
            Direction::Down => self.down(querier).await,
        }
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration").field("name", &self.name).finish_non_exhaustive()
    }
}

fn run_statements(querier: &mut dyn Querier, statements: Arc<[String]>) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        for sql in statements.iter() {
            querier.run(sql).await?;
        }
        Ok(())
    })
}

/// Which action of a migration ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Applied.
    Up,
    /// Reverted.
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Up => "up",
            Self::Down => "down",
        })
    }
}

/// Outcome of one migration step.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    /// Migration name.
    pub name: String,
    /// Action that ran.
    pub direction: Direction,
    /// Wall time of the step, transaction included.
    pub duration: Duration,
    /// Whether the step committed.
    pub success: bool,
    /// Error message of a failed step.
    pub error: Option<String>,
}
