//! Raw SQL escape hatch.

use std::fmt;
use std::sync::Arc;

use crate::dialect::SqlDialect;
use crate::entity::EntityRegistry;
use crate::error::Result;

/// What a raw callback receives when it is rendered.
pub struct RawContext<'a> {
    /// The unescaped prefix (table name or relation alias), possibly empty.
    pub prefix: &'a str,
    /// The prefix escaped and followed by a dot, or empty.
    pub escaped_prefix: &'a str,
    /// The dialect compiling the surrounding statement.
    pub dialect: &'a dyn SqlDialect,
    /// Registry used to resolve other entities, e.g. for correlated sub-queries.
    pub registry: &'a EntityRegistry,
}

/// Callback producing a SQL fragment.
pub type RawCallback = Arc<dyn Fn(&RawContext<'_>) -> Result<String> + Send + Sync>;

/// The body of a raw expression.
#[derive(Clone)]
pub enum RawValue {
    /// A literal fragment, rendered as-is.
    Literal(String),
    /// A fragment computed at compile time.
    Callback(RawCallback),
}

/// A raw SQL expression with an optional output alias.
#[derive(Clone)]
pub struct Raw {
    /// The expression body.
    pub value: RawValue,
    /// Alias used when the expression is projected.
    pub alias: Option<String>,
}

impl Raw {
    /// Creates a literal raw expression.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            value: RawValue::Literal(sql.into()),
            alias: None,
        }
    }

    /// Creates a raw expression computed from the rendering context.
    #[must_use]
    pub fn callback<F>(callback: F) -> Self
    where
        F: Fn(&RawContext<'_>) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            value: RawValue::Callback(Arc::new(callback)),
            alias: None,
        }
    }

    /// Sets the output alias.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Renders the expression body (without alias).
    ///
    /// # Errors
    ///
    /// Propagates errors returned by a callback.
    pub fn render(&self, ctx: &RawContext<'_>) -> Result<String> {
        match &self.value {
            RawValue::Literal(sql) => Ok(sql.clone()),
            RawValue::Callback(callback) => callback(ctx),
        }
    }
}

/// Shorthand for [`Raw::new`].
#[must_use]
pub fn raw(sql: impl Into<String>) -> Raw {
    Raw::new(sql)
}

impl fmt::Debug for Raw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Raw");
        match &self.value {
            RawValue::Literal(sql) => out.field("sql", sql),
            RawValue::Callback(_) => out.field("sql", &"<callback>"),
        };
        out.field("alias", &self.alias).finish()
    }
}

impl PartialEq for Raw {
    fn eq(&self, other: &Self) -> bool {
        let same_value = match (&self.value, &other.value) {
            (RawValue::Literal(a), RawValue::Literal(b)) => a == b,
            (RawValue::Callback(a), RawValue::Callback(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_value && self.alias == other.alias
    }
}
