//! Dialect-agnostic query model.
//!
//! A [`Query`] describes what to read for one entity: the projection, the
//! filter, sort, grouping and paging. It carries no behavior of its own; a
//! [`SqlDialect`](crate::dialect::SqlDialect) compiles it into SQL text.
//!
//! Queries can be assembled with the builder methods or parsed from JSON in
//! the familiar `$where`/`$select` notation:
//!
//! ```rust
//! use querykit_core::query::Query;
//!
//! let query = Query::from_json(&serde_json::json!({
//!     "$select": ["id"],
//!     "$where": { "id": 123, "name": { "$ne": "abc" } },
//!     "$limit": 10
//! }))
//! .unwrap();
//! assert_eq!(query.limit, Some(10));
//! ```

mod filter;
mod json;
mod raw;
mod select;
mod sort;

pub use filter::{
    FieldCondition, FieldOperator, LogicalOperator, OperatorArg, TextSearch, Where, WhereItem,
    WhereMap, WhereValue,
};
pub use raw::{raw, Raw, RawCallback, RawContext, RawValue};
pub use select::{RelationQuery, Select, SelectItem, SelectValue};
pub use sort::{Sort, SortDirection, SortEntry};

use crate::value::Value;

/// A complete read query for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// `$select`: projection, including relations to load.
    pub select: Option<Select>,
    /// `$where`: row filter.
    pub filter: Option<Where>,
    /// `$sort`.
    pub sort: Option<Sort>,
    /// `$group`: field keys to group by.
    pub group: Vec<String>,
    /// `$having`: filter applied after grouping.
    pub having: Option<WhereMap>,
    /// `$limit`.
    pub limit: Option<u64>,
    /// `$skip`.
    pub skip: Option<u64>,
}

impl Query {
    /// Creates an empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the projection.
    #[must_use]
    pub fn select(mut self, select: Select) -> Self {
        self.select = Some(select);
        self
    }

    /// Sets the filter.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<Where>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Filters by primary key.
    #[must_use]
    pub fn by_id(mut self, id: impl Into<Value>) -> Self {
        self.filter = Some(Where::Id(id.into()));
        self
    }

    /// Sets the sort.
    #[must_use]
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Sets the grouping keys.
    #[must_use]
    pub fn group<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the `HAVING` filter.
    #[must_use]
    pub fn having(mut self, having: WhereMap) -> Self {
        self.having = Some(having);
        self
    }

    /// Sets the limit.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the offset.
    #[must_use]
    pub const fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }
}
