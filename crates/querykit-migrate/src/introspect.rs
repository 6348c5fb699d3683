//! Reading the live schema back from a database.

use async_trait::async_trait;
use querykit_core::schema::{SchemaAst, TableNode};

use crate::error::Result;
use crate::querier::Querier;

/// Reads tables, columns, indexes and foreign keys of a live database.
///
/// Missing tables are not errors: [`SchemaIntrospector::table_schema`]
/// returns `None` and [`SchemaIntrospector::table_exists`] returns `false`.
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// Names of user tables.
    async fn table_names(&self, querier: &mut dyn Querier) -> Result<Vec<String>>;

    /// Columns and indexes of `table`.
    async fn table_schema(&self, querier: &mut dyn Querier, table: &str) -> Result<Option<TableNode>>;

    /// Whether `table` exists.
    async fn table_exists(&self, querier: &mut dyn Querier, table: &str) -> Result<bool>;

    /// The whole schema: tables, indexes and relationships.
    async fn introspect(&self, querier: &mut dyn Querier) -> Result<SchemaAst>;
}
