//! SQLite backend built on sqlx.

use std::collections::BTreeMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use querykit_core::dialect::DialectKind;
use querykit_core::entity::Cardinality;
use querykit_core::schema::{
    sql_to_canonical, ColumnNode, DefaultValue, ForeignKeyAction, IndexNode, RelationEndpoint, RelationshipNode,
    SchemaAst, TableNode,
};
use querykit_core::Value;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, Sqlite, TypeInfo, ValueRef};
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};
use crate::introspect::SchemaIntrospector;
use crate::querier::{Querier, QuerierKind, QuerierPool, QueryOutcome, Row};

// ================================================================
// Pool and querier
// ================================================================

/// Hands out [`SqliteQuerier`]s from an sqlx pool.
#[derive(Debug, Clone)]
pub struct SqliteQuerierPool {
    pool: SqlitePool,
}

impl SqliteQuerierPool {
    /// Connects to `url`. In-memory databases get a single connection so
    /// that every querier sees the same database.
    pub async fn connect(url: &str) -> Result<Self> {
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl QuerierPool for SqliteQuerierPool {
    async fn get_querier(&self) -> Result<Box<dyn Querier>> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(SqliteQuerier::new(conn)))
    }

    fn kind(&self) -> QuerierKind {
        QuerierKind::Sql(DialectKind::Sqlite)
    }
}

/// One pooled SQLite connection.
#[derive(Debug)]
pub struct SqliteQuerier {
    conn: Option<PoolConnection<Sqlite>>,
    open_transaction: bool,
}

impl SqliteQuerier {
    /// Wraps a pooled connection.
    #[must_use]
    pub const fn new(conn: PoolConnection<Sqlite>) -> Self {
        Self {
            conn: Some(conn),
            open_transaction: false,
        }
    }

    fn conn(&mut self) -> Result<&mut PoolConnection<Sqlite>> {
        self.conn.as_mut().ok_or(MigrateError::ReleasedQuerier)
    }

    async fn execute(&mut self, sql: &str) -> Result<QueryOutcome> {
        debug!(sql = %sql, "Executing SQL");
        let conn = self.conn()?;
        let result = sqlx::query(sql).execute(&mut **conn).await?;
        Ok(QueryOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }
}

/// Decodes a row by the storage class of each value; columns declared
/// `BOOLEAN` decode to [`Value::Bool`].
fn convert_row(row: &SqliteRow) -> Result<Row> {
    let mut out = IndexMap::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let storage = raw.type_info().name().to_uppercase();
            let declared = column.type_info().name().to_uppercase();
            match storage.as_str() {
                "INTEGER" if declared.contains("BOOL") => Value::Bool(row.try_get::<i64, _>(idx)? != 0),
                "INTEGER" => Value::Int(row.try_get(idx)?),
                "REAL" => Value::Float(row.try_get(idx)?),
                "BLOB" => Value::Blob(row.try_get(idx)?),
                _ => Value::Text(row.try_get(idx)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

#[async_trait]
impl Querier for SqliteQuerier {
    fn kind(&self) -> QuerierKind {
        QuerierKind::Sql(DialectKind::Sqlite)
    }

    fn has_open_transaction(&self) -> bool {
        self.open_transaction
    }

    async fn all(&mut self, sql: &str) -> Result<Vec<Row>> {
        debug!(sql = %sql, "Querying");
        let conn = self.conn()?;
        let rows = sqlx::query(sql).fetch_all(&mut **conn).await?;
        rows.iter().map(convert_row).collect()
    }

    async fn run(&mut self, sql: &str) -> Result<QueryOutcome> {
        self.execute(sql).await
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        if self.open_transaction {
            return Err(MigrateError::PendingTransaction);
        }
        self.execute(DialectKind::Sqlite.dialect().begin_transaction_command()).await?;
        self.open_transaction = true;
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        if !self.open_transaction {
            return Err(MigrateError::NoActiveTransaction);
        }
        self.execute("COMMIT").await?;
        self.open_transaction = false;
        Ok(())
    }

    async fn rollback_transaction(&mut self) -> Result<()> {
        if !self.open_transaction {
            return Err(MigrateError::NoActiveTransaction);
        }
        self.execute("ROLLBACK").await?;
        self.open_transaction = false;
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        if self.open_transaction {
            return Err(MigrateError::PendingTransaction);
        }
        if self.conn.take().is_none() {
            return Err(MigrateError::ReleasedQuerier);
        }
        Ok(())
    }

    async fn discard(&mut self) -> Result<()> {
        let conn = self.conn.take().ok_or(MigrateError::ReleasedQuerier)?;
        self.open_transaction = false;
        warn!("Closing connection instead of returning it to the pool");
        conn.close().await?;
        Ok(())
    }
}

// ================================================================
// Introspection
// ================================================================

/// Reads the schema from `sqlite_master` and the table `PRAGMA`s.
///
/// Auto-indexes backing single-column `UNIQUE` constraints are reported as
/// column flags, not indexes. Foreign keys are named
/// `fk_<table>_<columns>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteIntrospector;

impl SqliteIntrospector {
    /// Creates an introspector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    async fn foreign_keys(&self, querier: &mut dyn Querier, table: &TableNode) -> Result<Vec<RelationshipNode>> {
        let rows = querier
            .all(&format!("PRAGMA foreign_key_list({})", quote(&table.name)))
            .await?;

        let mut grouped: BTreeMap<i64, Vec<&Row>> = BTreeMap::new();
        for row in &rows {
            grouped.entry(int(row, "id")).or_default().push(row);
        }

        let mut relationships = Vec::with_capacity(grouped.len());
        for mut parts in grouped.into_values() {
            parts.sort_by_key(|row| int(row, "seq"));
            let Some(first) = parts.first() else {
                continue;
            };
            let target = text(first, "table").unwrap_or_default();
            let from: Vec<String> = parts.iter().filter_map(|row| text(row, "from")).collect();
            let mut to: Vec<String> = parts.iter().filter_map(|row| text(row, "to")).collect();
            if to.is_empty() {
                // Implicit reference to the target's primary key.
                to = self
                    .table_schema(querier, &target)
                    .await?
                    .map(|t| t.primary_key)
                    .unwrap_or_default();
            }

            let mut relationship = RelationshipNode::new(
                format!("fk_{}_{}", table.name, from.join("_")),
                RelationEndpoint::new(&table.name, from),
                RelationEndpoint::new(target, to),
            );
            relationship.kind = Cardinality::ManyToOne;
            relationship.on_delete = text(first, "on_delete").and_then(|a| a.parse::<ForeignKeyAction>().ok());
            relationship.on_update = text(first, "on_update").and_then(|a| a.parse::<ForeignKeyAction>().ok());
            relationships.push(relationship);
        }
        Ok(relationships)
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn text(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(Value::as_text).map(str::to_string)
}

fn int(row: &Row, column: &str) -> i64 {
    row.get(column).and_then(Value::as_int).unwrap_or_default()
}

#[async_trait]
impl SchemaIntrospector for SqliteIntrospector {
    async fn table_names(&self, querier: &mut dyn Querier) -> Result<Vec<String>> {
        let rows = querier
            .all("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .await?;
        Ok(rows.iter().filter_map(|row| text(row, "name")).collect())
    }

    async fn table_exists(&self, querier: &mut dyn Querier, table: &str) -> Result<bool> {
        let rows = querier
            .all(&format!(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = {}",
                literal(table)
            ))
            .await?;
        Ok(!rows.is_empty())
    }

    async fn table_schema(&self, querier: &mut dyn Querier, table: &str) -> Result<Option<TableNode>> {
        let definition = querier
            .all(&format!(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = {}",
                literal(table)
            ))
            .await?;
        let Some(definition) = definition.first() else {
            return Ok(None);
        };
        let autoincrement = text(definition, "sql").is_some_and(|sql| sql.to_uppercase().contains("AUTOINCREMENT"));

        let mut node = TableNode::new(table);
        let mut primary_key: Vec<(i64, String)> = Vec::new();
        for row in querier.all(&format!("PRAGMA table_info({})", quote(table))).await? {
            let name = text(&row, "name").unwrap_or_default();
            let declared = text(&row, "type").unwrap_or_default();
            let mut column = ColumnNode::new(&name, sql_to_canonical(&declared, DialectKind::Sqlite));
            column.nullable = int(&row, "notnull") == 0;
            column.default_value = text(&row, "dflt_value").map(DefaultValue::Expression);
            let pk = int(&row, "pk");
            if pk > 0 {
                column = column.primary_key();
                column.nullable = false;
                primary_key.push((pk, name));
            }
            node.add_column(column);
        }
        primary_key.sort();
        node.primary_key = primary_key.into_iter().map(|(_, name)| name).collect();

        let serial = match node.primary_key.as_slice() {
            [pk] if autoincrement => Some(pk.clone()),
            _ => None,
        };
        if let Some(column) = serial.and_then(|pk| node.columns.get_mut(&pk)) {
            column.is_auto_increment = true;
        }

        for index in querier.all(&format!("PRAGMA index_list({})", quote(table))).await? {
            let name = text(&index, "name").unwrap_or_default();
            let unique = int(&index, "unique") != 0;
            let origin = text(&index, "origin").unwrap_or_default();
            let mut info = querier.all(&format!("PRAGMA index_info({})", quote(&name))).await?;
            info.sort_by_key(|row| int(row, "seqno"));
            let columns: Vec<String> = info.iter().filter_map(|row| text(row, "name")).collect();

            match (origin.as_str(), columns.as_slice()) {
                ("pk", _) => {}
                ("u", [column]) => {
                    if let Some(column) = node.columns.get_mut(column) {
                        column.is_unique = true;
                    }
                }
                ("u", _) => {
                    warn!(table, index = %name, "Composite UNIQUE constraint reported as index");
                    node.add_index(IndexNode::new(name, columns).unique().from_database());
                }
                _ => {
                    let mut index = IndexNode::new(name, columns).from_database();
                    index.unique = unique;
                    node.add_index(index);
                }
            }
        }

        Ok(Some(node))
    }

    async fn introspect(&self, querier: &mut dyn Querier) -> Result<SchemaAst> {
        let mut schema = SchemaAst::new();
        for name in self.table_names(querier).await? {
            if let Some(table) = self.table_schema(querier, &name).await? {
                schema.add_table(table);
            }
        }

        let tables: Vec<TableNode> = schema.tables.values().cloned().collect();
        for table in &tables {
            for relationship in self.foreign_keys(querier, table).await? {
                if let Err(e) = schema.add_relationship(relationship) {
                    warn!(table = %table.name, error = %e, "Skipping foreign key to a missing table");
                }
            }
        }

        debug!(
            tables = schema.tables.len(),
            relationships = schema.relationships.len(),
            "Introspected SQLite schema"
        );
        Ok(schema)
    }
}
