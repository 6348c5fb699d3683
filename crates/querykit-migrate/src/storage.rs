//! Migration history tracking.
//!
//! A [`MigrationStorage`] records which migrations have been applied.
//! Writes go through the querier of the running migration so that the
//! record commits or rolls back together with the schema change.

use async_trait::async_trait;
use chrono::Utc;
use querykit_core::dialect::{FindOptions, Record, SqlDialect, WriteOptions};
use querykit_core::entity::{EntityMeta, EntityRef, EntityRegistry, FieldMeta, FieldType};
use querykit_core::query::{Query, Select, Sort, Where};
use querykit_core::schema::{SchemaAstBuilder, SchemaGenerator};
use querykit_core::{SchemaError, Value};
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::querier::Querier;

/// Default name of the history table.
pub const DEFAULT_MIGRATIONS_TABLE: &str = "querykit_migrations";

const ENTITY: &str = "QuerykitMigration";

/// Where applied migration names are kept.
#[async_trait]
pub trait MigrationStorage: Send + Sync {
    /// Creates the backing storage if it does not exist yet.
    async fn ensure_storage(&self, querier: &mut dyn Querier) -> Result<()>;

    /// Names of applied migrations, ascending.
    async fn executed(&self, querier: &mut dyn Querier) -> Result<Vec<String>>;

    /// Marks `name` as applied.
    async fn log_with_querier(&self, querier: &mut dyn Querier, name: &str) -> Result<()>;

    /// Marks `name` as reverted.
    async fn unlog_with_querier(&self, querier: &mut dyn Querier, name: &str) -> Result<()>;

    /// Tables owned by the storage, excluded from schema synchronization.
    fn tables(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Keeps the history in a database table with a `name` primary key and an
/// `executed_at` timestamp. Statements are compiled with the querier's
/// dialect.
#[derive(Debug, Clone)]
pub struct DatabaseMigrationStorage {
    table: String,
    registry: EntityRegistry,
}

impl Default for DatabaseMigrationStorage {
    fn default() -> Self {
        Self::new(DEFAULT_MIGRATIONS_TABLE)
    }
}

impl DatabaseMigrationStorage {
    /// Creates a storage backed by `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        let table = table.into();
        let entity = EntityMeta::new(ENTITY)
            .table(table.clone())
            .with_id("name")
            .field("name", FieldMeta::new(FieldType::String).length(255).not_null())
            .field(
                "executedAt",
                FieldMeta::new(FieldType::Timestamp)
                    .column("executed_at")
                    .not_null()
                    .on_insert(|| Value::from(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string())),
            );
        Self {
            table,
            registry: EntityRegistry::new().with(entity),
        }
    }

    /// Name of the history table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    fn entity(&self) -> Result<EntityRef<'_>> {
        Ok(self.registry.get(ENTITY)?)
    }
}

fn sql_dialect(querier: &dyn Querier) -> Result<&'static dyn SqlDialect> {
    querier.dialect().ok_or(MigrateError::RequiresSqlQuerier)
}

#[async_trait]
impl MigrationStorage for DatabaseMigrationStorage {
    async fn ensure_storage(&self, querier: &mut dyn Querier) -> Result<()> {
        let dialect = sql_dialect(querier)?;
        let schema = SchemaAstBuilder::new(&self.registry).build()?;
        let table = schema
            .table(&self.table)
            .ok_or_else(|| SchemaError::UnknownTable(self.table.clone()))?;
        let generator = SchemaGenerator::new(dialect.kind()).if_not_exists(true);
        for sql in generator.generate_create_table(table, &[]) {
            debug!(sql = %sql, "Ensuring migration storage");
            querier.run(&sql).await?;
        }
        Ok(())
    }

    async fn executed(&self, querier: &mut dyn Querier) -> Result<Vec<String>> {
        let dialect = sql_dialect(querier)?;
        let query = Query::new()
            .select(Select::fields(["name"]))
            .sort(Sort::new().asc("name"));
        let sql = dialect.find(self.entity()?, &query, &FindOptions::default())?;
        let rows = querier.all(&sql).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_text).map(str::to_string))
            .collect())
    }

    async fn log_with_querier(&self, querier: &mut dyn Querier, name: &str) -> Result<()> {
        let dialect = sql_dialect(querier)?;
        let mut record = Record::new();
        record.insert("name".to_string(), Value::from(name));
        let sql = dialect.insert(self.entity()?, &[record])?;
        querier.run(&sql).await?;
        Ok(())
    }

    async fn unlog_with_querier(&self, querier: &mut dyn Querier, name: &str) -> Result<()> {
        let dialect = sql_dialect(querier)?;
        let filter = Where::Id(Value::from(name));
        let sql = dialect.delete(self.entity()?, Some(&filter), &WriteOptions::default())?;
        querier.run(&sql).await?;
        Ok(())
    }

    fn tables(&self) -> Vec<String> {
        vec![self.table.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querykit_core::dialect::DialectKind;

    #[test]
    fn test_statements_use_the_configured_table() {
        let storage = DatabaseMigrationStorage::new("schema_history");
        let entity = storage.entity().unwrap();
        let dialect = DialectKind::Postgres.dialect();

        let filter = Where::Id(Value::from("0001_init"));
        let sql = dialect.delete(entity, Some(&filter), &WriteOptions::default()).unwrap();
        assert_eq!(sql, r#"DELETE FROM "schema_history" WHERE "name" = '0001_init'"#);
    }

    #[test]
    fn test_create_table_statement() {
        let storage = DatabaseMigrationStorage::default();
        let schema = SchemaAstBuilder::new(&storage.registry).build().unwrap();
        let table = schema.table(DEFAULT_MIGRATIONS_TABLE).unwrap();

        let sql = SchemaGenerator::new(DialectKind::Sqlite)
            .if_not_exists(true)
            .generate_create_table(table, &[]);
        assert_eq!(sql.len(), 1);
        assert!(sql[0].starts_with(r#"CREATE TABLE IF NOT EXISTS "querykit_migrations" ("name" "#));
        assert!(sql[0].contains(r#""executed_at" "#));
    }
}
