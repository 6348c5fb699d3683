#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use querykit_core::dialect::DialectKind;
use querykit_core::entity::{EntityMeta, EntityRegistry, FieldMeta, FieldReference, FieldType};
use querykit_core::schema::{DocumentCommand, SchemaAst, TableNode};
use querykit_migrate::prelude::*;
use sqlx::sqlite::SqlitePoolOptions;

// ================================================================
// Entities
// ================================================================

fn id() -> FieldMeta {
    FieldMeta::new(FieldType::Integer).not_null().auto_increment()
}

fn text(length: u32) -> FieldMeta {
    FieldMeta::new(FieldType::String).length(length)
}

pub fn measure_unit_category() -> EntityMeta {
    EntityMeta::new("MeasureUnitCategory")
        .field("id", id())
        .field("name", text(100).not_null().unique())
}

pub fn measure_unit() -> EntityMeta {
    EntityMeta::new("MeasureUnit")
        .field("id", id())
        .field("name", text(100).not_null().indexed())
        .field(
            "categoryId",
            FieldMeta::new(FieldType::Integer).references(FieldReference::new("MeasureUnitCategory")),
        )
}

pub fn tag() -> EntityMeta {
    EntityMeta::new("Tag")
        .field("id", id())
        .field("name", text(50).not_null())
}

pub fn registry() -> EntityRegistry {
    EntityRegistry::new()
        .with(measure_unit_category())
        .with(measure_unit())
        .with(tag())
}

// ================================================================
// SQLite
// ================================================================

pub async fn memory_pool() -> SqliteQuerierPool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    SqliteQuerierPool::from_pool(pool)
}

/// Runs statements on a fresh querier and releases it.
pub async fn execute(pool: &SqliteQuerierPool, statements: &[&str]) {
    let mut querier = pool.get_querier().await.unwrap();
    for sql in statements {
        querier.run(sql).await.unwrap();
    }
    querier.release().await.unwrap();
}

pub async fn introspect(pool: &SqliteQuerierPool) -> SchemaAst {
    let mut querier = pool.get_querier().await.unwrap();
    let schema = SqliteIntrospector::new().introspect(querier.as_mut()).await.unwrap();
    querier.release().await.unwrap();
    schema
}

pub async fn table(pool: &SqliteQuerierPool, name: &str) -> Option<TableNode> {
    let mut querier = pool.get_querier().await.unwrap();
    let table = SqliteIntrospector::new().table_schema(querier.as_mut(), name).await.unwrap();
    querier.release().await.unwrap();
    table
}

// ================================================================
// Recording querier
// ================================================================

/// Statements, transaction events and commands seen by recording queriers.
pub type Log = Arc<Mutex<Vec<String>>>;

/// A querier that records everything it is asked to do.
pub struct RecordingQuerier {
    kind: QuerierKind,
    log: Log,
    fail_on: Option<String>,
    fail_rollback: bool,
    open_transaction: bool,
}

impl RecordingQuerier {
    pub fn new(kind: QuerierKind) -> Self {
        Self {
            kind,
            log: Log::default(),
            fail_on: None,
            fail_rollback: false,
            open_transaction: false,
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }
}

#[async_trait]
impl Querier for RecordingQuerier {
    fn kind(&self) -> QuerierKind {
        self.kind
    }

    fn has_open_transaction(&self) -> bool {
        self.open_transaction
    }

    async fn all(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.record(sql);
        Ok(Vec::new())
    }

    async fn run(&mut self, sql: &str) -> Result<QueryOutcome> {
        self.record(sql);
        if self.fail_on.as_deref().is_some_and(|needle| sql.contains(needle)) {
            return Err(MigrateError::Database(sqlx::Error::Protocol(format!("cannot run {sql}"))));
        }
        Ok(QueryOutcome::default())
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        if self.open_transaction {
            return Err(MigrateError::PendingTransaction);
        }
        self.record("BEGIN");
        self.open_transaction = true;
        Ok(())
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        if !self.open_transaction {
            return Err(MigrateError::NoActiveTransaction);
        }
        self.record("COMMIT");
        self.open_transaction = false;
        Ok(())
    }

    async fn rollback_transaction(&mut self) -> Result<()> {
        if !self.open_transaction {
            return Err(MigrateError::NoActiveTransaction);
        }
        self.record("ROLLBACK");
        if self.fail_rollback {
            return Err(MigrateError::Database(sqlx::Error::Protocol("rollback failed".to_string())));
        }
        self.open_transaction = false;
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        if self.open_transaction {
            return Err(MigrateError::PendingTransaction);
        }
        self.record("RELEASE");
        Ok(())
    }

    async fn discard(&mut self) -> Result<()> {
        self.record("DISCARD");
        self.open_transaction = false;
        Ok(())
    }

    async fn run_command(&mut self, command: &DocumentCommand) -> Result<()> {
        self.record(command.to_statement());
        Ok(())
    }
}

/// Hands out [`RecordingQuerier`]s sharing one log.
#[derive(Clone)]
pub struct RecordingPool {
    kind: QuerierKind,
    log: Log,
    fail_on: Option<String>,
    fail_rollback: bool,
}

impl RecordingPool {
    pub fn sql() -> Self {
        Self::new(QuerierKind::Sql(DialectKind::Sqlite))
    }

    pub fn document() -> Self {
        Self::new(QuerierKind::Document)
    }

    fn new(kind: QuerierKind) -> Self {
        Self {
            kind,
            log: Log::default(),
            fail_on: None,
            fail_rollback: false,
        }
    }

    /// Makes statements containing `needle` fail.
    pub fn fail_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    /// Makes every rollback fail, leaving the transaction open.
    pub fn fail_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Recorded entries that are neither transaction events nor releases.
    pub fn statements(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter(|entry| !matches!(entry.as_str(), "BEGIN" | "COMMIT" | "ROLLBACK" | "RELEASE" | "DISCARD"))
            .collect()
    }
}

#[async_trait]
impl QuerierPool for RecordingPool {
    async fn get_querier(&self) -> Result<Box<dyn Querier>> {
        Ok(Box::new(RecordingQuerier {
            kind: self.kind,
            log: Arc::clone(&self.log),
            fail_on: self.fail_on.clone(),
            fail_rollback: self.fail_rollback,
            open_transaction: false,
        }))
    }

    fn kind(&self) -> QuerierKind {
        self.kind
    }
}

// ================================================================
// In-memory history and a fixed schema
// ================================================================

/// Keeps applied migration names in memory.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    applied: Arc<Mutex<Vec<String>>>,
}

impl MemoryStorage {
    pub fn with_applied(names: &[&str]) -> Self {
        let storage = Self::default();
        storage
            .applied
            .lock()
            .unwrap()
            .extend(names.iter().map(|name| (*name).to_string()));
        storage
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl MigrationStorage for MemoryStorage {
    async fn ensure_storage(&self, _querier: &mut dyn Querier) -> Result<()> {
        Ok(())
    }

    async fn executed(&self, _querier: &mut dyn Querier) -> Result<Vec<String>> {
        let mut applied = self.applied();
        applied.sort();
        Ok(applied)
    }

    async fn log_with_querier(&self, _querier: &mut dyn Querier, name: &str) -> Result<()> {
        self.applied.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn unlog_with_querier(&self, _querier: &mut dyn Querier, name: &str) -> Result<()> {
        self.applied.lock().unwrap().retain(|applied| applied != name);
        Ok(())
    }
}

/// Reports the same schema on every call.
#[derive(Clone, Default)]
pub struct StaticIntrospector {
    schema: SchemaAst,
}

impl StaticIntrospector {
    pub fn new(schema: SchemaAst) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl SchemaIntrospector for StaticIntrospector {
    async fn table_names(&self, _querier: &mut dyn Querier) -> Result<Vec<String>> {
        Ok(self.schema.tables.keys().cloned().collect())
    }

    async fn table_schema(&self, _querier: &mut dyn Querier, table: &str) -> Result<Option<TableNode>> {
        Ok(self.schema.table(table).cloned())
    }

    async fn table_exists(&self, _querier: &mut dyn Querier, table: &str) -> Result<bool> {
        Ok(self.schema.table(table).is_some())
    }

    async fn introspect(&self, _querier: &mut dyn Querier) -> Result<SchemaAst> {
        Ok(self.schema.clone())
    }
}
