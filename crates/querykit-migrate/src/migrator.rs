//! Migration executor and schema synchronization.
//!
//! The [`Migrator`] applies and reverts [`Migration`]s one at a time, each
//! in its own transaction together with its history record, and can
//! synchronize the live schema with the entity registry.

use std::sync::Arc;
use std::time::Instant;

use querykit_core::dialect::DialectKind;
use querykit_core::entity::EntityRegistry;
use querykit_core::schema::{
    DiffOptions, DocumentCommand, DocumentSchemaGenerator, SchemaAstBuilder, SchemaAstDiffer, SchemaDiff,
    SchemaGenerator,
};
use tracing::{debug, error, info, warn};

use crate::error::{MigrateError, Result};
use crate::introspect::SchemaIntrospector;
use crate::migration::{Direction, Migration, MigrationResult};
use crate::querier::{release_with, Querier, QuerierKind, QuerierPool};
use crate::storage::{DatabaseMigrationStorage, MigrationStorage};
use crate::transaction::{Propagation, TransactionScope};

/// Bounds of an `up`/`down` call. With neither set every candidate runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrateOptions {
    /// Stop after the migration with this name (inclusive).
    pub to: Option<String>,
    /// Run at most this many migrations.
    pub step: Option<usize>,
}

impl MigrateOptions {
    /// Runs up to and including `name`.
    #[must_use]
    pub fn to(name: impl Into<String>) -> Self {
        Self {
            to: Some(name.into()),
            step: None,
        }
    }

    /// Runs at most `step` migrations.
    #[must_use]
    pub const fn step(step: usize) -> Self {
        Self { to: None, step: Some(step) }
    }
}

/// Options of [`Migrator::auto_sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Keep destructive changes out unless `drop` is also set.
    pub safe: bool,
    /// Allow dropping columns and indexes when `safe` is off.
    pub drop: bool,
    /// Log each statement at `info` instead of `debug`.
    pub logging: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            safe: true,
            drop: false,
            logging: false,
        }
    }
}

impl SyncOptions {
    const fn destructive(self) -> bool {
        !self.safe && self.drop
    }
}

/// Applies migrations and synchronizes schemas.
pub struct Migrator {
    pool: Arc<dyn QuerierPool>,
    storage: Arc<dyn MigrationStorage>,
    introspector: Option<Arc<dyn SchemaIntrospector>>,
    registry: EntityRegistry,
    migrations: Vec<Migration>,
    exclude_tables: Vec<String>,
}

impl Migrator {
    /// Creates a migrator keeping its history in [`DatabaseMigrationStorage`].
    #[must_use]
    pub fn new(pool: impl QuerierPool + 'static) -> Self {
        Self {
            pool: Arc::new(pool),
            storage: Arc::new(DatabaseMigrationStorage::default()),
            introspector: None,
            registry: EntityRegistry::new(),
            migrations: Vec::new(),
            exclude_tables: Vec::new(),
        }
    }

    /// Replaces the history storage.
    #[must_use]
    pub fn with_storage(mut self, storage: impl MigrationStorage + 'static) -> Self {
        self.storage = Arc::new(storage);
        self
    }

    /// Sets the introspector used by schema synchronization.
    #[must_use]
    pub fn with_introspector(mut self, introspector: impl SchemaIntrospector + 'static) -> Self {
        self.introspector = Some(Arc::new(introspector));
        self
    }

    /// Sets the entities the schema is synchronized with.
    #[must_use]
    pub fn with_entities(mut self, registry: EntityRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Adds a migration.
    #[must_use]
    pub fn migration(mut self, migration: Migration) -> Self {
        self.add_migration(migration);
        self
    }

    /// Adds migrations.
    #[must_use]
    pub fn migrations(mut self, migrations: impl IntoIterator<Item = Migration>) -> Self {
        for migration in migrations {
            self.add_migration(migration);
        }
        self
    }

    /// Tables schema synchronization leaves alone.
    #[must_use]
    pub fn exclude_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_tables.extend(tables.into_iter().map(Into::into));
        self
    }

    fn add_migration(&mut self, migration: Migration) {
        let position = self
            .migrations
            .partition_point(|m| m.name() <= migration.name());
        self.migrations.insert(position, migration);
    }

    /// Known migrations, ascending by name.
    #[must_use]
    pub fn known_migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// The entity registry.
    #[must_use]
    pub const fn entities(&self) -> &EntityRegistry {
        &self.registry
    }

    // ================================================================
    // Migrations
    // ================================================================

    /// Names of applied migrations, ascending.
    pub async fn executed(&self) -> Result<Vec<String>> {
        let mut querier = self.pool.get_querier().await?;
        let result = self.executed_with(querier.as_mut()).await;
        release_with(querier.as_mut(), result).await
    }

    /// Migrations not applied yet, ascending by name.
    pub async fn pending(&self) -> Result<Vec<&Migration>> {
        let executed = self.executed().await?;
        Ok(self.pending_in(&executed))
    }

    /// Applies pending migrations.
    ///
    /// Stops at the first failure; the returned results end with the
    /// failed step.
    ///
    /// # Errors
    ///
    /// Fails with [`MigrateError::NotFound`] before anything runs when `to`
    /// names no pending migration, with [`MigrateError::RequiresSqlQuerier`]
    /// on document stores, and on connection or storage errors.
    /// Failing migrations are reported in the results instead.
    pub async fn up(&self, options: MigrateOptions) -> Result<Vec<MigrationResult>> {
        self.migrate(Direction::Up, &options).await
    }

    /// Reverts applied migrations, most recent first.
    ///
    /// # Errors
    ///
    /// Same as [`Migrator::up`].
    pub async fn down(&self, options: MigrateOptions) -> Result<Vec<MigrationResult>> {
        self.migrate(Direction::Down, &options).await
    }

    async fn executed_with(&self, querier: &mut dyn Querier) -> Result<Vec<String>> {
        self.storage.ensure_storage(querier).await?;
        let executed = self.storage.executed(querier).await?;
        for name in &executed {
            if !self.migrations.iter().any(|m| m.name() == name) {
                warn!(migration = %name, "Applied migration is not known to the migrator");
            }
        }
        Ok(executed)
    }

    fn pending_in(&self, executed: &[String]) -> Vec<&Migration> {
        self.migrations
            .iter()
            .filter(|m| !executed.iter().any(|name| name == m.name()))
            .collect()
    }

    async fn migrate(&self, direction: Direction, options: &MigrateOptions) -> Result<Vec<MigrationResult>> {
        let mut querier = self.pool.get_querier().await?;
        let result = match querier.kind() {
            QuerierKind::Sql(_) => self.migrate_with(querier.as_mut(), direction, options).await,
            QuerierKind::Document => Err(MigrateError::RequiresSqlQuerier),
        };
        release_with(querier.as_mut(), result).await
    }

    async fn migrate_with(
        &self,
        querier: &mut dyn Querier,
        direction: Direction,
        options: &MigrateOptions,
    ) -> Result<Vec<MigrationResult>> {
        let executed = self.executed_with(querier).await?;
        let candidates = match direction {
            Direction::Up => self.pending_in(&executed),
            Direction::Down => self
                .migrations
                .iter()
                .rev()
                .filter(|m| executed.iter().any(|name| name == m.name()))
                .collect(),
        };
        let selected = select(candidates, options)?;
        if selected.is_empty() {
            info!(%direction, "No migrations to run");
        }

        let mut results = Vec::with_capacity(selected.len());
        for migration in selected {
            let result = self.execute(querier, migration, direction).await;
            let failed = !result.success;
            results.push(result);
            if failed {
                break;
            }
        }
        Ok(results)
    }

    async fn execute(&self, querier: &mut dyn Querier, migration: &Migration, direction: Direction) -> MigrationResult {
        info!(migration = %migration.name(), %direction, "Running migration");
        let started = Instant::now();
        let outcome = self.execute_step(querier, migration, direction).await;
        let duration = started.elapsed();

        match outcome {
            Ok(()) => {
                info!(
                    migration = %migration.name(),
                    %direction,
                    elapsed = ?duration,
                    "Migration done"
                );
                MigrationResult {
                    name: migration.name().to_string(),
                    direction,
                    duration,
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                error!(migration = %migration.name(), %direction, error = %e, "Migration failed");
                MigrationResult {
                    name: migration.name().to_string(),
                    direction,
                    duration,
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn execute_step(&self, querier: &mut dyn Querier, migration: &Migration, direction: Direction) -> Result<()> {
        let scope = TransactionScope::begin(querier, Propagation::Required).await?;
        let result = async {
            migration.run(direction, querier).await?;
            match direction {
                Direction::Up => self.storage.log_with_querier(querier, migration.name()).await,
                Direction::Down => self.storage.unlog_with_querier(querier, migration.name()).await,
            }
        }
        .await;
        scope.finish(querier, result).await
    }

    // ================================================================
    // Schema synchronization
    // ================================================================

    /// Brings the live schema in line with the entities, in one
    /// transaction. Returns the statements that were generated; an empty
    /// list means the schema was already in sync.
    ///
    /// # Errors
    ///
    /// A failing statement rolls the transaction back and is returned.
    /// Document-store commands without a collection fail before any runs.
    pub async fn auto_sync(&self, options: SyncOptions) -> Result<Vec<String>> {
        let mut querier = self.pool.get_querier().await?;
        let result = match querier.kind() {
            QuerierKind::Sql(kind) => self.sync_sql(querier.as_mut(), kind, options).await,
            QuerierKind::Document => self.sync_documents(querier.as_mut(), options).await,
        };
        release_with(querier.as_mut(), result).await
    }

    /// The statements [`Migrator::auto_sync`] would run, without running them.
    pub async fn diff_statements(&self, options: SyncOptions) -> Result<Vec<String>> {
        let mut querier = self.pool.get_querier().await?;
        let result = match querier.kind() {
            QuerierKind::Sql(kind) => self.sql_statements(querier.as_mut(), kind, options).await,
            QuerierKind::Document => self.document_statements(querier.as_mut(), options).await,
        };
        release_with(querier.as_mut(), result).await
    }

    /// Drops every entity table, in reverse dependency order, and creates
    /// them again. Development only: all data is lost.
    pub async fn sync_force(&self) -> Result<Vec<String>> {
        let mut querier = self.pool.get_querier().await?;
        let result = match querier.kind() {
            QuerierKind::Sql(kind) => self.sync_force_with(querier.as_mut(), kind).await,
            QuerierKind::Document => Err(MigrateError::RequiresSqlQuerier),
        };
        release_with(querier.as_mut(), result).await
    }

    fn excluded_tables(&self) -> Vec<String> {
        let mut tables = self.storage.tables();
        tables.extend(self.exclude_tables.iter().cloned());
        tables
    }

    async fn schema_diffs(
        &self,
        querier: &mut dyn Querier,
        dialect: Option<DialectKind>,
        options: SyncOptions,
    ) -> Result<Vec<SchemaDiff>> {
        let introspector = self
            .introspector
            .as_ref()
            .ok_or_else(|| MigrateError::Config("schema synchronization needs an introspector".to_string()))?;
        let mut desired = SchemaAstBuilder::new(&self.registry).build()?;
        if let Some(kind) = dialect {
            desired.normalize_types(kind);
        }
        let current = introspector.introspect(querier).await?;

        let differ = SchemaAstDiffer::new(DiffOptions {
            exclude_tables: self.excluded_tables(),
            ..DiffOptions::default()
        });
        let result = differ.diff(&desired, &current);
        for table in &result.tables_to_drop {
            debug!(table = %table.name, "Table is not backed by an entity, leaving it");
        }

        Ok(result
            .schema_diffs()
            .into_iter()
            .map(|diff| {
                if options.destructive() {
                    diff
                } else {
                    diff.without_destructive()
                }
            })
            .filter(|diff| !diff.is_empty())
            .collect())
    }

    async fn sql_statements(&self, querier: &mut dyn Querier, kind: DialectKind, options: SyncOptions) -> Result<Vec<String>> {
        let generator = SchemaGenerator::new(kind);
        let mut statements = Vec::new();
        for diff in self.schema_diffs(querier, Some(kind), options).await? {
            statements.extend(generator.generate(&diff)?);
        }
        Ok(statements)
    }

    async fn document_statements(&self, querier: &mut dyn Querier, options: SyncOptions) -> Result<Vec<String>> {
        let generator = DocumentSchemaGenerator::new();
        Ok(self
            .schema_diffs(querier, None, options)
            .await?
            .iter()
            .flat_map(|diff| generator.generate(diff))
            .collect())
    }

    async fn sync_sql(&self, querier: &mut dyn Querier, kind: DialectKind, options: SyncOptions) -> Result<Vec<String>> {
        let statements = self.sql_statements(querier, kind, options).await?;
        if statements.is_empty() {
            info!("Schema is already in sync");
            return Ok(statements);
        }

        let scope = TransactionScope::begin(querier, Propagation::Required).await?;
        let result = run_statements(querier, &statements, options.logging).await;
        scope.finish(querier, result).await?;
        info!(statements = statements.len(), "Schema synchronized");
        Ok(statements)
    }

    async fn sync_documents(&self, querier: &mut dyn Querier, options: SyncOptions) -> Result<Vec<String>> {
        let statements = self.document_statements(querier, options).await?;
        if statements.is_empty() {
            info!("Schema is already in sync");
            return Ok(statements);
        }
        run_document_statements(querier, &statements, options.logging).await?;
        Ok(statements)
    }

    async fn sync_force_with(&self, querier: &mut dyn Querier, kind: DialectKind) -> Result<Vec<String>> {
        let desired = SchemaAstBuilder::new(&self.registry).build()?;
        let generator = SchemaGenerator::new(kind);
        let excluded = self.excluded_tables();
        let tables: Vec<_> = desired
            .sorted_tables()
            .into_iter()
            .filter(|t| !excluded.contains(&t.name))
            .collect();

        let mut statements: Vec<String> = tables
            .iter()
            .rev()
            .map(|t| generator.generate_drop_table(&t.name, true, true))
            .collect();
        for table in &tables {
            let foreign_keys = desired.outgoing(table).cloned().collect();
            statements.extend(generator.generate(&SchemaDiff::create((*table).clone(), foreign_keys))?);
        }

        warn!(tables = tables.len(), "Dropping and recreating all tables");
        let scope = TransactionScope::begin(querier, Propagation::Required).await?;
        let result = run_statements(querier, &statements, true).await;
        scope.finish(querier, result).await?;
        Ok(statements)
    }
}

fn select<'m>(mut candidates: Vec<&'m Migration>, options: &MigrateOptions) -> Result<Vec<&'m Migration>> {
    if let Some(to) = &options.to {
        let position = candidates
            .iter()
            .position(|m| m.name() == to)
            .ok_or_else(|| MigrateError::NotFound(to.clone()))?;
        candidates.truncate(position + 1);
    }
    if let Some(step) = options.step {
        candidates.truncate(step);
    }
    Ok(candidates)
}

/// Runs SQL statements in order, skipping `--` comment statements.
pub async fn run_statements(querier: &mut dyn Querier, statements: &[String], logging: bool) -> Result<()> {
    for sql in statements {
        if sql.starts_with("--") {
            warn!(comment = %sql, "Skipping comment (unsupported operation)");
            continue;
        }
        if logging {
            info!(sql = %sql, "Executing SQL");
        } else {
            debug!(sql = %sql, "Executing SQL");
        }
        querier.run(sql).await?;
    }
    Ok(())
}

/// Interprets statements as [`DocumentCommand`]s and runs them.
///
/// Every statement is parsed and checked before the first one runs; a
/// command without a collection fails with
/// [`MigrateError::MissingCollection`].
pub async fn run_document_statements(querier: &mut dyn Querier, statements: &[String], logging: bool) -> Result<()> {
    let commands = statements
        .iter()
        .map(|statement| {
            let command = DocumentCommand::parse(statement)?;
            if command.collection().is_none() {
                return Err(MigrateError::MissingCollection(command.action().to_string()));
            }
            Ok(command)
        })
        .collect::<Result<Vec<_>>>()?;

    for command in &commands {
        if logging {
            info!(action = command.action(), collection = ?command.collection(), "Executing command");
        } else {
            debug!(action = command.action(), collection = ?command.collection(), "Executing command");
        }
        querier.run_command(command).await?;
    }
    Ok(())
}
