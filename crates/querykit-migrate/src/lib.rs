//! # querykit-migrate
//!
//! Migrations and schema synchronization for `querykit-core`.
//!
//! - **Querier** - one connection: statements, transactions, release
//! - **Migrator** - applies and reverts migrations, one transaction each
//! - **Storage** - records applied migrations
//! - **Introspector** - reads the live schema back as a `SchemaAst`
//! - **SQLite** - sqlx-backed querier, pool and introspector
//!
//! # Example
//!
//! ```rust,ignore
//! use querykit_migrate::prelude::*;
//!
//! let pool = SqliteQuerierPool::connect("sqlite:app.db").await?;
//! let migrator = Migrator::new(pool)
//!     .with_introspector(SqliteIntrospector::new())
//!     .with_entities(registry)
//!     .migration(Migration::sql(
//!         "0001_seed_tags",
//!         ["INSERT INTO \"Tag\" (\"name\") VALUES ('new')"],
//!         ["DELETE FROM \"Tag\""],
//!     ));
//!
//! migrator.auto_sync(SyncOptions::default()).await?;
//! for result in migrator.up(MigrateOptions::default()).await? {
//!     println!("{} {}", result.name, result.success);
//! }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Show the DDL that would bring the database in line with the entities
//! querykit --config querykit.json diff
//!
//! # Apply it, dropping columns and indexes the entities no longer declare
//! querykit --config querykit.json sync --unsafe --drop
//!
//! # Print the live schema
//! querykit schema
//! ```

pub mod config;
pub mod error;
pub mod introspect;
pub mod migration;
pub mod migrator;
pub mod querier;
pub mod sqlite;
pub mod storage;
pub mod transaction;

pub use error::{MigrateError, Result};

/// Commonly used types.
pub mod prelude {
    pub use crate::config::{MigrateConfig, NamingConfig};
    pub use crate::error::{MigrateError, Result};
    pub use crate::introspect::SchemaIntrospector;
    pub use crate::migration::{Direction, Migration, MigrationResult};
    pub use crate::migrator::{MigrateOptions, Migrator, SyncOptions};
    pub use crate::querier::{Querier, QuerierKind, QuerierPool, QueryOutcome, Row};
    pub use crate::sqlite::{SqliteIntrospector, SqliteQuerier, SqliteQuerierPool};
    pub use crate::storage::{DatabaseMigrationStorage, MigrationStorage};
    pub use crate::transaction::{transactional, Propagation, TransactionScope};
}
