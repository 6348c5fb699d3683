//! querykit CLI
//!
//! Command-line tool for synchronizing a database schema with entity
//! definitions.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use querykit_core::dialect::DialectKind;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use querykit_migrate::prelude::*;

/// Schema synchronization and migrations.
#[derive(Parser)]
#[command(name = "querykit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL; overrides `databaseUrl` of the configuration file.
    #[arg(short, long, env = "DATABASE_URL")]
    database: Option<String>,

    /// JSON configuration with the entity definitions.
    #[arg(short, long, env = "QUERYKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the DDL that would synchronize the schema.
    Diff {
        /// Include destructive statements.
        #[arg(long = "unsafe")]
        unsafe_changes: bool,

        /// Drop columns and indexes the entities no longer declare.
        #[arg(long)]
        drop: bool,
    },

    /// Synchronize the schema with the entities.
    Sync {
        /// Include destructive statements.
        #[arg(long = "unsafe")]
        unsafe_changes: bool,

        /// Drop columns and indexes the entities no longer declare.
        #[arg(long)]
        drop: bool,

        /// Log every statement.
        #[arg(long)]
        log: bool,
    },

    /// Drop and recreate every entity table. All data is lost.
    SyncForce,

    /// Print the live schema as JSON.
    Schema,

    /// Show applied migrations.
    Status,
}

const DEFAULT_DATABASE_URL: &str = "sqlite:db.sqlite3";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &cli.config {
        Some(path) => {
            MigrateConfig::load(path).with_context(|| format!("reading configuration {}", path.display()))?
        }
        None => MigrateConfig::default(),
    };
    if config.dialect != DialectKind::Sqlite {
        bail!("the bundled backend supports sqlite only, got '{}'", config.dialect);
    }

    let url = cli
        .database
        .clone()
        .or_else(|| config.database_url.clone())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
    let pool = SqliteQuerierPool::connect(&url)
        .await
        .with_context(|| format!("connecting to {url}"))?;

    let migrator = Migrator::new(pool.clone())
        .with_storage(DatabaseMigrationStorage::new(config.migrations_table.clone()))
        .with_introspector(SqliteIntrospector::new())
        .with_entities(config.registry())
        .exclude_tables(config.exclude_tables.iter().cloned());

    match cli.command {
        Commands::Diff { unsafe_changes, drop } => {
            let statements = migrator
                .diff_statements(SyncOptions {
                    safe: !unsafe_changes,
                    drop,
                    logging: false,
                })
                .await?;
            if statements.is_empty() {
                info!("Schema is already in sync");
            }
            for sql in statements {
                println!("{sql};");
            }
        }

        Commands::Sync {
            unsafe_changes,
            drop,
            log,
        } => {
            let statements = migrator
                .auto_sync(SyncOptions {
                    safe: !unsafe_changes,
                    drop,
                    logging: log,
                })
                .await?;
            info!(statements = statements.len(), "Sync finished");
        }

        Commands::SyncForce => {
            let statements = migrator.sync_force().await?;
            info!(statements = statements.len(), "Tables recreated");
        }

        Commands::Schema => {
            let mut querier = pool.get_querier().await?;
            let schema = SqliteIntrospector::new().introspect(querier.as_mut()).await;
            querier.release().await?;
            println!("{}", serde_json::to_string_pretty(&schema?)?);
        }

        Commands::Status => {
            let applied = migrator.executed().await?;
            if applied.is_empty() {
                info!("No migrations have been applied yet.");
            } else {
                println!("\nApplied migrations:");
                println!("{:-<60}", "");
                for name in &applied {
                    println!(" [X] {name}");
                }
                println!();
            }
        }
    }

    Ok(())
}
