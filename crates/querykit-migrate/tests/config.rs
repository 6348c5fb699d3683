mod common;

use std::fs;

use common::{memory_pool, table};
use querykit_core::schema::SchemaAstBuilder;
use querykit_migrate::prelude::*;
use tempfile::TempDir;

const CONFIG: &str = r#"{
    "databaseUrl": "sqlite::memory:",
    "naming": "snakeCase",
    "migrationsTable": "schema_history",
    "excludeTables": ["legacy_audit"],
    "entities": [
        {
            "name": "MeasureUnitCategory",
            "fields": {
                "id": { "type": "integer", "autoIncrement": true, "nullable": false },
                "name": { "type": "string", "length": 100, "nullable": false, "unique": true }
            }
        },
        {
            "name": "MeasureUnit",
            "fields": {
                "id": { "type": "integer", "autoIncrement": true, "nullable": false },
                "name": { "type": "string", "length": 100, "index": true },
                "categoryId": {
                    "type": "integer",
                    "reference": { "entity": "MeasureUnitCategory", "onDelete": "CASCADE" }
                }
            }
        }
    ]
}"#;

fn write_config(dir: &TempDir, json: &str) -> std::path::PathBuf {
    let path = dir.path().join("querykit.json");
    fs::write(&path, json).unwrap();
    path
}

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let config = MigrateConfig::load(write_config(&dir, CONFIG)).unwrap();

    assert_eq!(config.database_url.as_deref(), Some("sqlite::memory:"));
    assert_eq!(config.naming, NamingConfig::SnakeCase);
    assert_eq!(config.migrations_table, "schema_history");
    assert_eq!(config.exclude_tables, ["legacy_audit"]);
    assert_eq!(config.entities.len(), 2);
}

#[test]
fn test_snake_case_registry() {
    let dir = TempDir::new().unwrap();
    let config = MigrateConfig::load(write_config(&dir, CONFIG)).unwrap();
    let registry = config.registry();
    let schema = SchemaAstBuilder::new(&registry).build().unwrap();

    let unit = schema.table("measure_unit").unwrap();
    assert!(unit.get_column("category_id").is_some());
    assert!(unit.get_index("idx_measure_unit_name").is_some());

    let fk = &schema.relationships["fk_measure_unit_category_id"];
    assert_eq!(fk.to.table, "measure_unit_category");
    assert_eq!(fk.to.columns, ["id"]);
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = MigrateConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, MigrateError::Io(_)));
}

#[test]
fn test_empty_migrations_table() {
    let err = MigrateConfig::from_json(r#"{"migrationsTable": " "}"#).unwrap_err();
    assert!(matches!(err, MigrateError::Config(_)));
}

#[tokio::test]
async fn test_sync_from_config() {
    let dir = TempDir::new().unwrap();
    let config = MigrateConfig::load(write_config(&dir, CONFIG)).unwrap();
    let pool = memory_pool().await;

    let migrator = Migrator::new(pool.clone())
        .with_storage(DatabaseMigrationStorage::new(config.migrations_table.clone()))
        .with_introspector(SqliteIntrospector::new())
        .with_entities(config.registry())
        .exclude_tables(config.exclude_tables.iter().cloned());
    let statements = migrator.auto_sync(SyncOptions::default()).await.unwrap();

    assert!(!statements.is_empty());
    let category = table(&pool, "measure_unit_category").await.unwrap();
    assert!(category.get_column("name").unwrap().is_unique);
    assert!(migrator.auto_sync(SyncOptions::default()).await.unwrap().is_empty());
}
