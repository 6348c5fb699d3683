//! JSON configuration of the migrator and its entities.
//!
//! ```json
//! {
//!   "databaseUrl": "sqlite:app.db",
//!   "dialect": "sqlite",
//!   "naming": "snakeCase",
//!   "excludeTables": ["legacy_audit"],
//!   "entities": [
//!     { "name": "Tag", "fields": { "id": { "type": "integer", "autoIncrement": true }, "name": { "type": "string" } } }
//!   ]
//! }
//! ```
//!
//! Value generators and computed fields are code-only and cannot be
//! expressed here.

use std::path::Path;

use querykit_core::dialect::DialectKind;
use querykit_core::entity::{EntityMeta, EntityRegistry, SnakeCaseNaming};
use serde::Deserialize;

use crate::error::{MigrateError, Result};
use crate::storage::DEFAULT_MIGRATIONS_TABLE;

/// How entity and field keys become table and column names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NamingConfig {
    /// Keys are used verbatim.
    #[default]
    Default,
    /// `measureUnitId` becomes `measure_unit_id`.
    SnakeCase,
}

fn default_migrations_table() -> String {
    DEFAULT_MIGRATIONS_TABLE.to_string()
}

/// Migrator settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateConfig {
    /// Connection URL; the `DATABASE_URL` variable takes precedence in the CLI.
    #[serde(default)]
    pub database_url: Option<String>,
    /// SQL backend.
    #[serde(default = "default_dialect")]
    pub dialect: DialectKind,
    /// History table.
    #[serde(default = "default_migrations_table")]
    pub migrations_table: String,
    /// Tables schema synchronization leaves alone.
    #[serde(default)]
    pub exclude_tables: Vec<String>,
    /// Naming strategy.
    #[serde(default)]
    pub naming: NamingConfig,
    /// Entity descriptors.
    #[serde(default)]
    pub entities: Vec<EntityMeta>,
}

const fn default_dialect() -> DialectKind {
    DialectKind::Sqlite
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            dialect: default_dialect(),
            migrations_table: default_migrations_table(),
            exclude_tables: Vec::new(),
            naming: NamingConfig::default(),
            entities: Vec::new(),
        }
    }
}

impl MigrateConfig {
    /// Parses a configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<()> {
        if self.migrations_table.trim().is_empty() {
            return Err(MigrateError::Config("migrationsTable must not be empty".to_string()));
        }
        for (i, entity) in self.entities.iter().enumerate() {
            if self.entities[..i].iter().any(|e| e.name == entity.name) {
                return Err(MigrateError::Config(format!("entity '{}' is declared twice", entity.name)));
            }
            if !entity.fields.contains_key(&entity.id) {
                return Err(MigrateError::Config(format!(
                    "entity '{}' has no id field '{}'",
                    entity.name, entity.id
                )));
            }
        }
        Ok(())
    }

    /// Builds the entity registry with the configured naming strategy.
    #[must_use]
    pub fn registry(&self) -> EntityRegistry {
        let registry: EntityRegistry = self.entities.iter().cloned().collect();
        match self.naming {
            NamingConfig::Default => registry,
            NamingConfig::SnakeCase => registry.with_naming(SnakeCaseNaming),
        }
    }
}
