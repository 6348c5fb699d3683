//! Schema commands for document stores.
//!
//! Document stores have no DDL; schema changes are expressed as JSON
//! commands such as `{"action":"createCollection","collection":"items"}`
//! which the migrator interprets instead of executing SQL text.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::ast::{IndexNode, TableNode};
use super::differ::{SchemaDiff, SchemaDiffKind};

/// A structured document-store schema command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum DocumentCommand {
    /// Creates a collection.
    CreateCollection {
        /// Target collection.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collection: Option<String>,
    },
    /// Drops a collection.
    DropCollection {
        /// Target collection.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collection: Option<String>,
    },
    /// Creates an index over `keys` (field name to sort direction).
    CreateIndex {
        /// Target collection.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collection: Option<String>,
        /// Index name.
        name: String,
        /// Indexed fields, `1` ascending.
        keys: IndexMap<String, i32>,
        /// Unique index.
        #[serde(default)]
        unique: bool,
    },
    /// Drops an index.
    DropIndex {
        /// Target collection.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collection: Option<String>,
        /// Index name.
        name: String,
    },
}

impl DocumentCommand {
    /// The target collection, if the command names one.
    #[must_use]
    pub fn collection(&self) -> Option<&str> {
        match self {
            Self::CreateCollection { collection }
            | Self::DropCollection { collection }
            | Self::CreateIndex { collection, .. }
            | Self::DropIndex { collection, .. } => collection.as_deref(),
        }
    }

    /// The command's `action` tag.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::CreateCollection { .. } => "createCollection",
            Self::DropCollection { .. } => "dropCollection",
            Self::CreateIndex { .. } => "createIndex",
            Self::DropIndex { .. } => "dropIndex",
        }
    }

    /// Parses a command statement.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for malformed statements or unknown actions.
    pub fn parse(statement: &str) -> serde_json::Result<Self> {
        serde_json::from_str(statement)
    }

    /// Renders the command as a JSON statement.
    #[must_use]
    pub fn to_statement(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn create_index(index: &IndexNode) -> Self {
        Self::CreateIndex {
            collection: Some(index.table.clone()),
            name: index.name.clone(),
            keys: index.columns.iter().map(|c| (c.clone(), 1)).collect(),
            unique: index.unique,
        }
    }

    fn drop_index(index: &IndexNode) -> Self {
        Self::DropIndex {
            collection: Some(index.table.clone()),
            name: index.name.clone(),
        }
    }
}

/// Renders [`SchemaDiff`]s as [`DocumentCommand`] statements. Column
/// changes have no document-store counterpart and are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentSchemaGenerator;

impl DocumentSchemaGenerator {
    /// Creates a generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Commands creating `table` and its indexes.
    #[must_use]
    pub fn create_collection(&self, table: &TableNode) -> Vec<DocumentCommand> {
        let mut commands = vec![DocumentCommand::CreateCollection {
            collection: Some(table.name.clone()),
        }];
        commands.extend(table.indexes.iter().map(DocumentCommand::create_index));
        commands
    }

    /// Commands applying `diff`.
    #[must_use]
    pub fn commands(&self, diff: &SchemaDiff) -> Vec<DocumentCommand> {
        match (diff.kind, &diff.table) {
            (SchemaDiffKind::Create, Some(def)) => self.create_collection(&def.table),
            (SchemaDiffKind::Create, None) => vec![DocumentCommand::CreateCollection {
                collection: Some(diff.table_name.clone()),
            }],
            (SchemaDiffKind::Alter, _) => diff
                .indexes_to_drop
                .iter()
                .flatten()
                .map(DocumentCommand::drop_index)
                .chain(diff.indexes_to_add.iter().flatten().map(DocumentCommand::create_index))
                .collect(),
        }
    }

    /// Commands reverting `diff`.
    #[must_use]
    pub fn down_commands(&self, diff: &SchemaDiff) -> Vec<DocumentCommand> {
        match diff.kind {
            SchemaDiffKind::Create => vec![DocumentCommand::DropCollection {
                collection: Some(diff.table_name.clone()),
            }],
            SchemaDiffKind::Alter => diff
                .indexes_to_add
                .iter()
                .flatten()
                .map(DocumentCommand::drop_index)
                .chain(diff.indexes_to_drop.iter().flatten().map(DocumentCommand::create_index))
                .collect(),
        }
    }

    /// [`DocumentSchemaGenerator::commands`] rendered as statements.
    #[must_use]
    pub fn generate(&self, diff: &SchemaDiff) -> Vec<String> {
        self.commands(diff).iter().map(DocumentCommand::to_statement).collect()
    }

    /// [`DocumentSchemaGenerator::down_commands`] rendered as statements.
    #[must_use]
    pub fn generate_down(&self, diff: &SchemaDiff) -> Vec<String> {
        self.down_commands(diff).iter().map(DocumentCommand::to_statement).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CanonicalType, ColumnNode};

    fn items() -> TableNode {
        TableNode::new("items")
            .column(ColumnNode::new("id", CanonicalType::integer()).primary_key())
            .index(IndexNode::new("idx_items_code", ["code"]).unique())
    }

    #[test]
    fn test_create_renders_collection_and_indexes() {
        let statements = DocumentSchemaGenerator::new().generate(&SchemaDiff::create(items(), Vec::new()));
        assert_eq!(
            statements,
            [
                r#"{"action":"createCollection","collection":"items"}"#,
                r#"{"action":"createIndex","collection":"items","name":"idx_items_code","keys":{"code":1},"unique":true}"#,
            ]
        );
    }

    #[test]
    fn test_down_of_create_drops_collection() {
        let statements = DocumentSchemaGenerator::new().generate_down(&SchemaDiff::create(items(), Vec::new()));
        assert_eq!(statements, [r#"{"action":"dropCollection","collection":"items"}"#]);
    }

    #[test]
    fn test_alter_only_touches_indexes() {
        let mut diff = SchemaDiff::alter("items");
        diff.columns_to_add = Some(vec![ColumnNode::new("name", CanonicalType::varchar(50))]);
        diff.indexes_to_drop = Some(items().indexes);
        let commands = DocumentSchemaGenerator::new().commands(&diff);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].action(), "dropIndex");
        assert_eq!(commands[0].collection(), Some("items"));
    }

    #[test]
    fn test_parse_without_collection() {
        let command = DocumentCommand::parse(r#"{"action":"dropCollection"}"#).unwrap();
        assert_eq!(command, DocumentCommand::DropCollection { collection: None });
        assert!(command.collection().is_none());
        assert!(DocumentCommand::parse(r#"{"action":"renameCollection"}"#).is_err());
    }
}
