//! In-memory schema graph.
//!
//! A [`SchemaAst`] owns its tables and relationships. Tables refer to their
//! relationships, and columns and indexes to their table, by name only, so
//! self-referencing and mutually-referencing tables need no ownership cycles.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::CanonicalType;
use crate::dialect::DialectKind;
use crate::entity::Cardinality;
use crate::error::{SchemaError, SchemaResult};

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    /// No action.
    #[serde(rename = "NO ACTION")]
    NoAction,
    /// Restrict deletion/update.
    #[serde(rename = "RESTRICT")]
    Restrict,
    /// Cascade the operation.
    #[serde(rename = "CASCADE")]
    Cascade,
    /// Set to NULL.
    #[serde(rename = "SET NULL")]
    SetNull,
    /// Set to default value.
    #[serde(rename = "SET DEFAULT")]
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of the action.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

impl fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for ForeignKeyAction {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('_', " ").as_str() {
            "NO ACTION" | "" => Ok(Self::NoAction),
            "RESTRICT" => Ok(Self::Restrict),
            "CASCADE" => Ok(Self::Cascade),
            "SET NULL" => Ok(Self::SetNull),
            "SET DEFAULT" => Ok(Self::SetDefault),
            _ => Err(SchemaError::InvalidType(s.to_string())),
        }
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Boolean(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// Raw SQL expression (e.g. `CURRENT_TIMESTAMP`), also used for
    /// introspected defaults.
    Expression(String),
}

impl DefaultValue {
    /// Returns the SQL representation of the default value.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Boolean(true) => String::from("TRUE"),
            Self::Boolean(false) => String::from("FALSE"),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Expression(expr) => expr.clone(),
        }
    }
}

/// A column of a [`TableNode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnNode {
    /// Column name.
    pub name: String,
    /// Name of the owning table.
    pub table: String,
    /// Dialect-neutral type.
    #[serde(rename = "type")]
    pub column_type: CanonicalType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Part of the primary key.
    pub is_primary_key: bool,
    /// Generated by the database.
    pub is_auto_increment: bool,
    /// Carries a single-column UNIQUE constraint.
    pub is_unique: bool,
    /// Column default.
    pub default_value: Option<DefaultValue>,
    /// Column comment.
    pub comment: Option<String>,
}

impl ColumnNode {
    /// Creates a nullable column not yet attached to a table.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: CanonicalType) -> Self {
        Self {
            name: name.into(),
            table: String::new(),
            column_type,
            nullable: true,
            is_primary_key: false,
            is_auto_increment: false,
            is_unique: false,
            default_value: None,
            comment: None,
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column as (part of) the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    /// Marks the column auto-increment.
    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.is_auto_increment = true;
        self
    }

    /// Marks the column unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Where an index definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexSource {
    /// Declared by entity metadata.
    Entity,
    /// Found in the live database.
    Database,
}

/// Whether an index is known to exist in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    /// Declared but not yet confirmed in the database.
    Pending,
    /// Present in the database.
    Synced,
}

/// Index method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    /// B-tree (the default everywhere).
    Btree,
    /// Hash index.
    Hash,
    /// Generalized inverted index.
    Gin,
    /// Generalized search tree.
    Gist,
    /// Full-text index.
    Fulltext,
}

impl IndexType {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Btree => "BTREE",
            Self::Hash => "HASH",
            Self::Gin => "GIN",
            Self::Gist => "GIST",
            Self::Fulltext => "FULLTEXT",
        }
    }
}

/// An index of a [`TableNode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexNode {
    /// Index name.
    pub name: String,
    /// Name of the owning table.
    pub table: String,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// UNIQUE index.
    pub unique: bool,
    /// Index method; `None` means the dialect default.
    pub index_type: Option<IndexType>,
    /// Provenance.
    pub source: IndexSource,
    /// Sync status.
    pub sync_status: SyncStatus,
}

impl IndexNode {
    /// Creates an entity-declared index.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            table: String::new(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            index_type: None,
            source: IndexSource::Entity,
            sync_status: SyncStatus::Pending,
        }
    }

    /// Makes the index unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the index method.
    #[must_use]
    pub const fn index_type(mut self, index_type: IndexType) -> Self {
        self.index_type = Some(index_type);
        self
    }

    /// Marks the index as introspected from the database.
    #[must_use]
    pub const fn from_database(mut self) -> Self {
        self.source = IndexSource::Database;
        self.sync_status = SyncStatus::Synced;
        self
    }

    /// Index method with the default filled in.
    #[must_use]
    pub fn effective_type(&self) -> IndexType {
        self.index_type.unwrap_or(IndexType::Btree)
    }
}

/// One side of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEndpoint {
    /// Table name.
    pub table: String,
    /// Column names, in key order.
    pub columns: Vec<String>,
}

impl RelationEndpoint {
    /// Creates an endpoint.
    #[must_use]
    pub fn new<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// A foreign-key relationship. `from` holds the referencing columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipNode {
    /// Constraint name.
    pub name: String,
    /// Cardinality seen from the referencing table.
    pub kind: Cardinality,
    /// Referencing side.
    pub from: RelationEndpoint,
    /// Referenced side.
    pub to: RelationEndpoint,
    /// ON DELETE action.
    pub on_delete: Option<ForeignKeyAction>,
    /// ON UPDATE action.
    pub on_update: Option<ForeignKeyAction>,
}

impl RelationshipNode {
    /// Creates a many-to-one relationship with unspecified actions.
    #[must_use]
    pub fn new(name: impl Into<String>, from: RelationEndpoint, to: RelationEndpoint) -> Self {
        Self {
            name: name.into(),
            kind: Cardinality::ManyToOne,
            from,
            to,
            on_delete: None,
            on_update: None,
        }
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub const fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Sets the ON UPDATE action.
    #[must_use]
    pub const fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = Some(action);
        self
    }

    /// ON DELETE action, `NO ACTION` when unspecified.
    #[must_use]
    pub fn delete_action(&self) -> ForeignKeyAction {
        self.on_delete.unwrap_or(ForeignKeyAction::NoAction)
    }

    /// ON UPDATE action, `NO ACTION` when unspecified.
    #[must_use]
    pub fn update_action(&self) -> ForeignKeyAction {
        self.on_update.unwrap_or(ForeignKeyAction::NoAction)
    }
}

/// A table of a [`SchemaAst`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableNode {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: IndexMap<String, ColumnNode>,
    /// Primary key column names.
    pub primary_key: Vec<String>,
    /// Secondary indexes.
    pub indexes: Vec<IndexNode>,
    /// Names of relationships referencing this table.
    pub incoming: Vec<String>,
    /// Names of relationships declared on this table.
    pub outgoing: Vec<String>,
    /// Table comment.
    pub comment: Option<String>,
}

impl TableNode {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
            comment: None,
        }
    }

    /// Appends a column, attaching it to this table.
    #[must_use]
    pub fn column(mut self, column: ColumnNode) -> Self {
        self.add_column(column);
        self
    }

    /// Appends an index, attaching it to this table.
    #[must_use]
    pub fn index(mut self, index: IndexNode) -> Self {
        self.add_index(index);
        self
    }

    /// Appends a column, attaching it to this table.
    pub fn add_column(&mut self, mut column: ColumnNode) {
        column.table.clone_from(&self.name);
        if column.is_primary_key && !self.primary_key.contains(&column.name) {
            self.primary_key.push(column.name.clone());
        }
        self.columns.insert(column.name.clone(), column);
    }

    /// Appends an index, attaching it to this table.
    pub fn add_index(&mut self, mut index: IndexNode) {
        index.table.clone_from(&self.name);
        self.indexes.push(index);
    }

    /// Looks up a column.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnNode> {
        self.columns.get(name)
    }

    /// Looks up an index.
    #[must_use]
    pub fn get_index(&self, name: &str) -> Option<&IndexNode> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Returns `true` when the primary key spans several columns.
    #[must_use]
    pub fn has_composite_key(&self) -> bool {
        self.primary_key.len() > 1
    }
}

/// A schema: tables plus the relationships between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaAst {
    /// Tables by name, in insertion order.
    pub tables: IndexMap<String, TableNode>,
    /// Relationships by name.
    pub relationships: IndexMap<String, RelationshipNode>,
}

impl SchemaAst {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a table.
    pub fn add_table(&mut self, table: TableNode) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Looks up a table.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableNode> {
        self.tables.get(name)
    }

    /// Looks up a table mutably.
    pub fn table_mut(&mut self, name: &str) -> Option<&mut TableNode> {
        self.tables.get_mut(name)
    }

    /// Registers a relationship on both of its tables.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownTable`] if either side is missing.
    pub fn add_relationship(&mut self, relationship: RelationshipNode) -> SchemaResult<()> {
        for table in [&relationship.from.table, &relationship.to.table] {
            if !self.tables.contains_key(table) {
                return Err(SchemaError::UnknownTable(table.clone()));
            }
        }
        let name = relationship.name.clone();
        if let Some(from) = self.tables.get_mut(&relationship.from.table) {
            if !from.outgoing.contains(&name) {
                from.outgoing.push(name.clone());
            }
        }
        if let Some(to) = self.tables.get_mut(&relationship.to.table) {
            if !to.incoming.contains(&name) {
                to.incoming.push(name.clone());
            }
        }
        self.relationships.insert(name, relationship);
        Ok(())
    }

    /// Rewrites column types the way `dialect` stores them, so the schema
    /// compares equal to one introspected from that dialect.
    pub fn normalize_types(&mut self, dialect: DialectKind) {
        for column in self.tables.values_mut().flat_map(|table| table.columns.values_mut()) {
            column.column_type = column.column_type.for_dialect(dialect);
        }
    }

    /// Relationships declared on `table` (its foreign keys).
    pub fn outgoing<'a>(&'a self, table: &'a TableNode) -> impl Iterator<Item = &'a RelationshipNode> + 'a {
        table.outgoing.iter().filter_map(|name| self.relationships.get(name))
    }

    /// Relationships referencing `table`.
    pub fn incoming<'a>(&'a self, table: &'a TableNode) -> impl Iterator<Item = &'a RelationshipNode> + 'a {
        table.incoming.iter().filter_map(|name| self.relationships.get(name))
    }

    /// Tables ordered so that referenced tables come before the tables
    /// referencing them. Self-references are ignored; tables caught in a
    /// cycle keep their declaration order at the end.
    #[must_use]
    pub fn sorted_tables(&self) -> Vec<&TableNode> {
        let mut in_degree: IndexMap<&str, usize> = self.tables.keys().map(|name| (name.as_str(), 0)).collect();
        let mut dependents: IndexMap<&str, Vec<&str>> = IndexMap::new();

        for table in self.tables.values() {
            let mut seen = Vec::new();
            for rel in self.outgoing(table) {
                let target = rel.to.table.as_str();
                if target == table.name || seen.contains(&target) || !self.tables.contains_key(target) {
                    continue;
                }
                seen.push(target);
                *in_degree.entry(table.name.as_str()).or_insert(0) += 1;
                dependents.entry(target).or_default().push(table.name.as_str());
            }
        }

        // Kahn's algorithm
        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut result: Vec<&TableNode> = Vec::with_capacity(self.tables.len());

        while let Some(name) = queue.pop_front() {
            if let Some(table) = self.tables.get(name) {
                result.push(table);
            }
            if let Some(deps) = dependents.get(name) {
                for dep in deps {
                    if let Some(deg) = in_degree.get_mut(dep) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(dep);
                        }
                    }
                }
            }
        }

        if result.len() != self.tables.len() {
            for table in self.tables.values() {
                if !result.iter().any(|t| t.name == table.name) {
                    result.push(table);
                }
            }
        }

        result
    }

    /// Number of tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` when the schema has no tables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
