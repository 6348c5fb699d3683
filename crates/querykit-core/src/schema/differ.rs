//! Schema diff engine.
//!
//! Compares a `source` (desired, built from entities) and a `target`
//! (current, introspected) [`SchemaAst`]. Columns, indexes and foreign keys
//! present only in the source are created, those present only in the
//! target are dropped, and matched ones are compared attribute by attribute.
//! Descriptions read `attr: <target> → <source>`.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::ast::{ColumnNode, DefaultValue, IndexNode, RelationshipNode, SchemaAst, TableNode};
use super::canonical::{CanonicalType, TypeCategory};

static TRAILING_CAST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)::[a-z_][a-z0-9_ ]*(\[\])?(\([0-9, ]*\))?$").expect("static regex"));

const TIMESTAMP_SYNONYMS: &[&str] = &[
    "now()",
    "current_timestamp",
    "current_timestamp()",
    "localtimestamp",
    "localtimestamp()",
    "transaction_timestamp()",
    "datetime('now')",
];

// ================================================================
// Public types
// ================================================================

/// Options of [`SchemaAstDiffer::diff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    /// Match table and column names case-insensitively.
    pub ignore_case: bool,
    /// Tables left out of the comparison.
    pub exclude_tables: Vec<String>,
    /// Compare indexes.
    pub compare_indexes: bool,
    /// Compare foreign key relationships.
    pub compare_relationships: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            ignore_case: false,
            exclude_tables: Vec::new(),
            compare_indexes: true,
            compare_relationships: true,
        }
    }
}

/// Kind of a column change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnDiffKind {
    /// Only in the source.
    Add,
    /// Only in the target.
    Drop,
    /// In both, with different attributes.
    Alter,
}

/// Kind of an index or relationship change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    /// Only in the source.
    Create,
    /// Only in the target.
    Drop,
    /// In both, with different attributes.
    Alter,
}

/// A column difference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDiff {
    /// Table name.
    pub table: String,
    /// Column name.
    pub column: String,
    /// What changed.
    #[serde(rename = "type")]
    pub kind: ColumnDiffKind,
    /// The column in the source schema.
    pub source: Option<ColumnNode>,
    /// The column in the target schema.
    pub target: Option<ColumnNode>,
    /// Human-readable summary.
    pub description: String,
}

/// An index difference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDiff {
    /// Table name.
    pub table: String,
    /// Index name.
    pub name: String,
    /// What changed.
    #[serde(rename = "type")]
    pub kind: DiffKind,
    /// The index in the source schema.
    pub source: Option<IndexNode>,
    /// The index in the target schema.
    pub target: Option<IndexNode>,
    /// Human-readable summary.
    pub description: String,
}

/// A foreign key difference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipDiff {
    /// Relationship name.
    pub name: String,
    /// What changed.
    #[serde(rename = "type")]
    pub kind: DiffKind,
    /// The relationship in the source schema.
    pub source: Option<RelationshipNode>,
    /// The relationship in the target schema.
    pub target: Option<RelationshipNode>,
    /// Human-readable summary.
    pub description: String,
}

/// Everything that differs between two schemas.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDiffResult {
    /// Tables to create, referenced tables first.
    pub tables_to_create: Vec<TableNode>,
    /// Tables to drop, referencing tables first.
    pub tables_to_drop: Vec<TableNode>,
    /// Column changes of matched tables.
    pub column_diffs: Vec<ColumnDiff>,
    /// Index changes of matched tables.
    pub index_diffs: Vec<IndexDiff>,
    /// Foreign key changes.
    pub relationship_diffs: Vec<RelationshipDiff>,
}

/// Whether a [`SchemaDiff`] creates or alters its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaDiffKind {
    /// `CREATE TABLE`.
    Create,
    /// `ALTER TABLE`.
    Alter,
}

/// A column changing from its current to its desired definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnChange {
    /// Current definition.
    pub from: ColumnNode,
    /// Desired definition.
    pub to: ColumnNode,
}

/// A table to create together with its foreign keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDefinition {
    /// The table, including its indexes.
    pub table: TableNode,
    /// Foreign keys declared on the table.
    pub foreign_keys: Vec<RelationshipNode>,
}

/// The changes of one table, ready for DDL generation. A `Create` diff
/// carries only `table`; the change lists are set on `Alter` diffs and are
/// `None` when empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDiff {
    /// Table name.
    pub table_name: String,
    /// Create or alter.
    #[serde(rename = "type")]
    pub kind: SchemaDiffKind,
    /// Definition of a created table.
    pub table: Option<TableDefinition>,
    /// Columns to add.
    pub columns_to_add: Option<Vec<ColumnNode>>,
    /// Columns to alter.
    pub columns_to_alter: Option<Vec<ColumnChange>>,
    /// Columns to drop.
    pub columns_to_drop: Option<Vec<ColumnNode>>,
    /// Indexes to create.
    pub indexes_to_add: Option<Vec<IndexNode>>,
    /// Indexes to drop.
    pub indexes_to_drop: Option<Vec<IndexNode>>,
    /// Foreign keys to add.
    pub foreign_keys_to_add: Option<Vec<RelationshipNode>>,
    /// Foreign keys to drop.
    pub foreign_keys_to_drop: Option<Vec<RelationshipNode>>,
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Removes and returns the items assigned to `slot`.
fn take_slot<T>(items: &mut Vec<(usize, T)>, slot: usize) -> Option<Vec<T>> {
    let (mine, rest): (Vec<_>, Vec<_>) = items.drain(..).partition(|(s, _)| *s == slot);
    *items = rest;
    non_empty(mine.into_iter().map(|(_, item)| item).collect())
}

impl SchemaDiff {
    /// A `Create` diff.
    #[must_use]
    pub fn create(table: TableNode, foreign_keys: Vec<RelationshipNode>) -> Self {
        Self {
            table_name: table.name.clone(),
            kind: SchemaDiffKind::Create,
            table: Some(TableDefinition { table, foreign_keys }),
            ..Self::alter(String::new())
        }
    }

    /// An empty `Alter` diff.
    #[must_use]
    pub fn alter(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            kind: SchemaDiffKind::Alter,
            table: None,
            columns_to_add: None,
            columns_to_alter: None,
            columns_to_drop: None,
            indexes_to_add: None,
            indexes_to_drop: None,
            foreign_keys_to_add: None,
            foreign_keys_to_drop: None,
        }
    }

    /// Removes column and index drops.
    #[must_use]
    pub fn without_destructive(mut self) -> Self {
        self.columns_to_drop = None;
        self.indexes_to_drop = None;
        self
    }

    /// Returns `true` when the diff has nothing to apply.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self.kind, SchemaDiffKind::Alter)
            && self.columns_to_add.is_none()
            && self.columns_to_alter.is_none()
            && self.columns_to_drop.is_none()
            && self.indexes_to_add.is_none()
            && self.indexes_to_drop.is_none()
            && self.foreign_keys_to_add.is_none()
            && self.foreign_keys_to_drop.is_none()
    }
}

impl SchemaDiffResult {
    /// Returns `true` if anything differs.
    #[must_use]
    pub fn has_differences(&self) -> bool {
        !(self.tables_to_create.is_empty()
            && self.tables_to_drop.is_empty()
            && self.column_diffs.is_empty()
            && self.index_diffs.is_empty()
            && self.relationship_diffs.is_empty())
    }

    /// Returns `true` if applying the diff drops a table, column, index or
    /// foreign key.
    #[must_use]
    pub fn has_breaking_changes(&self) -> bool {
        !self.tables_to_drop.is_empty()
            || self.column_diffs.iter().any(|d| d.kind == ColumnDiffKind::Drop)
            || self.index_diffs.iter().any(|d| d.kind == DiffKind::Drop)
            || self.relationship_diffs.iter().any(|d| d.kind == DiffKind::Drop)
    }

    /// Groups the differences per table: creates first (in dependency
    /// order), then alters in table order. Dropped tables are not included.
    #[must_use]
    pub fn schema_diffs(&self) -> Vec<SchemaDiff> {
        let created: HashSet<&str> = self.tables_to_create.iter().map(|t| t.name.as_str()).collect();
        let dropped: HashSet<&str> = self.tables_to_drop.iter().map(|t| t.name.as_str()).collect();
        let mut diffs: Vec<SchemaDiff> = Vec::new();

        for table in &self.tables_to_create {
            let foreign_keys = self
                .relationship_diffs
                .iter()
                .filter(|d| d.kind == DiffKind::Create)
                .filter_map(|d| d.source.as_ref())
                .filter(|r| r.from.table == table.name)
                .cloned()
                .collect();
            diffs.push(SchemaDiff::create(table.clone(), foreign_keys));
        }

        let mut alters: Vec<SchemaDiff> = Vec::new();
        let mut alter_for = |table: &str| -> usize {
            if let Some(pos) = alters.iter().position(|d| d.table_name == table) {
                pos
            } else {
                alters.push(SchemaDiff::alter(table));
                alters.len() - 1
            }
        };
        let mut columns_to_add: Vec<(usize, ColumnNode)> = Vec::new();
        let mut columns_to_alter: Vec<(usize, ColumnChange)> = Vec::new();
        let mut columns_to_drop: Vec<(usize, ColumnNode)> = Vec::new();
        let mut indexes_to_add: Vec<(usize, IndexNode)> = Vec::new();
        let mut indexes_to_drop: Vec<(usize, IndexNode)> = Vec::new();
        let mut fks_to_add: Vec<(usize, RelationshipNode)> = Vec::new();
        let mut fks_to_drop: Vec<(usize, RelationshipNode)> = Vec::new();

        for diff in &self.column_diffs {
            let slot = alter_for(&diff.table);
            match (diff.kind, &diff.source, &diff.target) {
                (ColumnDiffKind::Add, Some(source), _) => columns_to_add.push((slot, source.clone())),
                (ColumnDiffKind::Drop, _, Some(target)) => columns_to_drop.push((slot, target.clone())),
                (ColumnDiffKind::Alter, Some(source), Some(target)) => columns_to_alter.push((
                    slot,
                    ColumnChange {
                        from: target.clone(),
                        to: source.clone(),
                    },
                )),
                _ => {}
            }
        }

        for diff in &self.index_diffs {
            let slot = alter_for(&diff.table);
            if matches!(diff.kind, DiffKind::Drop | DiffKind::Alter) {
                if let Some(target) = &diff.target {
                    indexes_to_drop.push((slot, target.clone()));
                }
            }
            if matches!(diff.kind, DiffKind::Create | DiffKind::Alter) {
                if let Some(source) = &diff.source {
                    indexes_to_add.push((slot, source.clone()));
                }
            }
        }

        for diff in &self.relationship_diffs {
            if matches!(diff.kind, DiffKind::Drop | DiffKind::Alter) {
                if let Some(target) = diff.target.as_ref().filter(|r| !dropped.contains(r.from.table.as_str())) {
                    let slot = alter_for(&target.from.table);
                    fks_to_drop.push((slot, target.clone()));
                }
            }
            if matches!(diff.kind, DiffKind::Create | DiffKind::Alter) {
                if let Some(source) = diff.source.as_ref().filter(|r| !created.contains(r.from.table.as_str())) {
                    let slot = alter_for(&source.from.table);
                    fks_to_add.push((slot, source.clone()));
                }
            }
        }

        for (slot, diff) in alters.iter_mut().enumerate() {
            diff.columns_to_add = take_slot(&mut columns_to_add, slot);
            diff.columns_to_alter = take_slot(&mut columns_to_alter, slot);
            diff.columns_to_drop = take_slot(&mut columns_to_drop, slot);
            diff.indexes_to_add = take_slot(&mut indexes_to_add, slot);
            diff.indexes_to_drop = take_slot(&mut indexes_to_drop, slot);
            diff.foreign_keys_to_add = take_slot(&mut fks_to_add, slot);
            diff.foreign_keys_to_drop = take_slot(&mut fks_to_drop, slot);
        }

        diffs.extend(alters.into_iter().filter(|d| !d.is_empty()));
        diffs
    }
}

// ================================================================
// Normalization helpers
// ================================================================

/// Normalizes a default for comparison: trailing casts and quotes are
/// stripped, current-timestamp spellings collapse, numbers compare by
/// value and sequence defaults count as no default. Unquoted `TRUE` and
/// `FALSE` are case-folded, and on boolean columns `1`/`0` read as
/// `true`/`false`.
fn normalize_default(value: Option<&DefaultValue>, boolean: bool) -> Option<String> {
    let text = match value? {
        DefaultValue::Null => return None,
        DefaultValue::Boolean(b) => return Some(b.to_string()),
        DefaultValue::Integer(n) => n.to_string(),
        DefaultValue::Float(f) => f.to_string(),
        DefaultValue::String(s) | DefaultValue::Expression(s) => s.clone(),
    };

    let mut text = text.trim().to_string();
    while TRAILING_CAST.is_match(&text) {
        text = TRAILING_CAST.replace(&text, "").trim().to_string();
    }
    if text.len() >= 2 && text.starts_with('(') && text.ends_with(')') {
        text = text[1..text.len() - 1].trim().to_string();
    }
    match text.to_ascii_lowercase().as_str() {
        "true" => return Some("true".to_string()),
        "false" => return Some("false".to_string()),
        _ => {}
    }
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            text = text[1..text.len() - 1].to_string();
        }
    }

    if boolean {
        match text.as_str() {
            "1" => return Some("true".to_string()),
            "0" => return Some("false".to_string()),
            _ => {}
        }
    }

    let lower = text.to_ascii_lowercase();
    if lower == "null" || lower.starts_with("nextval(") {
        return None;
    }
    if TIMESTAMP_SYNONYMS.contains(&lower.as_str()) || lower.starts_with("current_timestamp(") {
        return Some("current_timestamp".to_string());
    }
    if let Ok(number) = text.parse::<f64>() {
        return Some(number.to_string());
    }
    Some(text)
}

fn display_default(value: Option<&DefaultValue>) -> String {
    match value {
        None | Some(DefaultValue::Null) => "NULL".to_string(),
        Some(DefaultValue::String(s) | DefaultValue::Expression(s)) => s.clone(),
        Some(other) => other.to_sql(),
    }
}

fn types_match(source: &ColumnNode, target: &ColumnNode) -> bool {
    let both_serial = source.is_auto_increment
        && target.is_auto_increment
        && source.column_type.category == TypeCategory::Integer
        && target.column_type.category == TypeCategory::Integer;
    if both_serial {
        return true;
    }
    source.column_type.is_equivalent(&target.column_type)
}

fn fold(name: &str, ignore_case: bool) -> String {
    if ignore_case {
        name.to_lowercase()
    } else {
        name.to_string()
    }
}

fn describe_type(ty: &CanonicalType) -> String {
    ty.to_string()
}

// ================================================================
// Differ
// ================================================================

/// Compares two schemas.
#[derive(Debug, Clone, Default)]
pub struct SchemaAstDiffer {
    options: DiffOptions,
}

impl SchemaAstDiffer {
    /// Creates a differ.
    #[must_use]
    pub const fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    /// Shorthand for `SchemaAstDiffer::new(options).diff(source, target)`.
    #[must_use]
    pub fn diff_with(source: &SchemaAst, target: &SchemaAst, options: DiffOptions) -> SchemaDiffResult {
        Self::new(options).diff(source, target)
    }

    fn is_excluded(&self, table: &str) -> bool {
        let folded = fold(table, self.options.ignore_case);
        self.options
            .exclude_tables
            .iter()
            .any(|t| fold(t, self.options.ignore_case) == folded)
    }

    fn find_table<'s>(&self, schema: &'s SchemaAst, name: &str) -> Option<&'s TableNode> {
        if !self.options.ignore_case {
            return schema.table(name);
        }
        let folded = fold(name, true);
        schema.tables.values().find(|t| fold(&t.name, true) == folded)
    }

    /// Diffs `source` (desired) against `target` (current).
    #[must_use]
    pub fn diff(&self, source: &SchemaAst, target: &SchemaAst) -> SchemaDiffResult {
        let mut result = SchemaDiffResult::default();

        for table in source.sorted_tables() {
            if self.is_excluded(&table.name) {
                continue;
            }
            match self.find_table(target, &table.name) {
                None => result.tables_to_create.push(table.clone()),
                Some(current) => {
                    self.diff_columns(table, current, &mut result);
                    if self.options.compare_indexes {
                        self.diff_indexes(table, current, &mut result);
                    }
                }
            }
        }

        for table in target.sorted_tables().into_iter().rev() {
            if !self.is_excluded(&table.name) && self.find_table(source, &table.name).is_none() {
                result.tables_to_drop.push(table.clone());
            }
        }

        if self.options.compare_relationships {
            self.diff_relationships(source, target, &mut result);
        }

        tracing::debug!(
            create = result.tables_to_create.len(),
            drop = result.tables_to_drop.len(),
            columns = result.column_diffs.len(),
            indexes = result.index_diffs.len(),
            relationships = result.relationship_diffs.len(),
            "schema diff computed"
        );
        result
    }

    fn diff_columns(&self, source: &TableNode, target: &TableNode, result: &mut SchemaDiffResult) {
        let ignore_case = self.options.ignore_case;
        let find = |table: &TableNode, name: &str| -> Option<ColumnNode> {
            let folded = fold(name, ignore_case);
            table.columns.values().find(|c| fold(&c.name, ignore_case) == folded).cloned()
        };

        for column in source.columns.values() {
            match find(target, &column.name) {
                None => result.column_diffs.push(ColumnDiff {
                    table: source.name.clone(),
                    column: column.name.clone(),
                    kind: ColumnDiffKind::Add,
                    source: Some(column.clone()),
                    target: None,
                    description: format!("add {} {}", column.name, describe_type(&column.column_type)),
                }),
                Some(current) => {
                    let changes = Self::column_changes(column, &current);
                    if !changes.is_empty() {
                        result.column_diffs.push(ColumnDiff {
                            table: source.name.clone(),
                            column: column.name.clone(),
                            kind: ColumnDiffKind::Alter,
                            source: Some(column.clone()),
                            target: Some(current),
                            description: changes.join(", "),
                        });
                    }
                }
            }
        }

        for column in target.columns.values() {
            if find(source, &column.name).is_none() {
                result.column_diffs.push(ColumnDiff {
                    table: source.name.clone(),
                    column: column.name.clone(),
                    kind: ColumnDiffKind::Drop,
                    source: None,
                    target: Some(column.clone()),
                    description: format!("drop {}", column.name),
                });
            }
        }
    }

    fn column_changes(source: &ColumnNode, target: &ColumnNode) -> Vec<String> {
        let mut changes = Vec::new();
        if source.nullable != target.nullable {
            changes.push(format!("nullable: {} → {}", target.nullable, source.nullable));
        }
        if source.is_unique != target.is_unique {
            changes.push(format!("unique: {} → {}", target.is_unique, source.is_unique));
        }
        if source.is_auto_increment != target.is_auto_increment {
            changes.push(format!(
                "autoIncrement: {} → {}",
                target.is_auto_increment, source.is_auto_increment
            ));
        }
        if !types_match(source, target) {
            changes.push(format!(
                "type: {} → {}",
                describe_type(&target.column_type),
                describe_type(&source.column_type)
            ));
        }
        let ignore_default = source.is_auto_increment && target.is_auto_increment;
        let boolean = source.column_type.category == TypeCategory::Boolean;
        if !ignore_default
            && normalize_default(source.default_value.as_ref(), boolean)
                != normalize_default(target.default_value.as_ref(), boolean)
        {
            changes.push(format!(
                "default: {} → {}",
                display_default(target.default_value.as_ref()),
                display_default(source.default_value.as_ref())
            ));
        }
        changes
    }

    fn diff_indexes(&self, source: &TableNode, target: &TableNode, result: &mut SchemaDiffResult) {
        let ignore_case = self.options.ignore_case;
        let find = |table: &TableNode, name: &str| -> Option<IndexNode> {
            let folded = fold(name, ignore_case);
            table.indexes.iter().find(|i| fold(&i.name, ignore_case) == folded).cloned()
        };

        for index in &source.indexes {
            match find(target, &index.name) {
                None => result.index_diffs.push(IndexDiff {
                    table: source.name.clone(),
                    name: index.name.clone(),
                    kind: DiffKind::Create,
                    source: Some(index.clone()),
                    target: None,
                    description: format!("create index on ({})", index.columns.join(", ")),
                }),
                Some(current) => {
                    let mut changes = Vec::new();
                    if index.unique != current.unique {
                        changes.push(format!("unique: {} → {}", current.unique, index.unique));
                    }
                    let same_columns = index.columns.len() == current.columns.len()
                        && index
                            .columns
                            .iter()
                            .zip(&current.columns)
                            .all(|(a, b)| fold(a, ignore_case) == fold(b, ignore_case));
                    if !same_columns {
                        changes.push(format!(
                            "columns: ({}) → ({})",
                            current.columns.join(", "),
                            index.columns.join(", ")
                        ));
                    }
                    if index.effective_type() != current.effective_type() {
                        changes.push(format!(
                            "type: {} → {}",
                            current.effective_type().as_sql().to_lowercase(),
                            index.effective_type().as_sql().to_lowercase()
                        ));
                    }
                    if !changes.is_empty() {
                        result.index_diffs.push(IndexDiff {
                            table: source.name.clone(),
                            name: index.name.clone(),
                            kind: DiffKind::Alter,
                            source: Some(index.clone()),
                            target: Some(current),
                            description: changes.join(", "),
                        });
                    }
                }
            }
        }

        for index in &target.indexes {
            if find(source, &index.name).is_none() {
                result.index_diffs.push(IndexDiff {
                    table: source.name.clone(),
                    name: index.name.clone(),
                    kind: DiffKind::Drop,
                    source: None,
                    target: Some(index.clone()),
                    description: format!("drop index on ({})", index.columns.join(", ")),
                });
            }
        }
    }

    fn diff_relationships(&self, source: &SchemaAst, target: &SchemaAst, result: &mut SchemaDiffResult) {
        let ignore_case = self.options.ignore_case;
        let find = |schema: &SchemaAst, name: &str| -> Option<RelationshipNode> {
            let folded = fold(name, ignore_case);
            schema
                .relationships
                .values()
                .find(|r| fold(&r.name, ignore_case) == folded)
                .cloned()
        };
        let excluded = |rel: &RelationshipNode| self.is_excluded(&rel.from.table);

        for rel in source.relationships.values().filter(|r| !excluded(r)) {
            match find(target, &rel.name) {
                None => result.relationship_diffs.push(RelationshipDiff {
                    name: rel.name.clone(),
                    kind: DiffKind::Create,
                    source: Some(rel.clone()),
                    target: None,
                    description: format!(
                        "create {}({}) → {}({})",
                        rel.from.table,
                        rel.from.columns.join(", "),
                        rel.to.table,
                        rel.to.columns.join(", ")
                    ),
                }),
                Some(current) => {
                    let mut changes = Vec::new();
                    if rel.delete_action() != current.delete_action() {
                        changes.push(format!("onDelete: {} → {}", current.delete_action(), rel.delete_action()));
                    }
                    if rel.update_action() != current.update_action() {
                        changes.push(format!("onUpdate: {} → {}", current.update_action(), rel.update_action()));
                    }
                    let same_target = fold(&rel.to.table, ignore_case) == fold(&current.to.table, ignore_case)
                        && rel.to.columns == current.to.columns
                        && rel.from.columns == current.from.columns;
                    if !same_target {
                        changes.push(format!(
                            "references: {}({}) → {}({})",
                            current.to.table,
                            current.to.columns.join(", "),
                            rel.to.table,
                            rel.to.columns.join(", ")
                        ));
                    }
                    if !changes.is_empty() {
                        result.relationship_diffs.push(RelationshipDiff {
                            name: rel.name.clone(),
                            kind: DiffKind::Alter,
                            source: Some(rel.clone()),
                            target: Some(current),
                            description: changes.join(", "),
                        });
                    }
                }
            }
        }

        for rel in target.relationships.values().filter(|r| !excluded(r)) {
            if find(source, &rel.name).is_none() {
                result.relationship_diffs.push(RelationshipDiff {
                    name: rel.name.clone(),
                    kind: DiffKind::Drop,
                    source: None,
                    target: Some(rel.clone()),
                    description: format!("drop {}({})", rel.from.table, rel.from.columns.join(", ")),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKeyAction, IndexType, RelationEndpoint};

    fn users() -> TableNode {
        TableNode::new("users")
            .column(ColumnNode::new("id", CanonicalType::integer()).primary_key().auto_increment())
            .column(ColumnNode::new("name", CanonicalType::varchar(255)).not_null())
    }

    fn schema(tables: Vec<TableNode>) -> SchemaAst {
        let mut schema = SchemaAst::new();
        for table in tables {
            schema.add_table(table);
        }
        schema
    }

    #[test]
    fn test_identical_schemas_have_no_differences() {
        let s = schema(vec![users()]);
        let result = SchemaAstDiffer::default().diff(&s, &s);
        assert!(!result.has_differences());
        assert!(result.schema_diffs().is_empty());
    }

    #[test]
    fn test_added_column_is_not_breaking() {
        let source = schema(vec![users().column(ColumnNode::new("email", CanonicalType::varchar(255)))]);
        let target = schema(vec![users()]);
        let result = SchemaAstDiffer::default().diff(&source, &target);
        assert_eq!(result.column_diffs.len(), 1);
        assert_eq!(result.column_diffs[0].column, "email");
        assert_eq!(result.column_diffs[0].kind, ColumnDiffKind::Add);
        assert!(!result.has_breaking_changes());
    }

    #[test]
    fn test_missing_column_is_dropped_and_breaking() {
        let source = schema(vec![users()]);
        let target = schema(vec![users().column(ColumnNode::new("email", CanonicalType::varchar(255)))]);
        let result = SchemaAstDiffer::default().diff(&source, &target);
        assert_eq!(result.column_diffs.len(), 1);
        assert_eq!(result.column_diffs[0].column, "email");
        assert_eq!(result.column_diffs[0].kind, ColumnDiffKind::Drop);
        assert!(result.has_breaking_changes());
    }

    #[test]
    fn test_altered_column_describes_every_change() {
        let source = schema(vec![users().column(
            ColumnNode::new("price", CanonicalType::decimal(8, 2)).default_value(DefaultValue::Integer(30)),
        )]);
        let target = schema(vec![users().column(
            ColumnNode::new("price", CanonicalType::decimal(10, 2).with_unsigned())
                .unique()
                .default_value(DefaultValue::String("20".into())),
        )]);
        let result = SchemaAstDiffer::default().diff(&source, &target);
        assert_eq!(result.column_diffs.len(), 1);
        let diff = &result.column_diffs[0];
        assert_eq!(diff.kind, ColumnDiffKind::Alter);
        assert_eq!(
            diff.description,
            "unique: true → false, type: decimal(10,2) unsigned → decimal(8,2), default: 20 → 30"
        );
    }

    #[test]
    fn test_equivalent_spellings_are_equal() {
        let source = schema(vec![users().column(
            ColumnNode::new("createdAt", CanonicalType::timestamp())
                .default_value(DefaultValue::Expression("CURRENT_TIMESTAMP".into())),
        )
        .column(ColumnNode::new("qty", CanonicalType::integer()).default_value(DefaultValue::Integer(1)))]);
        let target = schema(vec![users().column(
            ColumnNode::new("createdAt", CanonicalType::parse("timestamp without time zone"))
                .default_value(DefaultValue::Expression("now()".into())),
        )
        .column(ColumnNode::new("qty", CanonicalType::parse("INTEGER")).default_value(DefaultValue::String("'1'::integer".into())))]);
        let result = SchemaAstDiffer::default().diff(&source, &target);
        assert!(!result.has_differences(), "{:?}", result.column_diffs);
    }

    #[test]
    fn test_serial_size_is_ignored() {
        let source = schema(vec![users()]);
        let target = schema(vec![TableNode::new("users")
            .column(
                ColumnNode::new("id", CanonicalType::big_integer())
                    .primary_key()
                    .auto_increment()
                    .default_value(DefaultValue::Expression("nextval('users_id_seq'::regclass)".into())),
            )
            .column(ColumnNode::new("name", CanonicalType::varchar(255)).not_null())]);
        assert!(!SchemaAstDiffer::default().diff(&source, &target).has_differences());
    }

    #[test]
    fn test_tables_created_in_dependency_order_and_dropped() {
        let mut source = schema(vec![
            TableNode::new("posts")
                .column(ColumnNode::new("id", CanonicalType::integer()).primary_key())
                .column(ColumnNode::new("userId", CanonicalType::integer())),
            users(),
        ]);
        source
            .add_relationship(RelationshipNode::new(
                "fk_posts_userId",
                RelationEndpoint::new("posts", ["userId"]),
                RelationEndpoint::new("users", ["id"]),
            ))
            .unwrap();
        let target = schema(vec![TableNode::new("legacy")
            .column(ColumnNode::new("id", CanonicalType::integer()).primary_key())]);

        let result = SchemaAstDiffer::default().diff(&source, &target);
        let created: Vec<&str> = result.tables_to_create.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(created, ["users", "posts"]);
        assert_eq!(result.tables_to_drop[0].name, "legacy");
        assert!(result.has_breaking_changes());

        let diffs = result.schema_diffs();
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[1].kind, SchemaDiffKind::Create);
        let posts = diffs[1].table.as_ref().unwrap();
        assert_eq!(posts.foreign_keys.len(), 1);
    }

    #[test]
    fn test_excluded_and_case_folded_tables() {
        let source = schema(vec![users(), TableNode::new("audit")]);
        let target = schema(vec![TableNode::new("USERS")
            .column(ColumnNode::new("ID", CanonicalType::integer()).primary_key().auto_increment())
            .column(ColumnNode::new("NAME", CanonicalType::varchar(255)).not_null())]);
        let options = DiffOptions {
            ignore_case: true,
            exclude_tables: vec!["audit".into()],
            ..DiffOptions::default()
        };
        assert!(!SchemaAstDiffer::diff_with(&source, &target, options).has_differences());
    }

    #[test]
    fn test_index_changes() {
        let source = schema(vec![users()
            .index(IndexNode::new("idx_users_name", ["name"]).unique())
            .index(IndexNode::new("idx_users_new", ["name"]))]);
        let target = schema(vec![users()
            .index(IndexNode::new("idx_users_name", ["name"]).index_type(IndexType::Hash))
            .index(IndexNode::new("idx_users_old", ["name"]).from_database())]);
        let result = SchemaAstDiffer::default().diff(&source, &target);
        let kinds: Vec<(&str, DiffKind)> = result.index_diffs.iter().map(|d| (d.name.as_str(), d.kind)).collect();
        assert_eq!(
            kinds,
            [
                ("idx_users_name", DiffKind::Alter),
                ("idx_users_new", DiffKind::Create),
                ("idx_users_old", DiffKind::Drop)
            ]
        );
        assert_eq!(result.index_diffs[0].description, "unique: false → true, type: hash → btree");

        let diffs = result.schema_diffs();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].indexes_to_add.as_ref().unwrap().len(), 2);
        assert_eq!(diffs[0].indexes_to_drop.as_ref().unwrap().len(), 2);
        let safe = diffs[0].clone().without_destructive();
        assert!(safe.indexes_to_drop.is_none());
    }

    #[test]
    fn test_relationship_actions_default_to_no_action() {
        let posts = || {
            TableNode::new("posts")
                .column(ColumnNode::new("id", CanonicalType::integer()).primary_key())
                .column(ColumnNode::new("userId", CanonicalType::integer()))
        };
        let fk = || {
            RelationshipNode::new(
                "fk_posts_userId",
                RelationEndpoint::new("posts", ["userId"]),
                RelationEndpoint::new("users", ["id"]),
            )
        };
        let mut source = schema(vec![users(), posts()]);
        source.add_relationship(fk()).unwrap();
        let mut target = schema(vec![users(), posts()]);
        target.add_relationship(fk().on_delete(ForeignKeyAction::NoAction)).unwrap();
        assert!(!SchemaAstDiffer::default().diff(&source, &target).has_differences());

        let mut changed = schema(vec![users(), posts()]);
        changed.add_relationship(fk().on_delete(ForeignKeyAction::Cascade)).unwrap();
        let result = SchemaAstDiffer::default().diff(&changed, &target);
        assert_eq!(result.relationship_diffs.len(), 1);
        assert_eq!(result.relationship_diffs[0].description, "onDelete: NO ACTION → CASCADE");
        let diffs = result.schema_diffs();
        assert_eq!(diffs[0].foreign_keys_to_drop.as_ref().unwrap().len(), 1);
        assert_eq!(diffs[0].foreign_keys_to_add.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_default_normalization() {
        let n = |v: DefaultValue| normalize_default(Some(&v), false);
        assert_eq!(n(DefaultValue::String("'abc'::character varying".into())), Some("abc".into()));
        assert_eq!(n(DefaultValue::Expression("now()".into())), n(DefaultValue::Expression("CURRENT_TIMESTAMP".into())));
        assert_eq!(n(DefaultValue::String("20.50".into())), n(DefaultValue::Float(20.5)));
        assert_eq!(n(DefaultValue::Expression("NULL::character varying".into())), None);
        assert_eq!(normalize_default(None, false), None);
    }

    #[test]
    fn test_boolean_defaults_match_introspected_spellings() {
        let b = |v: DefaultValue| normalize_default(Some(&v), true);
        assert_eq!(b(DefaultValue::Boolean(true)), b(DefaultValue::Expression("TRUE".into())));
        assert_eq!(b(DefaultValue::Boolean(false)), b(DefaultValue::Expression("'0'".into())));
        assert_eq!(b(DefaultValue::Boolean(true)), b(DefaultValue::Expression("1".into())));
        assert_ne!(
            normalize_default(Some(&DefaultValue::Integer(1)), false),
            normalize_default(Some(&DefaultValue::Boolean(true)), false)
        );

        let source =
            users().column(ColumnNode::new("active", CanonicalType::boolean()).default_value(DefaultValue::Boolean(true)));
        let target = users().column(
            ColumnNode::new("active", CanonicalType::parse("BOOLEAN")).default_value(DefaultValue::Expression("TRUE".into())),
        );
        let result = SchemaAstDiffer::diff_with(&schema(vec![source]), &schema(vec![target]), DiffOptions::default());
        assert!(!result.has_differences());
    }
}
