//! DDL generation.
//!
//! [`SchemaGenerator`] renders [`SchemaDiff`]s and individual schema
//! operations for one dialect, driven by that dialect's
//! [`DialectFeatures`].

use super::ast::{ColumnNode, IndexNode, IndexType, RelationshipNode, TableNode};
use super::canonical::{canonical_to_sql, IntegerSize};
use super::differ::{ColumnChange, SchemaDiff, SchemaDiffKind};
use crate::dialect::DialectKind;
use crate::error::{SchemaError, SchemaResult};

/// Prefix of the comment emitted in down migrations when a drop cannot be
/// reversed without data loss.
pub const MANUAL_REVERSAL_MARKER: &str = "-- TODO: Manual reversal needed";

/// How an auto-increment primary key is spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialPrimaryKey {
    /// `SERIAL`/`BIGSERIAL` pseudo-types.
    Serial,
    /// `<type> NOT NULL AUTO_INCREMENT PRIMARY KEY`.
    AutoIncrement,
    /// `INTEGER PRIMARY KEY AUTOINCREMENT`.
    IntegerAutoincrement,
}

/// What a dialect supports in DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectFeatures {
    /// The dialect.
    pub kind: DialectKind,
    /// Identifier quote character.
    pub quote_char: char,
    /// Auto-increment primary key spelling.
    pub serial_primary_key: SerialPrimaryKey,
    /// `CREATE TABLE IF NOT EXISTS`.
    pub table_if_not_exists: bool,
    /// `CREATE INDEX IF NOT EXISTS`.
    pub index_if_not_exists: bool,
    /// `DROP TABLE ... CASCADE`.
    pub drop_cascade: bool,
    /// Foreign keys can be added or dropped after table creation.
    pub alter_foreign_keys: bool,
    /// Inline `COMMENT '...'` on columns.
    pub column_comments: bool,
    /// Suffix appended to `CREATE TABLE`.
    pub table_options: Option<&'static str>,
}

const POSTGRES_FEATURES: DialectFeatures = DialectFeatures {
    kind: DialectKind::Postgres,
    quote_char: '"',
    serial_primary_key: SerialPrimaryKey::Serial,
    table_if_not_exists: true,
    index_if_not_exists: true,
    drop_cascade: true,
    alter_foreign_keys: true,
    column_comments: false,
    table_options: None,
};

const MYSQL_FEATURES: DialectFeatures = DialectFeatures {
    kind: DialectKind::MySql,
    quote_char: '`',
    serial_primary_key: SerialPrimaryKey::AutoIncrement,
    table_if_not_exists: true,
    index_if_not_exists: false,
    drop_cascade: false,
    alter_foreign_keys: true,
    column_comments: true,
    table_options: Some(" ENGINE=InnoDB"),
};

const MARIADB_FEATURES: DialectFeatures = DialectFeatures {
    kind: DialectKind::MariaDb,
    index_if_not_exists: true,
    ..MYSQL_FEATURES
};

const SQLITE_FEATURES: DialectFeatures = DialectFeatures {
    kind: DialectKind::Sqlite,
    quote_char: '"',
    serial_primary_key: SerialPrimaryKey::IntegerAutoincrement,
    table_if_not_exists: true,
    index_if_not_exists: true,
    drop_cascade: false,
    alter_foreign_keys: false,
    column_comments: false,
    table_options: None,
};

impl DialectKind {
    /// DDL capabilities of this dialect.
    #[must_use]
    pub const fn features(self) -> &'static DialectFeatures {
        match self {
            Self::Postgres => &POSTGRES_FEATURES,
            Self::MySql => &MYSQL_FEATURES,
            Self::MariaDb => &MARIADB_FEATURES,
            Self::Sqlite => &SQLITE_FEATURES,
        }
    }
}

/// Renders DDL for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct SchemaGenerator {
    features: &'static DialectFeatures,
    if_not_exists: bool,
}

impl SchemaGenerator {
    /// Creates a generator for `kind`.
    #[must_use]
    pub const fn new(kind: DialectKind) -> Self {
        Self {
            features: kind.features(),
            if_not_exists: false,
        }
    }

    /// Emits `IF NOT EXISTS` on creates where the dialect supports it.
    #[must_use]
    pub const fn if_not_exists(mut self, enabled: bool) -> Self {
        self.if_not_exists = enabled;
        self
    }

    /// The dialect.
    #[must_use]
    pub const fn kind(&self) -> DialectKind {
        self.features.kind
    }

    /// The dialect's DDL capabilities.
    #[must_use]
    pub const fn features(&self) -> &'static DialectFeatures {
        self.features
    }

    fn quote(&self, id: &str) -> String {
        let q = self.features.quote_char;
        format!("{q}{}{q}", id.replace(q, &format!("{q}{q}")))
    }

    fn quote_list(&self, ids: &[String]) -> String {
        ids.iter().map(|id| self.quote(id)).collect::<Vec<_>>().join(", ")
    }

    const fn is_mysql_like(&self) -> bool {
        matches!(self.features.kind, DialectKind::MySql | DialectKind::MariaDb)
    }

    fn unsupported(&self, operation: &str, table: &str, column: &str) -> SchemaError {
        SchemaError::Unsupported {
            dialect: self.kind().to_string(),
            operation: operation.to_string(),
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    // ================================================================
    // Diffs
    // ================================================================

    /// Statements applying `diff`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Unsupported`] for column alterations the
    /// dialect cannot express.
    pub fn generate(&self, diff: &SchemaDiff) -> SchemaResult<Vec<String>> {
        match (diff.kind, &diff.table) {
            (SchemaDiffKind::Create, Some(def)) => Ok(self.generate_create_table(&def.table, &def.foreign_keys)),
            (SchemaDiffKind::Create, None) => Err(SchemaError::UnknownTable(diff.table_name.clone())),
            (SchemaDiffKind::Alter, _) => self.generate_alter_table(diff),
        }
    }

    /// Statements reverting `diff`.
    ///
    /// # Errors
    ///
    /// Same as [`SchemaGenerator::generate`].
    pub fn generate_down(&self, diff: &SchemaDiff) -> SchemaResult<Vec<String>> {
        match diff.kind {
            SchemaDiffKind::Create => Ok(vec![self.generate_drop_table(&diff.table_name, true, false)]),
            SchemaDiffKind::Alter => self.generate_alter_table_down(diff),
        }
    }

    /// `ALTER TABLE` statements in dependency-safe order: foreign keys and
    /// indexes are dropped first, columns added, altered and dropped, then
    /// indexes and foreign keys created.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Unsupported`] when a column cannot be altered.
    pub fn generate_alter_table(&self, diff: &SchemaDiff) -> SchemaResult<Vec<String>> {
        let table = diff.table_name.as_str();
        let mut statements = Vec::new();

        for fk in diff.foreign_keys_to_drop.iter().flatten() {
            statements.push(self.generate_drop_foreign_key(fk));
        }
        for index in diff.indexes_to_drop.iter().flatten() {
            statements.push(self.generate_drop_index(index));
        }
        for column in diff.columns_to_add.iter().flatten() {
            statements.push(self.generate_add_column(table, column));
        }
        for change in diff.columns_to_alter.iter().flatten() {
            statements.extend(self.generate_alter_column(table, change)?);
        }
        for column in diff.columns_to_drop.iter().flatten() {
            statements.push(self.generate_drop_column(table, &column.name));
        }
        for index in diff.indexes_to_add.iter().flatten() {
            statements.push(self.generate_create_index(index));
        }
        for fk in diff.foreign_keys_to_add.iter().flatten() {
            statements.push(self.generate_add_foreign_key(fk));
        }
        Ok(statements)
    }

    /// Inverse of [`SchemaGenerator::generate_alter_table`]. Re-created
    /// columns and indexes are preceded by a [`MANUAL_REVERSAL_MARKER`]
    /// comment since their data or exact definition may be lost.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Unsupported`] when a column cannot be altered.
    pub fn generate_alter_table_down(&self, diff: &SchemaDiff) -> SchemaResult<Vec<String>> {
        let table = diff.table_name.as_str();
        let mut statements = Vec::new();

        for fk in diff.foreign_keys_to_add.iter().flatten() {
            statements.push(self.generate_drop_foreign_key(fk));
        }
        for index in diff.indexes_to_add.iter().flatten() {
            statements.push(self.generate_drop_index(index));
        }
        for column in diff.columns_to_drop.iter().flatten() {
            statements.push(format!(
                "{MANUAL_REVERSAL_MARKER}: data of dropped column {}.{} cannot be restored",
                self.quote(table),
                self.quote(&column.name)
            ));
            statements.push(self.generate_add_column(table, column));
        }
        for change in diff.columns_to_alter.iter().flatten().rev() {
            let reverted = ColumnChange {
                from: change.to.clone(),
                to: change.from.clone(),
            };
            statements.extend(self.generate_alter_column(table, &reverted)?);
        }
        for column in diff.columns_to_add.iter().flatten() {
            statements.push(self.generate_drop_column(table, &column.name));
        }
        for index in diff.indexes_to_drop.iter().flatten() {
            statements.push(format!(
                "{MANUAL_REVERSAL_MARKER}: dropped index {} is recreated from its last known definition",
                self.quote(&index.name)
            ));
            statements.push(self.generate_create_index(index));
        }
        for fk in diff.foreign_keys_to_drop.iter().flatten() {
            statements.push(self.generate_add_foreign_key(fk));
        }
        Ok(statements)
    }

    // ================================================================
    // Tables
    // ================================================================

    /// `CREATE TABLE` followed by one `CREATE INDEX` per index.
    #[must_use]
    pub fn generate_create_table(&self, table: &TableNode, foreign_keys: &[RelationshipNode]) -> Vec<String> {
        let composite = table.has_composite_key();
        let mut parts: Vec<String> = table
            .columns
            .values()
            .map(|column| self.generate_column_definition(column, column.is_primary_key && !composite))
            .collect();
        if composite {
            parts.push(format!("PRIMARY KEY ({})", self.quote_list(&table.primary_key)));
        }
        for fk in foreign_keys {
            parts.push(self.foreign_key_constraint(fk));
        }

        let if_not_exists = if self.if_not_exists && self.features.table_if_not_exists {
            "IF NOT EXISTS "
        } else {
            ""
        };
        let mut sql = format!(
            "CREATE TABLE {if_not_exists}{} ({})",
            self.quote(&table.name),
            parts.join(", ")
        );
        if let Some(options) = self.features.table_options {
            sql.push_str(options);
        }
        if let (true, Some(comment)) = (self.features.column_comments, &table.comment) {
            sql.push_str(&format!(" COMMENT='{}'", comment.replace('\'', "''")));
        }

        let mut statements = vec![sql];
        statements.extend(table.indexes.iter().map(|index| self.generate_create_index(index)));
        statements
    }

    /// `DROP TABLE [IF EXISTS] t [CASCADE]`; `CASCADE` only where supported.
    #[must_use]
    pub fn generate_drop_table(&self, table: &str, if_exists: bool, cascade: bool) -> String {
        let mut sql = String::from("DROP TABLE ");
        if if_exists {
            sql.push_str("IF EXISTS ");
        }
        sql.push_str(&self.quote(table));
        if cascade && self.features.drop_cascade {
            sql.push_str(" CASCADE");
        }
        sql
    }

    /// `ALTER TABLE a RENAME TO b`.
    #[must_use]
    pub fn generate_rename_table(&self, from: &str, to: &str) -> String {
        format!("ALTER TABLE {} RENAME TO {}", self.quote(from), self.quote(to))
    }

    // ================================================================
    // Columns
    // ================================================================

    /// Column definition as used by `CREATE TABLE` and `ADD COLUMN`.
    /// `inline_primary_key` renders the single-column primary key inline.
    #[must_use]
    pub fn generate_column_definition(&self, column: &ColumnNode, inline_primary_key: bool) -> String {
        let name = self.quote(&column.name);
        let size = column.column_type.size.unwrap_or(IntegerSize::Regular);
        let serial = matches!(self.features.serial_primary_key, SerialPrimaryKey::Serial) && column.is_auto_increment;
        let ty = if serial {
            match size {
                IntegerSize::Big => "BIGSERIAL".to_string(),
                IntegerSize::Tiny | IntegerSize::Small => "SMALLSERIAL".to_string(),
                IntegerSize::Medium | IntegerSize::Regular => "SERIAL".to_string(),
            }
        } else {
            canonical_to_sql(&column.column_type, self.kind())
        };

        if column.is_auto_increment && inline_primary_key {
            match self.features.serial_primary_key {
                SerialPrimaryKey::Serial => return format!("{name} {ty} PRIMARY KEY"),
                SerialPrimaryKey::IntegerAutoincrement => return format!("{name} INTEGER PRIMARY KEY AUTOINCREMENT"),
                SerialPrimaryKey::AutoIncrement => {}
            }
        }

        let mut sql = format!("{name} {ty}");
        if !column.nullable && !(inline_primary_key && !self.is_mysql_like()) {
            sql.push_str(" NOT NULL");
        }
        if column.is_unique && !inline_primary_key {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = column.default_value.as_ref().filter(|_| !serial) {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default.to_sql());
        }
        if column.is_auto_increment && self.features.serial_primary_key == SerialPrimaryKey::AutoIncrement {
            sql.push_str(" AUTO_INCREMENT");
        }
        if inline_primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if let (true, Some(comment)) = (self.features.column_comments, &column.comment) {
            sql.push_str(&format!(" COMMENT '{}'", comment.replace('\'', "''")));
        }
        sql
    }

    /// `ALTER TABLE t ADD COLUMN <definition>`.
    #[must_use]
    pub fn generate_add_column(&self, table: &str, column: &ColumnNode) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote(table),
            self.generate_column_definition(column, false)
        )
    }

    /// `ALTER TABLE t DROP COLUMN c`.
    #[must_use]
    pub fn generate_drop_column(&self, table: &str, column: &str) -> String {
        format!("ALTER TABLE {} DROP COLUMN {}", self.quote(table), self.quote(column))
    }

    /// `ALTER TABLE t RENAME COLUMN a TO b`.
    #[must_use]
    pub fn generate_rename_column(&self, table: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote(table),
            self.quote(from),
            self.quote(to)
        )
    }

    /// Statements changing a column to `change.to`. PostgreSQL gets one
    /// statement each for type, nullability and default; MySQL and MariaDB
    /// a single `MODIFY COLUMN`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Unsupported`] on SQLite, which cannot alter
    /// columns in place.
    pub fn generate_alter_column(&self, table: &str, change: &ColumnChange) -> SchemaResult<Vec<String>> {
        let (from, to) = (&change.from, &change.to);
        let quoted_table = self.quote(table);
        let column = self.quote(&to.name);

        match self.kind() {
            DialectKind::Postgres => {
                let prefix = format!("ALTER TABLE {quoted_table} ALTER COLUMN {column}");
                let mut statements = vec![
                    format!("{prefix} TYPE {}", canonical_to_sql(&to.column_type, self.kind())),
                    if to.nullable {
                        format!("{prefix} DROP NOT NULL")
                    } else {
                        format!("{prefix} SET NOT NULL")
                    },
                    match &to.default_value {
                        Some(default) => format!("{prefix} SET DEFAULT {}", default.to_sql()),
                        None => format!("{prefix} DROP DEFAULT"),
                    },
                ];
                let constraint = self.quote(&format!("{table}_{}_key", to.name));
                if to.is_unique && !from.is_unique {
                    statements.push(format!("ALTER TABLE {quoted_table} ADD CONSTRAINT {constraint} UNIQUE ({column})"));
                } else if from.is_unique && !to.is_unique {
                    statements.push(format!("ALTER TABLE {quoted_table} DROP CONSTRAINT {constraint}"));
                }
                Ok(statements)
            }
            DialectKind::MySql | DialectKind::MariaDb => {
                let mut statements = Vec::new();
                if from.is_unique && !to.is_unique {
                    statements.push(format!("ALTER TABLE {quoted_table} DROP INDEX {column}"));
                }
                let mut target = to.clone();
                target.is_unique = to.is_unique && !from.is_unique;
                statements.push(format!(
                    "ALTER TABLE {quoted_table} MODIFY COLUMN {}",
                    self.generate_column_definition(&target, false)
                ));
                Ok(statements)
            }
            DialectKind::Sqlite => Err(self.unsupported("ALTER COLUMN", table, &to.name)),
        }
    }

    // ================================================================
    // Indexes
    // ================================================================

    /// `CREATE [UNIQUE] INDEX`, with the index method where it is not the
    /// default B-tree.
    #[must_use]
    pub fn generate_create_index(&self, index: &IndexNode) -> String {
        let index_type = index.effective_type();
        let kind = if index.unique {
            "UNIQUE "
        } else if self.is_mysql_like() && index_type == IndexType::Fulltext {
            "FULLTEXT "
        } else {
            ""
        };
        let if_not_exists = if self.if_not_exists && self.features.index_if_not_exists {
            "IF NOT EXISTS "
        } else {
            ""
        };
        let head = format!(
            "CREATE {kind}INDEX {if_not_exists}{} ON {}",
            self.quote(&index.name),
            self.quote(&index.table)
        );
        let columns = self.quote_list(&index.columns);

        match self.kind() {
            DialectKind::Postgres if index_type != IndexType::Btree && index_type != IndexType::Fulltext => {
                format!("{head} USING {} ({columns})", index_type.as_sql())
            }
            DialectKind::MySql | DialectKind::MariaDb if index_type == IndexType::Hash => {
                format!("{head} ({columns}) USING HASH")
            }
            _ => format!("{head} ({columns})"),
        }
    }

    /// `DROP INDEX`; MySQL-compatible servers need the table.
    #[must_use]
    pub fn generate_drop_index(&self, index: &IndexNode) -> String {
        if self.is_mysql_like() {
            format!("DROP INDEX {} ON {}", self.quote(&index.name), self.quote(&index.table))
        } else {
            format!("DROP INDEX IF EXISTS {}", self.quote(&index.name))
        }
    }

    // ================================================================
    // Foreign keys
    // ================================================================

    fn foreign_key_constraint(&self, fk: &RelationshipNode) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.quote(&fk.name),
            self.quote_list(&fk.from.columns),
            self.quote(&fk.to.table),
            self.quote_list(&fk.to.columns),
            fk.delete_action().as_sql(),
            fk.update_action().as_sql()
        )
    }

    /// `ALTER TABLE t ADD CONSTRAINT ... FOREIGN KEY`. On SQLite, which
    /// cannot alter constraints, a `--` comment is returned instead.
    #[must_use]
    pub fn generate_add_foreign_key(&self, fk: &RelationshipNode) -> String {
        if !self.features.alter_foreign_keys {
            return format!(
                "-- {} cannot add foreign key {} to existing table {}; recreate the table",
                self.kind(),
                self.quote(&fk.name),
                self.quote(&fk.from.table)
            );
        }
        format!(
            "ALTER TABLE {} ADD {}",
            self.quote(&fk.from.table),
            self.foreign_key_constraint(fk)
        )
    }

    /// Drops a foreign key constraint; a `--` comment on SQLite.
    #[must_use]
    pub fn generate_drop_foreign_key(&self, fk: &RelationshipNode) -> String {
        let table = self.quote(&fk.from.table);
        let name = self.quote(&fk.name);
        match self.kind() {
            DialectKind::MySql | DialectKind::MariaDb => format!("ALTER TABLE {table} DROP FOREIGN KEY {name}"),
            DialectKind::Postgres => format!("ALTER TABLE {table} DROP CONSTRAINT {name}"),
            DialectKind::Sqlite => format!(
                "-- {} cannot drop foreign key {name} from existing table {table}; recreate the table",
                self.kind()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CanonicalType, DefaultValue, ForeignKeyAction, RelationEndpoint};

    fn items() -> TableNode {
        TableNode::new("items")
            .column(ColumnNode::new("id", CanonicalType::integer()).primary_key().auto_increment())
            .column(ColumnNode::new("name", CanonicalType::varchar(100)).not_null().unique())
            .column(ColumnNode::new("price", CanonicalType::decimal(10, 2)).default_value(DefaultValue::Integer(0)))
            .column(ColumnNode::new("taxId", CanonicalType::integer()))
            .index(IndexNode::new("idx_items_taxId", ["taxId"]))
    }

    fn tax_fk() -> RelationshipNode {
        RelationshipNode::new(
            "fk_items_taxId",
            RelationEndpoint::new("items", ["taxId"]),
            RelationEndpoint::new("taxes", ["id"]),
        )
        .on_delete(ForeignKeyAction::Cascade)
    }

    #[test]
    fn test_create_table_postgres() {
        let statements = SchemaGenerator::new(DialectKind::Postgres).generate_create_table(&items(), &[tax_fk()]);
        assert_eq!(
            statements,
            [
                "CREATE TABLE \"items\" (\"id\" SERIAL PRIMARY KEY, \"name\" VARCHAR(100) NOT NULL UNIQUE, \
                 \"price\" DECIMAL(10,2) DEFAULT 0, \"taxId\" INTEGER, CONSTRAINT \"fk_items_taxId\" FOREIGN KEY \
                 (\"taxId\") REFERENCES \"taxes\" (\"id\") ON DELETE CASCADE ON UPDATE NO ACTION)",
                "CREATE INDEX \"idx_items_taxId\" ON \"items\" (\"taxId\")",
            ]
        );
    }

    #[test]
    fn test_create_table_mysql() {
        let statements = SchemaGenerator::new(DialectKind::MySql).generate_create_table(&items(), &[]);
        assert_eq!(
            statements[0],
            "CREATE TABLE `items` (`id` INT NOT NULL AUTO_INCREMENT PRIMARY KEY, `name` VARCHAR(100) NOT NULL UNIQUE, \
             `price` DECIMAL(10,2) DEFAULT 0, `taxId` INT) ENGINE=InnoDB"
        );
    }

    #[test]
    fn test_create_table_sqlite() {
        let statements = SchemaGenerator::new(DialectKind::Sqlite)
            .if_not_exists(true)
            .generate_create_table(&items(), &[]);
        assert_eq!(
            statements,
            [
                "CREATE TABLE IF NOT EXISTS \"items\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"name\" VARCHAR(100) \
                 NOT NULL UNIQUE, \"price\" DECIMAL(10,2) DEFAULT 0, \"taxId\" INTEGER)",
                "CREATE INDEX IF NOT EXISTS \"idx_items_taxId\" ON \"items\" (\"taxId\")",
            ]
        );
    }

    #[test]
    fn test_composite_primary_key() {
        let table = TableNode::new("item_tags")
            .column(ColumnNode::new("itemId", CanonicalType::integer()).primary_key())
            .column(ColumnNode::new("tagId", CanonicalType::integer()).primary_key());
        let statements = SchemaGenerator::new(DialectKind::Sqlite).generate_create_table(&table, &[]);
        assert_eq!(
            statements[0],
            "CREATE TABLE \"item_tags\" (\"itemId\" INTEGER NOT NULL, \"tagId\" INTEGER NOT NULL, \
             PRIMARY KEY (\"itemId\", \"tagId\"))"
        );
    }

    #[test]
    fn test_drop_table() {
        assert_eq!(
            SchemaGenerator::new(DialectKind::Postgres).generate_drop_table("items", true, true),
            "DROP TABLE IF EXISTS \"items\" CASCADE"
        );
        assert_eq!(
            SchemaGenerator::new(DialectKind::Sqlite).generate_drop_table("items", false, true),
            "DROP TABLE \"items\""
        );
    }

    #[test]
    fn test_alter_column_per_dialect() {
        let change = ColumnChange {
            from: ColumnNode::new("price", CanonicalType::decimal(10, 2)),
            to: ColumnNode::new("price", CanonicalType::decimal(12, 2))
                .not_null()
                .default_value(DefaultValue::Integer(1)),
        };
        assert_eq!(
            SchemaGenerator::new(DialectKind::Postgres).generate_alter_column("items", &change).unwrap(),
            [
                "ALTER TABLE \"items\" ALTER COLUMN \"price\" TYPE DECIMAL(12,2)",
                "ALTER TABLE \"items\" ALTER COLUMN \"price\" SET NOT NULL",
                "ALTER TABLE \"items\" ALTER COLUMN \"price\" SET DEFAULT 1",
            ]
        );
        assert_eq!(
            SchemaGenerator::new(DialectKind::MySql).generate_alter_column("items", &change).unwrap(),
            ["ALTER TABLE `items` MODIFY COLUMN `price` DECIMAL(12,2) NOT NULL DEFAULT 1"]
        );
        let err = SchemaGenerator::new(DialectKind::Sqlite)
            .generate_alter_column("items", &change)
            .unwrap_err();
        assert!(matches!(err, SchemaError::Unsupported { ref column, .. } if column == "price"));
    }

    #[test]
    fn test_alter_table_order_and_down() {
        let on_items = |index: IndexNode| IndexNode {
            table: "items".into(),
            ..index
        };
        let mut diff = SchemaDiff::alter("items");
        diff.columns_to_add = Some(vec![ColumnNode::new("sku", CanonicalType::varchar(20))]);
        diff.columns_to_drop = Some(vec![ColumnNode::new("legacy", CanonicalType::integer())]);
        diff.indexes_to_add = Some(vec![on_items(IndexNode::new("idx_items_sku", ["sku"]).unique())]);
        diff.indexes_to_drop = Some(vec![on_items(IndexNode::new("idx_items_legacy", ["legacy"]))]);
        diff.foreign_keys_to_drop = Some(vec![tax_fk()]);
        let generator = SchemaGenerator::new(DialectKind::MySql);

        assert_eq!(
            generator.generate_alter_table(&diff).unwrap(),
            [
                "ALTER TABLE `items` DROP FOREIGN KEY `fk_items_taxId`",
                "DROP INDEX `idx_items_legacy` ON `items`",
                "ALTER TABLE `items` ADD COLUMN `sku` VARCHAR(20)",
                "ALTER TABLE `items` DROP COLUMN `legacy`",
                "CREATE UNIQUE INDEX `idx_items_sku` ON `items` (`sku`)",
            ]
        );

        let down = generator.generate_alter_table_down(&diff).unwrap();
        assert_eq!(down[0], "DROP INDEX `idx_items_sku` ON `items`");
        assert!(down[1].starts_with(MANUAL_REVERSAL_MARKER));
        assert_eq!(down[2], "ALTER TABLE `items` ADD COLUMN `legacy` INT");
        assert_eq!(down[3], "ALTER TABLE `items` DROP COLUMN `sku`");
        assert!(down[4].starts_with(MANUAL_REVERSAL_MARKER));
        assert_eq!(down[5], "CREATE INDEX `idx_items_legacy` ON `items` (`legacy`)");
        assert!(down[6].starts_with("ALTER TABLE `items` ADD CONSTRAINT `fk_items_taxId`"));
    }

    #[test]
    fn test_sqlite_foreign_keys_are_comments() {
        let generator = SchemaGenerator::new(DialectKind::Sqlite);
        assert!(generator.generate_add_foreign_key(&tax_fk()).starts_with("--"));
        assert!(generator.generate_drop_foreign_key(&tax_fk()).starts_with("--"));
    }

    #[test]
    fn test_index_methods() {
        let mut index = IndexNode::new("idx_docs_body", ["body"]).index_type(IndexType::Gin);
        index.table = "docs".into();
        assert_eq!(
            SchemaGenerator::new(DialectKind::Postgres).generate_create_index(&index),
            "CREATE INDEX \"idx_docs_body\" ON \"docs\" USING GIN (\"body\")"
        );
        let fulltext = IndexNode {
            index_type: Some(IndexType::Fulltext),
            ..index
        };
        assert_eq!(
            SchemaGenerator::new(DialectKind::MariaDb).generate_create_index(&fulltext),
            "CREATE FULLTEXT INDEX `idx_docs_body` ON `docs` (`body`)"
        );
    }

    #[test]
    fn test_rename_statements() {
        let generator = SchemaGenerator::new(DialectKind::Postgres);
        assert_eq!(generator.generate_rename_table("a", "b"), "ALTER TABLE \"a\" RENAME TO \"b\"");
        assert_eq!(
            generator.generate_rename_column("a", "x", "y"),
            "ALTER TABLE \"a\" RENAME COLUMN \"x\" TO \"y\""
        );
    }
}
