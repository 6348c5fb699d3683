//! MariaDB.

use super::mysql::{duplicate_key_clause, escape_mysql_string};
use super::{DialectKind, SqlDialect};
use crate::entity::EntityRef;

/// MariaDB dialect: MySQL grammar plus `INSERT ... RETURNING`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MariaDbDialect;

impl SqlDialect for MariaDbDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::MariaDb
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn begin_transaction_command(&self) -> &'static str {
        "START TRANSACTION"
    }

    fn returning_id(&self, entity: EntityRef<'_>) -> Option<String> {
        Some(format!(
            "RETURNING {} {}",
            self.escape_id_with(&entity.id_column(), true, false),
            self.escape_id("id")
        ))
    }

    fn upsert_clause(&self, conflict: &[String], update: &[String]) -> String {
        duplicate_key_clause(conflict, update)
    }

    fn escape_string(&self, value: &str) -> String {
        escape_mysql_string(value)
    }

    fn unbounded_limit(&self) -> Option<&'static str> {
        Some("18446744073709551615")
    }
}
