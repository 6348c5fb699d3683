//! MySQL.

use super::{DialectKind, SqlDialect};

/// MySQL dialect: backtick identifiers, backslash-aware string escaping and
/// `ON DUPLICATE KEY UPDATE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

/// Escapes a string literal for MySQL-compatible servers.
pub(super) fn escape_mysql_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// `ON DUPLICATE KEY UPDATE` for MySQL-compatible servers.
pub(super) fn duplicate_key_clause(conflict: &[String], update: &[String]) -> String {
    let sets = if update.is_empty() {
        conflict
            .first()
            .map(|col| format!("{col} = {col}"))
            .unwrap_or_default()
    } else {
        update
            .iter()
            .map(|col| format!("{col} = VALUES({col})"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(" ON DUPLICATE KEY UPDATE {sets}")
}

impl SqlDialect for MySqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn begin_transaction_command(&self) -> &'static str {
        "START TRANSACTION"
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_string() {
        assert_eq!(MySqlDialect.escape_string("it's"), "'it''s'");
        assert_eq!(MySqlDialect.escape_string("a\\b"), "'a\\\\b'");
    }

    #[test]
    fn test_duplicate_key_clause() {
        let conflict = vec!["`pk`".to_string()];
        assert_eq!(
            duplicate_key_clause(&conflict, &["`name`".to_string()]),
            " ON DUPLICATE KEY UPDATE `name` = VALUES(`name`)"
        );
        assert_eq!(duplicate_key_clause(&conflict, &[]), " ON DUPLICATE KEY UPDATE `pk` = `pk`");
    }

    #[test]
    fn test_pager_without_limit() {
        assert_eq!(MySqlDialect.pager(None, Some(5)), " LIMIT 18446744073709551615 OFFSET 5");
        assert_eq!(MySqlDialect.pager(Some(10), None), " LIMIT 10");
    }
}
