//! PostgreSQL.

use super::{DialectKind, SqlDialect};
use crate::entity::EntityRef;
use crate::error::Result;
use crate::query::TextSearch;
use crate::value::hex;

/// PostgreSQL dialect: double-quoted identifiers, `ILIKE`, `~`,
/// `tsvector` search and `RETURNING` ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn begin_transaction_command(&self) -> &'static str {
        "BEGIN TRANSACTION"
    }

    fn case_insensitive_like(&self, column: &str, pattern: &str) -> String {
        format!("{column} ILIKE {}", self.escape_string(pattern))
    }

    fn regex_operator(&self) -> &'static str {
        "~"
    }

    fn text_search(&self, entity: EntityRef<'_>, search: &TextSearch, prefix: Option<&str>) -> Result<String> {
        let escaped_prefix = self.escape_id_with(prefix.unwrap_or(""), true, true);
        let document = search
            .fields
            .iter()
            .map(|key| format!("{escaped_prefix}{}", self.escape_id_with(&entity.column_name(key), true, false)))
            .collect::<Vec<_>>()
            .join(" || ' ' || ");
        Ok(format!(
            "to_tsvector({document}) @@ to_tsquery({})",
            self.escape_string(&search.value)
        ))
    }

    fn returning_id(&self, entity: EntityRef<'_>) -> Option<String> {
        Some(format!(
            "RETURNING {} {}",
            self.escape_id_with(&entity.id_column(), true, false),
            self.escape_id("id")
        ))
    }

    fn json_literal(&self, escaped: &str) -> String {
        format!("{escaped}::jsonb")
    }

    fn blob_literal(&self, bytes: &[u8]) -> String {
        format!("'\\x{}'", hex(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_id() {
        let dialect = PostgresDialect;
        assert_eq!(dialect.escape_id("user"), "\"user\"");
        assert_eq!(dialect.escape_id("public.user"), "\"public\".\"user\"");
        assert_eq!(dialect.escape_id_with("a.b", true, true), "\"a.b\".");
        assert_eq!(dialect.escape_id("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_case_insensitive_like() {
        assert_eq!(
            PostgresDialect.case_insensitive_like("\"name\"", "Some%"),
            "\"name\" ILIKE 'Some%'"
        );
    }

    #[test]
    fn test_blob_literal() {
        assert_eq!(PostgresDialect.blob_literal(&[0xde, 0xad]), "'\\xDEAD'");
    }
}
