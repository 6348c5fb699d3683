//! SQLite.

use super::{DialectKind, SqlDialect};
use crate::entity::EntityRef;
use crate::error::Result;
use crate::query::TextSearch;

/// SQLite dialect: double-quoted identifiers and FTS5 `MATCH` search.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn begin_transaction_command(&self) -> &'static str {
        "BEGIN TRANSACTION"
    }

    /// The FTS5 table is matched by its alias when the entity is joined.
    fn text_search(&self, entity: EntityRef<'_>, search: &TextSearch, prefix: Option<&str>) -> Result<String> {
        let target = prefix.map_or_else(
            || self.escape_id(&entity.table_name()),
            |alias| self.escape_id_with(alias, true, false),
        );
        let columns = search
            .fields
            .iter()
            .map(|key| entity.column_name(key))
            .collect::<Vec<_>>()
            .join(" ");
        Ok(format!(
            "{target} MATCH {}",
            self.escape_string(&format!("{{{columns}}} : {}", search.value))
        ))
    }

    fn json_literal(&self, escaped: &str) -> String {
        escaped.to_string()
    }

    fn unbounded_limit(&self) -> Option<&'static str> {
        Some("-1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Clause, WhereOptions};
    use crate::entity::{EntityMeta, EntityRegistry, FieldMeta, FieldType};
    use crate::query::WhereMap;

    #[test]
    fn test_text_search_uses_the_alias() {
        let registry = EntityRegistry::new().with(
            EntityMeta::new("Item")
                .field("id", FieldMeta::new(FieldType::Integer))
                .field("name", FieldMeta::new(FieldType::String)),
        );
        let map = WhereMap::new().text(&["name"], "lorem");
        let sql = SqliteDialect
            .where_map(
                registry.get("Item").unwrap(),
                Some(&map),
                &WhereOptions {
                    prefix: Some("order.item"),
                    clause: Clause::None,
                    ..WhereOptions::default()
                },
            )
            .unwrap();
        assert_eq!(sql, "\"order.item\" MATCH '{name} : lorem'");
    }
}
